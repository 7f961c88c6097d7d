//! Single-document settings store: a JSON file guarded by an advisory lock
//! file. Writers must hold the lock; readers never block. The lock is
//! cooperative and non-blocking — a held lock surfaces as ResourceBusy and
//! the caller retries.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::ApiError;
use crate::models::AvailabilitySettings;

pub struct SettingsStore {
    path: PathBuf,
}

/// RAII advisory lock. Dropping the guard removes the lock file, so the
/// lock is released on every exit path — success, validation failure, or
/// I/O failure alike.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::error!("failed to release settings lock {:?}: {}", self.path, e);
        }
    }
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("backup.json")
    }

    /// Remove a lock left behind by a crashed process. Called once at
    /// startup, before the server accepts requests; safe because the store
    /// is single-instance.
    pub fn clear_stale_lock(&self) {
        match fs::remove_file(self.lock_path()) {
            Ok(()) => tracing::warn!("removed stale settings lock"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::error!("could not remove stale settings lock: {}", e),
        }
    }

    /// Load the document. A missing store seeds and persists the defaults;
    /// a corrupt store is re-seeded rather than failing permanently.
    pub fn load(&self) -> anyhow::Result<AvailabilitySettings> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => Ok(settings),
                Err(e) => {
                    tracing::error!("settings document corrupt ({}), re-seeding defaults", e);
                    let seed = AvailabilitySettings::seed();
                    self.write_document(&seed)?;
                    Ok(seed)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let seed = AvailabilitySettings::seed();
                self.write_document(&seed)?;
                tracing::info!("seeded default settings at {:?}", self.path);
                Ok(seed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and persist a full replacement document.
    ///
    /// Acquires the advisory lock non-blocking (held lock ⇒ ResourceBusy),
    /// validates, snapshots the previous document to the backup path, then
    /// replaces the primary via temp-file + rename. Validation failure
    /// aborts the write; nothing is partially persisted.
    pub fn save(&self, new_settings: &AvailabilitySettings) -> Result<(), ApiError> {
        let _lock = self.acquire_lock()?;

        validate(new_settings)?;

        if let Err(e) = fs::copy(&self.path, self.backup_path()) {
            // Backup failure never blocks the primary write.
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("settings backup failed: {}", e);
            }
        }

        self.write_document(new_settings)
            .map_err(ApiError::Internal)?;
        Ok(())
    }

    fn acquire_lock(&self) -> Result<LockGuard, ApiError> {
        let path = self.lock_path();
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(LockGuard { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ApiError::ResourceBusy),
            Err(e) => Err(ApiError::Internal(e.into())),
        }
    }

    fn write_document(&self, settings: &AvailabilitySettings) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(settings)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ── Validation ──

fn validate(settings: &AvailabilitySettings) -> Result<(), ApiError> {
    let ranges = [
        ("weekday", settings.available_hours.weekday),
        ("weekend", settings.available_hours.weekend),
        ("holiday", settings.available_hours.holiday),
    ];
    for (kind, range) in ranges {
        if range.start > 23 || range.end > 23 {
            return Err(ApiError::validation(format!(
                "{kind} hours must be between 0 and 23"
            )));
        }
        if range.start > range.end {
            return Err(ApiError::validation(format!(
                "{kind} hours: start must not exceed end"
            )));
        }
    }

    let same_day = settings.available_hours.same_day;
    if !(1..=6).contains(&same_day.min_hours_after) {
        return Err(ApiError::validation(
            "same-day minimum lead time must be between 1 and 6 hours",
        ));
    }

    for date in &settings.disabled_dates {
        if crate::kst::KstDay::parse(date).is_none() {
            return Err(ApiError::validation(format!("invalid disabled date: {date}")));
        }
    }
    for date in &settings.holidays {
        if crate::kst::KstDay::parse(date).is_none() {
            return Err(ApiError::validation(format!("invalid holiday date: {date}")));
        }
    }

    if let Some(period) = &settings.reservation_period {
        let start = match period.start_date.as_deref() {
            Some(s) => Some(crate::kst::KstDay::parse(s).ok_or_else(|| {
                ApiError::validation(format!("invalid reservation period start: {s}"))
            })?),
            None => None,
        };
        let end = match period.end_date.as_deref() {
            Some(s) => Some(crate::kst::KstDay::parse(s).ok_or_else(|| {
                ApiError::validation(format!("invalid reservation period end: {s}"))
            })?),
            None => None,
        };
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ApiError::validation(
                    "reservation period: start date is after end date",
                ));
            }
        }
    }

    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReservationPeriod;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    /// Fresh store under a unique temp directory per test.
    fn temp_store() -> SettingsStore {
        let dir = std::env::temp_dir().join(format!(
            "ptstudio-store-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        SettingsStore::new(dir.join("settings.json"))
    }

    #[test]
    fn test_load_missing_seeds_defaults() {
        let store = temp_store();
        let settings = store.load().unwrap();
        assert_eq!(settings.available_hours.weekday.start, 14);
        assert_eq!(settings.available_hours.weekday.end, 22);
        assert!(store.path.exists());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let store = temp_store();
        let mut settings = AvailabilitySettings::seed();
        settings.disabled_dates.push("2026-08-20".into());
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.disabled_dates, vec!["2026-08-20".to_string()]);
    }

    #[test]
    fn test_inverted_hours_rejected_and_previous_kept() {
        let store = temp_store();
        let good = store.load().unwrap();

        let mut bad = good.clone();
        bad.available_hours.weekday.start = 20;
        bad.available_hours.weekday.end = 10;
        let err = store.save(&bad).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // The previously persisted document is unchanged and readable.
        let loaded = store.load().unwrap();
        assert_eq!(loaded.available_hours.weekday.start, 14);
    }

    #[test]
    fn test_hour_out_of_range_rejected() {
        let store = temp_store();
        let mut bad = AvailabilitySettings::seed();
        bad.available_hours.weekend.end = 24;
        assert!(matches!(
            store.save(&bad),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_disabled_date_rejected() {
        let store = temp_store();
        let mut bad = AvailabilitySettings::seed();
        bad.disabled_dates.push("yesterday-ish".into());
        assert!(matches!(store.save(&bad), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_inverted_period_rejected() {
        let store = temp_store();
        let mut bad = AvailabilitySettings::seed();
        bad.reservation_period = Some(ReservationPeriod {
            start_date: Some("2026-08-31".into()),
            end_date: Some("2026-08-01".into()),
        });
        assert!(matches!(store.save(&bad), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_same_day_lead_time_bounds() {
        let store = temp_store();
        let mut bad = AvailabilitySettings::seed();
        bad.available_hours.same_day.min_hours_after = 0;
        assert!(matches!(store.save(&bad), Err(ApiError::Validation(_))));
        bad.available_hours.same_day.min_hours_after = 7;
        assert!(matches!(store.save(&bad), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_held_lock_reports_busy() {
        let store = temp_store();
        fs::write(store.lock_path(), "1").unwrap();
        let err = store.save(&AvailabilitySettings::seed()).unwrap_err();
        assert!(matches!(err, ApiError::ResourceBusy));
    }

    #[test]
    fn test_startup_clears_stale_lock() {
        let store = temp_store();
        fs::write(store.lock_path(), "1").unwrap();
        store.clear_stale_lock();
        store.save(&AvailabilitySettings::seed()).unwrap();
    }

    #[test]
    fn test_lock_released_after_save_paths() {
        let store = temp_store();

        // Success path releases the lock.
        store.save(&AvailabilitySettings::seed()).unwrap();
        assert!(!store.lock_path().exists());

        // Validation failure must release it too.
        let mut bad = AvailabilitySettings::seed();
        bad.available_hours.weekday.start = 20;
        bad.available_hours.weekday.end = 10;
        let _ = store.save(&bad);
        assert!(!store.lock_path().exists());

        // And a subsequent save must not see ResourceBusy.
        store.save(&AvailabilitySettings::seed()).unwrap();
    }

    #[test]
    fn test_corrupt_document_reseeds() {
        let store = temp_store();
        fs::write(&store.path, "{ not json").unwrap();
        let settings = store.load().unwrap();
        assert_eq!(settings.available_hours.weekday.start, 14);
        // The re-seeded document is persisted and parses next time.
        let again = store.load().unwrap();
        assert_eq!(again.available_hours.weekday.end, 22);
    }

    #[test]
    fn test_backup_written_on_save() {
        let store = temp_store();
        store.load().unwrap(); // seed
        let mut next = AvailabilitySettings::seed();
        next.holidays.push("2026-09-25".into());
        store.save(&next).unwrap();
        assert!(store.backup_path().exists());

        // Backup holds the pre-save document.
        let backup: AvailabilitySettings =
            serde_json::from_str(&fs::read_to_string(store.backup_path()).unwrap()).unwrap();
        assert!(backup.holidays.is_empty());
    }
}
