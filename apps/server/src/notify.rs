//! Fire-and-forget Telegram notifications. Nothing here feeds back into
//! booking decisions: failures are logged and dropped, never retried and
//! never surfaced to the caller.

use crate::gateway::Rescheduled;
use crate::kst::KstDay;
use crate::models::{AvailabilitySettings, ReservationSummary};

pub struct Notifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    /// Send a message to the configured chat. Logs and swallows failures.
    pub async fn send(&self, text: &str) {
        if self.bot_token.is_empty() || self.chat_id.is_empty() {
            tracing::warn!("telegram not configured, dropping notification");
            return;
        }
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let result = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::error!("telegram send failed: HTTP {}", response.status());
            }
            Err(e) => tracing::error!("telegram send failed: {}", e),
            _ => {}
        }
    }
}

// ── Message formats ──

pub fn booking_created_message(reservation: &ReservationSummary) -> String {
    format!(
        "🆕 <b>New reservation</b>\n\n\
         📅 Date: {}\n\
         ⏰ Time: {}\n\
         👤 Member: {}\n\
         🆔 Member ID: {}",
        reservation.date, reservation.time, reservation.member_name, reservation.member_id
    )
}

pub fn booking_rescheduled_message(moved: &Rescheduled) -> String {
    format!(
        "🔄 <b>Reservation changed</b>\n\n\
         👤 Member: {}\n\
         🆔 Member ID: {}\n\n\
         <b>Before</b>\n\
         📅 {} ⏰ {}\n\n\
         <b>After</b>\n\
         📅 {} ⏰ {}",
        moved.reservation.member_name,
        moved.reservation.member_id,
        moved.previous_date,
        moved.previous_time,
        moved.reservation.date,
        moved.reservation.time
    )
}

/// Warning for a reservation period nearing its end, checked whenever the
/// settings are read. Fires at exactly one week out, within the last three
/// days, and on the expiry day itself.
pub fn period_expiry_notice(settings: &AvailabilitySettings, today: KstDay) -> Option<String> {
    let end_date = settings
        .reservation_period
        .as_ref()?
        .end_date
        .as_deref()
        .and_then(KstDay::parse)?;

    let days_left = today.days_until(end_date);
    match days_left {
        7 => Some(format!(
            "⚠️ <b>Reservation period ends in one week</b>\n\n\
             Expires: {end_date}\n\
             Days left: 7"
        )),
        1..=3 => Some(format!(
            "⚠️ <b>Reservation period ending soon</b>\n\n\
             Expires: {end_date}\n\
             Days left: {days_left}"
        )),
        0 => Some(format!(
            "🚨 <b>Reservation period expires today</b>\n\n\
             Expires: {end_date}"
        )),
        _ => None,
    }
}

// ── Tests ──
