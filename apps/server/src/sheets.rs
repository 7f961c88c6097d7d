//! Spreadsheet audit trail. One row per reservation, kept for human review;
//! never consulted for conflict decisions. Production implementation is a
//! thin client over the Google Sheets v4 values endpoints.

use serde::Deserialize;
use std::future::Future;

use crate::error::ApiError;

/// Columns A:E of the `reservations` sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRow {
    pub date: String,
    pub time: String,
    pub member_id: String,
    pub member_name: String,
    pub change_history: Option<String>,
}

impl AuditRow {
    fn to_values(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.time.clone(),
            self.member_id.clone(),
            self.member_name.clone(),
            self.change_history.clone().unwrap_or_default(),
        ]
    }

    fn from_values(values: &[String]) -> Self {
        let col = |i: usize| values.get(i).cloned().unwrap_or_default();
        let history = col(4);
        Self {
            date: col(0),
            time: col(1),
            member_id: col(2),
            member_name: col(3),
            change_history: if history.is_empty() { None } else { Some(history) },
        }
    }
}

pub trait SheetsApi: Send + Sync {
    fn append_row(&self, row: &AuditRow) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// All rows in sheet order. Row indexes returned here are what
    /// `update_row` expects.
    fn list_rows(&self) -> impl Future<Output = Result<Vec<AuditRow>, ApiError>> + Send;

    fn update_row(
        &self,
        index: usize,
        row: &AuditRow,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

// ── Google Sheets client ──

pub struct GoogleSheetsClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    token: String,
}

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEET_RANGE: &str = "reservations!A:E";

impl GoogleSheetsClient {
    pub fn new(spreadsheet_id: String, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            spreadsheet_id,
            token,
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{}", SHEETS_BASE, self.spreadsheet_id, range)
    }
}

impl SheetsApi for GoogleSheetsClient {
    async fn append_row(&self, row: &AuditRow) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}:append", self.values_url(SHEET_RANGE)))
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({ "values": [row.to_values()] }))
            .send()
            .await
            .map_err(|e| ApiError::external(format!("sheet append failed: {e}")))?;

        check_status(response, "sheet append").await.map(|_| ())
    }

    async fn list_rows(&self) -> Result<Vec<AuditRow>, ApiError> {
        let response = self
            .http
            .get(self.values_url(SHEET_RANGE))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::external(format!("sheet read failed: {e}")))?;

        let response = check_status(response, "sheet read").await?;
        let body: WireValues = response
            .json()
            .await
            .map_err(|e| ApiError::external(format!("sheet read decode failed: {e}")))?;
        Ok(body.values.iter().map(|v| AuditRow::from_values(v)).collect())
    }

    async fn update_row(&self, index: usize, row: &AuditRow) -> Result<(), ApiError> {
        // Sheet rows are 1-based.
        let range = format!("reservations!A{0}:E{0}", index + 1);
        let response = self
            .http
            .put(self.values_url(&range))
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({ "values": [row.to_values()] }))
            .send()
            .await
            .map_err(|e| ApiError::external(format!("sheet update failed: {e}")))?;

        check_status(response, "sheet update").await.map(|_| ())
    }
}

async fn check_status(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{context}: HTTP {status}: {body}");
    Err(ApiError::external(format!("{context}: HTTP {status}")))
}

#[derive(Debug, Deserialize)]
struct WireValues {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

// ── Tests ──
