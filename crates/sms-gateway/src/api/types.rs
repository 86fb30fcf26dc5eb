//! API request and response types.

use serde::{Deserialize, Serialize};

/// Envelope used by every SMS endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// "ok" or "not_found"
    pub result: String,
    /// Machine-readable status, e.g. "SUCCESS" or "TIMEOUT"
    pub code: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            result: "ok".to_string(),
            code: "SUCCESS".to_string(),
            message: message.into(),
            data,
        }
    }

    /// Lookup that ran out of time.
    pub fn timeout() -> Self {
        Self {
            result: "not_found".to_string(),
            code: "TIMEOUT".to_string(),
            message: "Verification code not found before timeout".to_string(),
            data: None,
        }
    }
}

/// Data returned after an SMS is stored.
#[derive(Debug, Serialize)]
pub struct ReceiveData {
    pub id: i64,
    pub extracted_code: Option<String>,
    pub phone_number: Option<String>,
}

/// Query parameters for the code lookup.
#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    pub phone_number: String,

    /// Only messages whose text contains this are considered
    pub platform_keyword: Option<String>,

    /// Seconds to wait for a code
    pub wait_timeout: Option<i64>,
}

/// A found verification code.
#[derive(Debug, Serialize)]
pub struct CodeData {
    pub code: String,
    /// "keyword" when the lookup was filtered by keyword, else "fallback"
    pub matched_by: String,
    pub sms_excerpt: String,
    pub received_time: String,
}

/// Query parameters for paging through history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

fn default_history_limit() -> usize {
    20
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub record_count: usize,
}
