//! rollcall-api: typed client for the attendance backend.
//!
//! Every endpoint replies with a `{success, data, message}` envelope;
//! `success != true`, transport failures, and shape mismatches all
//! decode to an [`ApiError`] rather than a silent fallback.

mod backend;
mod client;
mod envelope;

pub use backend::{AttendanceBackend, ManualAttendance, VerifyAttendance};
pub use client::ApiClient;
pub use envelope::ApiResponse;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response shape from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    /// Server answered but with `success != true`. The message is shown
    /// to the user as-is.
    pub(crate) fn rejected(message: Option<String>) -> Self {
        ApiError::Rejected(message.unwrap_or_else(|| "request was rejected by the server".into()))
    }
}
