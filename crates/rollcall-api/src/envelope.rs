use serde::Deserialize;

use crate::ApiError;

/// Standard response envelope shared by every backend endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the envelope: a rejected response or a missing payload is
    /// an error, never a fallback value.
    pub fn into_result(self, endpoint: &str) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::rejected(self.message));
        }
        self.data.ok_or_else(|| ApiError::Decode {
            endpoint: endpoint.to_string(),
            detail: "success response carried no data".into(),
        })
    }

    /// Same as [`into_result`](Self::into_result) for endpoints whose
    /// payload is irrelevant (status writes).
    pub fn into_ack(self) -> Result<(), ApiError> {
        if self.success {
            Ok(())
        } else {
            Err(ApiError::rejected(self.message))
        }
    }
}
