use serde::{Deserialize, Serialize};

/// Error payload attached to a failed backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable error message
    pub message: String,

    /// Backend error identifier (e.g. `api.assert.missing_argument`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// HTTP-like status code carried by the error, if different from the response status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}
