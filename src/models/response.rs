use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DocLinkError;

use super::error_detail::ErrorDetail;

/// Response to a [`Request`](super::Request), matched by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id copied from the request
    #[serde(rename = "requestId")]
    pub request_id: String,

    /// HTTP-like status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Error payload when the backend rejected the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,

    /// Action result
    #[serde(default)]
    pub result: JsonValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl Response {
    /// Returns `true` when the backend reported an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status >= 400
    }

    /// Human-readable error message, if any.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            Some(detail) => Some(detail.message.clone()),
            None if self.status >= 400 => Some(format!("Request failed with status {}", self.status)),
            None => None,
        }
    }

    /// Convert an error response into a [`DocLinkError::ServerError`].
    pub(crate) fn into_result(self) -> Result<Response, DocLinkError> {
        match self.error_message() {
            Some(message) => Err(DocLinkError::ServerError {
                status_code: self
                    .error
                    .as_ref()
                    .and_then(|e| e.status)
                    .unwrap_or(self.status),
                message,
            }),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response() {
        let response: Response =
            serde_json::from_value(json!({"requestId": "r1", "status": 200, "result": {"ok": true}}))
                .unwrap();
        assert!(!response.is_error());
        let ok = response.into_result().unwrap();
        assert_eq!(ok.result["ok"], json!(true));
    }

    #[test]
    fn test_error_response() {
        let response: Response = serde_json::from_value(json!({
            "requestId": "r2",
            "status": 404,
            "error": {"message": "Document not found", "id": "services.storage.not_found"}
        }))
        .unwrap();
        assert!(response.is_error());
        assert_eq!(
            response.into_result(),
            Err(DocLinkError::ServerError {
                status_code: 404,
                message: "Document not found".into()
            })
        );
    }

    #[test]
    fn test_status_only_error() {
        let response: Response =
            serde_json::from_value(json!({"requestId": "r3", "status": 500})).unwrap();
        assert_eq!(
            response.error_message().as_deref(),
            Some("Request failed with status 500")
        );
    }
}
