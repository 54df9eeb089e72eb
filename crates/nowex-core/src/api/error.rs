use serde_json::{Map, Value};
use thiserror::Error;

/// Code reported when the server did not supply one.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Maximum length for error response bodies in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Normalized failure of an outbound request.
///
/// Every transport or HTTP failure is translated into one of these
/// variants before reaching the caller; `reqwest::Error` never leaks out.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, timeout).
    #[error("Network error: {message}")]
    Network { message: String, timed_out: bool },

    /// Non-2xx response carrying a structured error body.
    #[error("Server error {status} ({code}): {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
        details: Option<Map<String, Value>>,
    },

    /// Failure without any structured information.
    #[error("{message}")]
    Unknown { status: Option<u16>, message: String },
}

/// Read a text field from an error body. Numeric codes are kept as text.
fn text_field(body: &Value, key: &str) -> Option<String> {
    let text = match body.get(key)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(text).filter(|s| !s.trim().is_empty())
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    fn status_message(status: u16) -> String {
        format!("Request failed with status code {}", status)
    }

    /// Build an error from a rejected HTTP response.
    ///
    /// Server-supplied `code`, `message` and `details` win; the code falls
    /// back to `UNKNOWN_ERROR` and the message to the transport message.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let status = status.as_u16();
        // Each field is read on its own so one odd field does not discard the rest.
        let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);

        let code = text_field(&parsed, "code");
        let message = match parsed.get("message") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        };
        let details = match parsed.get("details") {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        };

        if code.is_none() && message.is_none() && details.is_none() {
            return ApiError::Unknown {
                status: Some(status),
                message: Self::status_message(status),
            };
        }

        ApiError::Server {
            status,
            code: code.unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
            message: message.unwrap_or_else(|| Self::status_message(status)),
            details,
        }
    }

    /// Build an error from a transport failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return ApiError::Network {
                message,
                timed_out: err.is_timeout(),
            };
        }
        ApiError::Unknown {
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Error code: the server's code, or `UNKNOWN_ERROR`.
    pub fn code(&self) -> &str {
        match self {
            ApiError::Server { code, .. } => code,
            ApiError::Network { .. } | ApiError::Unknown { .. } => UNKNOWN_ERROR_CODE,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message, .. }
            | ApiError::Server { message, .. }
            | ApiError::Unknown { message, .. } => message,
        }
    }

    pub fn details(&self) -> Option<&Map<String, Value>> {
        match self {
            ApiError::Server { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// HTTP status of the rejected response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Network { .. } => None,
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Unknown { status, .. } => *status,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Network { timed_out: true, .. })
    }

    /// Credentials were rejected (401) or lack permission (403).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}
