//! Error types for REST API operations

use serde::Deserialize;

/// Errors that can occur during REST API operations
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// HTTP request failed (connect, TLS, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Binance error code from the body, when present
        code: Option<i64>,
        /// Error message from the body, or the raw body
        message: String,
    },

    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Binance error body: `{"code": -1121, "msg": "Invalid symbol."}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl RestError {
    /// Build a status error from a response body, picking up Binance's
    /// `{code, msg}` shape when the body has one
    pub fn from_status(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(api) => Self::Status {
                status,
                code: Some(api.code),
                message: api.msg,
            },
            Err(_) => Self::Status {
                status,
                code: None,
                message: body.trim().to_string(),
            },
        }
    }

    /// Check if this error is retryable
    ///
    /// Network failures, rate limiting (429/418) and server errors are;
    /// request and parse errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status == 418 || *status >= 500,
            Self::Parse(_) | Self::InvalidParameter(_) => false,
        }
    }

    /// Check if this error indicates rate limiting
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status { status: 429 | 418, .. })
    }
}

/// Result type for REST operations
pub type RestResult<T> = Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_api_body() {
        let err = RestError::from_status(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#);
        match &err {
            RestError::Status {
                status,
                code,
                message,
            } => {
                assert_eq!(*status, 400);
                assert_eq!(*code, Some(-1121));
                assert_eq!(message, "Invalid symbol.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "HTTP 400: Invalid symbol.");
    }

    #[test]
    fn test_from_status_plain_body() {
        let err = RestError::from_status(502, "Bad Gateway\n");
        assert!(matches!(
            &err,
            RestError::Status { code: None, message, .. } if message == "Bad Gateway"
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rate_limited() {
        let err = RestError::from_status(429, r#"{"code":-1003,"msg":"Too many requests."}"#);
        assert!(err.is_rate_limited());
        assert!(err.is_retryable());

        assert!(!RestError::Parse("bad".into()).is_rate_limited());
    }
}
