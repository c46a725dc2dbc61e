//! Error taxonomy for calls against external services

use reqwest::StatusCode;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Map a non-success HTTP status to the taxonomy.
    pub fn from_status(status: StatusCode, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ServiceError::Authentication(format!("{} ({})", context, status))
            }
            StatusCode::NOT_FOUND => ServiceError::NotFound(context),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                ServiceError::Timeout(format!("{} ({})", context, status))
            }
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                ServiceError::AlreadyExists(context)
            }
            _ => ServiceError::Upstream {
                status: status.as_u16(),
                message: context,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport(_) | ServiceError::Timeout(_) => true,
            ServiceError::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else if err.is_decode() {
            ServiceError::MalformedResponse(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ServiceError::from_status(StatusCode::UNAUTHORIZED, "get"),
            ServiceError::Authentication(_)
        ));
        assert!(matches!(
            ServiceError::from_status(StatusCode::FORBIDDEN, "get"),
            ServiceError::Authentication(_)
        ));
        assert!(ServiceError::from_status(StatusCode::NOT_FOUND, "get").is_not_found());
        assert!(matches!(
            ServiceError::from_status(StatusCode::GATEWAY_TIMEOUT, "get"),
            ServiceError::Timeout(_)
        ));
        assert!(matches!(
            ServiceError::from_status(StatusCode::PRECONDITION_FAILED, "put"),
            ServiceError::AlreadyExists(_)
        ));
        assert!(matches!(
            ServiceError::from_status(StatusCode::BAD_GATEWAY, "get"),
            ServiceError::Upstream { status: 502, .. }
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(ServiceError::Timeout("test".to_string()).is_retryable());
        assert!(ServiceError::Transport("test".to_string()).is_retryable());
        assert!(ServiceError::Upstream { status: 503, message: "busy".to_string() }.is_retryable());
        assert!(!ServiceError::Upstream { status: 400, message: "bad".to_string() }.is_retryable());
        assert!(!ServiceError::Authentication("test".to_string()).is_retryable());
    }

    #[test]
    fn test_malformed_json_maps_to_malformed_response() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(ServiceError::from(err), ServiceError::MalformedResponse(_)));
    }
}
