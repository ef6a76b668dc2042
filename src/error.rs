use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Everything a directory operation can fail with.
///
/// Only `Network` and `Timeout` are transient; the rest describe a request
/// that would fail the same way if it were sent again.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Message shown to the person at the terminal.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Could not reach the directory server. Check your connection and try again.".to_string(),
            Self::Timeout(_) => "The directory server took too long to answer. Please try again.".to_string(),
            Self::Validation(msg) => format!("Please check your input: {}", msg),
            Self::NotFound(_) => "The requested entry no longer exists.".to_string(),
            Self::Authentication(_) => "Wrong username or password.".to_string(),
            Self::Conflict(msg) => format!("Already exists: {}", msg),
            Self::InvalidResponse(_) => "The directory server sent an unexpected answer.".to_string(),
            Self::Storage(_) => "Local data could not be saved.".to_string(),
            Self::Config(msg) => format!("The application is misconfigured: {}", msg),
        }
    }

    /// Maps a non-success HTTP status to the matching error kind.
    pub fn from_status(status: StatusCode, context: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(context.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Authentication(format!("{} ({})", context, status))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Self::Timeout(format!("{} ({})", context, status))
            }
            StatusCode::CONFLICT => Self::Conflict(context.to_string()),
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                Self::Network(format!("{} ({})", context, status))
            }
            s => Self::InvalidResponse(format!("{} ({})", context, s)),
        }
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, &err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<std::io::Error> for DirectoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for DirectoryError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(DirectoryError::Network("reset".into()).is_retryable());
        assert!(DirectoryError::Timeout("slow".into()).is_retryable());
        assert!(!DirectoryError::Validation("name".into()).is_retryable());
        assert!(!DirectoryError::NotFound("shops/1".into()).is_retryable());
        assert!(!DirectoryError::Authentication("bad".into()).is_retryable());
        assert!(!DirectoryError::Conflict("phone".into()).is_retryable());
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert!(matches!(
            DirectoryError::from_status(StatusCode::NOT_FOUND, "x"),
            DirectoryError::NotFound(_)
        ));
        assert!(matches!(
            DirectoryError::from_status(StatusCode::SERVICE_UNAVAILABLE, "x"),
            DirectoryError::Network(_)
        ));
        assert!(matches!(
            DirectoryError::from_status(StatusCode::TOO_MANY_REQUESTS, "x"),
            DirectoryError::Network(_)
        ));
        assert!(matches!(
            DirectoryError::from_status(StatusCode::FORBIDDEN, "x"),
            DirectoryError::Authentication(_)
        ));
        assert!(matches!(
            DirectoryError::from_status(StatusCode::BAD_REQUEST, "x"),
            DirectoryError::InvalidResponse(_)
        ));
    }

    #[test]
    fn validation_message_keeps_detail() {
        let err = DirectoryError::Validation("missing required fields: phone".into());
        assert!(err.user_message().contains("phone"));
    }
}
