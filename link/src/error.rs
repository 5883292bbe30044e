//! Error types for venered-link

use thiserror::Error;

/// Errors surfaced by the Venered client library.
#[derive(Error, Debug)]
pub enum VeneredLinkError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Already following {0}")]
    AlreadyFollowing(String),

    #[error("Messaging denied: {0}")]
    MessagingDenied(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Upload failed: {0}")]
    UploadError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl VeneredLinkError {
    /// Transient failures a caller may retry: connect errors, timeouts and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            VeneredLinkError::NetworkError(_) | VeneredLinkError::TimeoutError(_) => true,
            VeneredLinkError::ServerError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for VeneredLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VeneredLinkError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            VeneredLinkError::SerializationError(err.to_string())
        } else if let Some(status) = err.status() {
            VeneredLinkError::ServerError {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            VeneredLinkError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VeneredLinkError {
    fn from(err: serde_json::Error) -> Self {
        VeneredLinkError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VeneredLinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        VeneredLinkError::WebSocketError(err.to_string())
    }
}

/// Result type for venered-link operations
pub type Result<T> = std::result::Result<T, VeneredLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VeneredLinkError::NetworkError("refused".into()).is_transient());
        assert!(VeneredLinkError::ServerError {
            status_code: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!VeneredLinkError::ServerError {
            status_code: 403,
            message: "rls".into()
        }
        .is_transient());
        assert!(!VeneredLinkError::NotAuthenticated.is_transient());
    }

    #[test]
    fn test_server_error_display() {
        let err = VeneredLinkError::ServerError {
            status_code: 409,
            message: "duplicate key".into(),
        };
        assert_eq!(err.to_string(), "Server error (409): duplicate key");
    }

    #[test]
    fn test_from_serde_json() {
        let err: VeneredLinkError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, VeneredLinkError::SerializationError(_)));
    }
}
