//! Error types for venered-cli
//!
//! Provides user-friendly error messages and context for common CLI failures.

use std::fmt;

use venered_link::VeneredLinkError;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CLIError>;

/// Errors that can occur in the CLI
#[derive(Debug)]
pub enum CLIError {
    /// Error from venered-link
    LinkError(VeneredLinkError),

    /// Configuration file or missing setting
    ConfigurationError(String),

    /// File I/O error
    FileError(String),

    /// Invalid argument combination
    ParseError(String),

    /// Logging could not be installed
    LoggingError(String),

    /// User cancelled operation
    Cancelled,
}

impl CLIError {
    fn format_link_error(err: &VeneredLinkError) -> String {
        match err {
            VeneredLinkError::NetworkError(msg) => Self::clean_nested_message(msg),
            VeneredLinkError::AuthenticationError(msg) => format!("Sign-in failed: {}", msg),
            VeneredLinkError::NotAuthenticated => "Not signed in".to_string(),
            VeneredLinkError::ServerError {
                status_code,
                message,
            } => format!("Server error ({}): {}", status_code, message),
            VeneredLinkError::AlreadyFollowing(user) => format!("You already follow {}", user),
            VeneredLinkError::MessagingDenied(msg) => msg.clone(),
            VeneredLinkError::PermissionDenied(msg) => msg.clone(),
            VeneredLinkError::ValidationError(msg) => msg.clone(),
            VeneredLinkError::Cancelled => "Operation cancelled".to_string(),
            other => other.to_string(),
        }
    }

    fn clean_nested_message(message: &str) -> String {
        let mut cleaned = message.trim();
        let prefixes = ["Connection failed:", "connection failed:", "Network error:", "network error:"];

        loop {
            let mut stripped = false;
            for prefix in &prefixes {
                if let Some(rest) = cleaned.strip_prefix(prefix) {
                    cleaned = rest.trim_start();
                    stripped = true;
                    break;
                }
            }

            if !stripped {
                break;
            }
        }

        cleaned.to_string()
    }
}

impl fmt::Display for CLIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CLIError::LinkError(e) => write!(f, "{}", Self::format_link_error(e)),
            CLIError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            CLIError::FileError(msg) => write!(f, "File error: {}", msg),
            CLIError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            CLIError::LoggingError(msg) => write!(f, "Logging error: {}", msg),
            CLIError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for CLIError {}

impl From<VeneredLinkError> for CLIError {
    fn from(err: VeneredLinkError) -> Self {
        CLIError::LinkError(err)
    }
}

impl From<std::io::Error> for CLIError {
    fn from(err: std::io::Error) -> Self {
        CLIError::FileError(err.to_string())
    }
}

impl From<toml::de::Error> for CLIError {
    fn from(err: toml::de::Error) -> Self {
        CLIError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CLIError::ParseError("nothing to mark".into());
        assert_eq!(err.to_string(), "Parse error: nothing to mark");

        let err = CLIError::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_link_error_display_strips_nesting() {
        let err: CLIError =
            VeneredLinkError::NetworkError("Network error: connection failed: refused".into()).into();
        assert_eq!(err.to_string(), "refused");

        let err: CLIError = VeneredLinkError::ServerError {
            status_code: 503,
            message: "unavailable".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Server error (503): unavailable");
    }

    #[test]
    fn test_toml_error_is_configuration() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("[server");
        let err: CLIError = parsed.unwrap_err().into();
        assert!(err.to_string().starts_with("Configuration error: TOML parse error"));
    }
}
