//! Centralized error types for tasksync.
//!
//! This module provides a typed error hierarchy that:
//! - Separates authentication failures from other remote failures
//! - Provides user-friendly messages suitable for display
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a display-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Remote(e) => e.user_message(),
            AppError::Storage(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Auth(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Failure of a call to the remote task service.
///
/// `Unauthorized` is the only variant that ends the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Server error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Transport(String),
}

impl RemoteError {
    /// True for an invalid or expired credential (HTTP 401).
    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Unauthorized { .. })
    }

    /// True when no response was received at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Timeout | RemoteError::Transport(_))
    }

    /// HTTP status carried by the failure, if a response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Unauthorized { .. } => Some(401),
            RemoteError::Status { status, .. } => Some(*status),
            RemoteError::Timeout | RemoteError::Transport(_) => None,
        }
    }

    /// Human-readable reason sent by the server, if any.
    ///
    /// Looks for an `error` or `message` field in a JSON body; falls back to
    /// the raw body text when it is not JSON.
    pub fn server_reason(&self) -> Option<String> {
        let body = match self {
            RemoteError::Unauthorized { message } | RemoteError::Status { message, .. } => message,
            RemoteError::Timeout | RemoteError::Transport(_) => return None,
        };
        let body = body.trim();
        if body.is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => ["error", "message"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()))
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            Err(_) => Some(body.to_string()),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            RemoteError::Unauthorized { .. } => "Your session has expired. Please sign in again.",
            RemoteError::Status { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later."
            }
            RemoteError::Status { .. } => "The request failed. Please try again.",
            RemoteError::Timeout => "The request timed out. Please try again.",
            RemoteError::Transport(_) => "Unable to connect. Check your internet connection.",
        }
    }
}

/// Local storage errors (SQLite key/value mirror).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::ConnectionFailed(_) => {
                "Unable to access local data. Try restarting the app."
            }
            StorageError::QueryFailed(_) => "A data operation failed. Please try again.",
            StorageError::Corruption(_) => {
                "Local data may be corrupted. Consider resetting app data."
            }
            StorageError::Serialization(_) => "Failed to save local data. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Authentication errors (login, register, session lifecycle).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Server refused the credentials; carries the server's reason.
    #[error("{0}")]
    Rejected(String),

    #[error("No token received")]
    NoToken,

    #[error("Authentication already in progress")]
    InProgress,

    #[error("Session expired")]
    SessionExpired,

    #[error("Not signed in")]
    NotAuthenticated,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::MissingField(_) => "Please fill in every field.",
            AuthError::Rejected(_) => "Authentication failed",
            AuthError::NoToken => "No token received",
            AuthError::InProgress => "Sign-in is already in progress.",
            AuthError::SessionExpired => "Your session has expired. Please sign in again.",
            AuthError::NotAuthenticated => "Not signed in. Please sign in first.",
            AuthError::Remote(e) => e.user_message(),
            AuthError::Storage(_) => "Failed to save credentials. Please try again.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_remote_error(self) -> RemoteError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_remote_error(self) -> RemoteError {
        if self.is_timeout() {
            RemoteError::Timeout
        } else if let Some(status) = self.status() {
            if status.as_u16() == 401 {
                RemoteError::Unauthorized {
                    message: self.to_string(),
                }
            } else {
                RemoteError::Status {
                    status: status.as_u16(),
                    message: self.to_string(),
                }
            }
        } else {
            RemoteError::Transport(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_storage_error(self) -> StorageError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_storage_error(self) -> StorageError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                StorageError::Corruption(self.to_string())
            }
            _ => StorageError::QueryFailed(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let auth_err = AuthError::SessionExpired;
        let app_err: AppError = auth_err.into();
        assert!(matches!(app_err, AppError::Auth(AuthError::SessionExpired)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Remote(RemoteError::Unauthorized {
            message: String::new(),
        });
        assert_eq!(
            app_err.user_message(),
            "Your session has expired. Please sign in again."
        );
    }

    #[test]
    fn test_remote_error_classification() {
        let auth = RemoteError::Unauthorized {
            message: "invalid token".into(),
        };
        assert!(auth.is_auth());
        assert_eq!(auth.status(), Some(401));

        let server = RemoteError::Status {
            status: 500,
            message: "boom".into(),
        };
        assert!(!server.is_auth());
        assert!(!server.is_transport());
        assert_eq!(server.status(), Some(500));

        assert!(RemoteError::Timeout.is_transport());
        assert_eq!(RemoteError::Transport("refused".into()).status(), None);
    }

    #[test]
    fn test_server_reason_from_json_body() {
        let err = RemoteError::Status {
            status: 409,
            message: r#"{"error":"user already exists"}"#.into(),
        };
        assert_eq!(err.server_reason().as_deref(), Some("user already exists"));

        let err = RemoteError::Status {
            status: 400,
            message: r#"{"message":"bad input"}"#.into(),
        };
        assert_eq!(err.server_reason().as_deref(), Some("bad input"));
    }

    #[test]
    fn test_server_reason_plain_text_and_empty() {
        let err = RemoteError::Status {
            status: 502,
            message: "Bad Gateway".into(),
        };
        assert_eq!(err.server_reason().as_deref(), Some("Bad Gateway"));

        let err = RemoteError::Status {
            status: 500,
            message: "  ".into(),
        };
        assert_eq!(err.server_reason(), None);
        assert_eq!(RemoteError::Timeout.server_reason(), None);
    }

    #[test]
    fn test_server_error_user_message_depends_on_status() {
        let err = RemoteError::Status {
            status: 503,
            message: String::new(),
        };
        assert!(err.user_message().contains("server"));

        let err = RemoteError::Status {
            status: 404,
            message: String::new(),
        };
        assert_eq!(err.user_message(), "The request failed. Please try again.");
    }
}
