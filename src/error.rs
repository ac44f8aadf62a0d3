//! Error types shared by the stores, the session manager and the auth form.

use thiserror::Error;

/// Failure reported by a [`crate::storage::KeyValueStore`] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would push the store past its size limit.
    #[error("storage quota exceeded ({needed} bytes needed, limit {limit})")]
    QuotaExceeded { needed: usize, limit: usize },

    /// The backing store refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// I/O failure in a file-backed store.
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the application core.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("username already exists: {0}")]
    DuplicateUsername(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid password for {0}")]
    InvalidPassword(String),

    /// The target is the only admin account.
    #[error("cannot delete the only admin account: {0}")]
    LastAdminProtected(String),

    #[error("failed to write {key}: {source}")]
    StorageWriteFailed {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("corrupt data under {key}: {reason}")]
    StorageReadCorrupt { key: String, reason: String },

    /// Username or password was empty after trimming.
    #[error("username and password are required")]
    MissingCredentials,

    #[error("no user is logged in")]
    NotAuthenticated,

    #[error("operation not permitted: {0}")]
    Forbidden(String),
}

impl AppError {
    pub fn write_failed(key: &str, source: StorageError) -> Self {
        Self::StorageWriteFailed {
            key: key.to_string(),
            source,
        }
    }

    /// Text shown to the end user on the auth form or the banner line.
    pub fn user_message(&self) -> String {
        match self {
            Self::DuplicateUsername(_) => "Username already exists.".to_string(),
            Self::UserNotFound(_) => {
                "Username not found. Please check your username or sign up.".to_string()
            }
            Self::InvalidPassword(_) => "Incorrect password. Please try again.".to_string(),
            Self::LastAdminProtected(_) => "Cannot delete the only admin account.".to_string(),
            Self::StorageWriteFailed { .. } => {
                "Failed to save data. Storage might be full or disabled.".to_string()
            }
            Self::StorageReadCorrupt { .. } => "Stored data could not be read.".to_string(),
            Self::MissingCredentials => "Please enter both a username and a password.".to_string(),
            Self::NotAuthenticated => "Please log in first.".to_string(),
            Self::Forbidden(what) => format!("Not allowed: {}", what),
        }
    }

    /// Authentication errors belong on the auth form rather than the banner.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateUsername(_)
                | Self::UserNotFound(_)
                | Self::InvalidPassword(_)
                | Self::MissingCredentials
        )
    }
}
