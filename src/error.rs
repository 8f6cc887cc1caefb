//! # Error Handling
//!
//! This module defines the centralized error type for `cms-transform`. It
//! uses the `thiserror` library to build one `Error` enum covering every
//! failure the transform and import flows can surface.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries enough context (path,
//!   url, operation) to produce a descriptive message for the caller.
//!
//! - **`ErrorKind`**: A coarse classification of an `Error`. Callers use it
//!   to decide whether a retry is sensible: configuration, precondition and
//!   conflict errors never succeed when retried as-is, transient backend
//!   errors might.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! An empty transformation result is not an error. It is discarded by the
//! change-set builder and only shows up in the log.

use thiserror::Error;

/// Main error type for cms-transform operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration object is malformed or misses a required field.
    ///
    /// Raised before any side effect takes place.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration
        hint: Option<String>,
    },

    /// The repository is not in a state that allows the operation, e.g. the
    /// output folder does not exist or the naming configuration is ambiguous.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// An item already exists at a path and overwrite is not permitted.
    #[error("Conflict at {path}: {message}")]
    Conflict { path: String, message: String },

    /// A collaborator violated its contract (e.g. a lock call that succeeded
    /// without returning a usable token).
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// An item lookup found nothing at the given id.
    #[error("Item not found: {id}")]
    NotFound { id: String },

    /// The transformation engine failed for a source item.
    #[error("Transform engine error for {source_id}: {message}")]
    Engine { source_id: String, message: String },

    /// Lock acquisition failed.
    #[error("Lock error for {path}: {message}")]
    Lock { path: String, message: String },

    /// Downloading an import payload failed.
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The backend rejected the commit.
    #[error("Commit error: {message}")]
    Commit { message: String },

    /// Any other backend failure.
    #[error("Backend error: {operation} - {message}")]
    Backend { operation: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

/// Coarse classification used by callers to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing configuration. Never retry as-is.
    Configuration,
    /// Repository state does not allow the operation.
    Precondition,
    /// Target path exists and overwrite is disallowed.
    Conflict,
    /// Backend, lock, fetch or commit failure. May succeed on retry.
    Transient,
    /// Contract violations and local failures.
    Internal,
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } | Error::Json(_) | Error::Yaml(_) | Error::Regex(_) => {
                ErrorKind::Configuration
            }
            Error::UrlParse(_) => ErrorKind::Configuration,
            Error::Precondition { .. } | Error::NotFound { .. } => ErrorKind::Precondition,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Lock { .. }
            | Error::Fetch { .. }
            | Error::Commit { .. }
            | Error::Backend { .. }
            | Error::Io(_) => ErrorKind::Transient,
            Error::InvalidState { .. } | Error::Engine { .. } | Error::LockPoisoned { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether this is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
