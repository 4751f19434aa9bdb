//! Authoring-specific error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, writing or reconciling resources.
///
/// Per-resource failures never surface as this type from the engine; they are
/// recorded on the resource's status instead. Only whole-run preconditions
/// (client initialization, unreadable directories, invalid settings) abort.
#[derive(Error, Debug)]
pub enum AuthoringError {
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file '{path}': {source}")]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {message}")]
    ParseContent { path: PathBuf, message: String },

    #[error("Failed to serialize resources: {0}")]
    Serialize(String),

    #[error("Failed to initialize remote client: {0}")]
    Initialize(#[source] RemoteError),

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl AuthoringError {
    /// Returns true for errors caused by malformed content rather than I/O.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            AuthoringError::ParseContent { .. } | AuthoringError::Serialize(_)
        )
    }
}

impl From<serde_yaml::Error> for AuthoringError {
    fn from(err: serde_yaml::Error) -> Self {
        AuthoringError::ParseContent {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AuthoringError {
    fn from(err: serde_json::Error) -> Self {
        AuthoringError::ParseContent {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

/// Error reported by a remote service adapter.
///
/// The engine never inspects transport detail; it only turns the message into
/// a failed status on the affected resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// Human readable reason.
    pub message: String,
    /// HTTP-like status code, when the backend provides one.
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Returns true if the error is likely transient (rate limited or server side).
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, Some(429) | Some(500..=599))
    }
}

/// Result type for authoring operations.
pub type Result<T> = std::result::Result<T, AuthoringError>;
