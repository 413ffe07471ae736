//! Error types for ShelfKit

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while discovering, fetching or parsing books
#[derive(Debug, Error)]
pub enum ShelfError {
    /// URL is missing
    #[error("Missing required parameter: url")]
    MissingUrl,

    /// URL has invalid scheme
    #[error("Invalid URL: must start with http:// or https://")]
    InvalidUrlScheme,

    /// Request parameters out of range or malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Downloaded or stored file is not EPUB, PDF or plain text
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Writing into the storage root failed
    #[error("Storage error: {message}")]
    StorageError {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// File exists but cannot be parsed as its declared format
    #[error("Unreadable file {path}: {reason}")]
    UnreadableFile { path: String, reason: String },

    /// No chapter matches the selector
    #[error("Chapter not found: {0}")]
    ChapterNotFound(String),

    /// A single discovery backend failed
    #[error("Discovery backend {backend} failed: {message}")]
    DiscoveryBackendError { backend: String, message: String },

    /// Every selected discovery backend failed
    #[error("All discovery backends failed: {}", .0.join("; "))]
    AllBackendsFailed(Vec<String>),

    /// Network-level download failure
    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Requested file does not exist under the storage root
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Requested path escapes the storage root
    #[error("Access to the requested path is not allowed: {0}")]
    PathNotAllowed(String),

    /// Failed to build HTTP client
    #[error("Failed to create HTTP client")]
    ClientBuildError(#[source] reqwest::Error),

    /// Background task failed
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, serializable error kind reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingUrl,
    InvalidUrlScheme,
    InvalidRequest,
    UnsupportedFormat,
    StorageError,
    UnreadableFile,
    ChapterNotFound,
    DiscoveryBackendError,
    AllBackendsFailed,
    DownloadFailed,
    FileNotFound,
    PathNotAllowed,
    Internal,
}

/// Structured error object returned over the tool and CLI surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl ShelfError {
    /// Create a storage error from an I/O failure
    pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
        ShelfError::StorageError {
            message: format!("{}: {}", message.into(), source),
            source: Some(source),
        }
    }

    /// Create an unreadable-file error
    pub fn unreadable(path: impl Into<String>, reason: impl ToString) -> Self {
        ShelfError::UnreadableFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a download error from a reqwest error
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "failed to connect to server".to_string()
        } else {
            err.to_string()
        };
        ShelfError::DownloadFailed {
            url: url.to_string(),
            reason,
        }
    }

    /// Kind used in the structured error object
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShelfError::MissingUrl => ErrorKind::MissingUrl,
            ShelfError::InvalidUrlScheme => ErrorKind::InvalidUrlScheme,
            ShelfError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ShelfError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ShelfError::StorageError { .. } => ErrorKind::StorageError,
            ShelfError::UnreadableFile { .. } => ErrorKind::UnreadableFile,
            ShelfError::ChapterNotFound(_) => ErrorKind::ChapterNotFound,
            ShelfError::DiscoveryBackendError { .. } => ErrorKind::DiscoveryBackendError,
            ShelfError::AllBackendsFailed(_) => ErrorKind::AllBackendsFailed,
            ShelfError::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            ShelfError::FileNotFound(_) => ErrorKind::FileNotFound,
            ShelfError::PathNotAllowed(_) => ErrorKind::PathNotAllowed,
            ShelfError::ClientBuildError(_) | ShelfError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Convert into the `{kind, message}` wire shape
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<&ShelfError> for ErrorReport {
    fn from(err: &ShelfError) -> Self {
        err.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ShelfError::MissingUrl.to_string(),
            "Missing required parameter: url"
        );
        assert_eq!(
            ShelfError::InvalidUrlScheme.to_string(),
            "Invalid URL: must start with http:// or https://"
        );
        assert_eq!(
            ShelfError::ChapterNotFound("Epilogue".to_string()).to_string(),
            "Chapter not found: Epilogue"
        );
        assert_eq!(
            ShelfError::AllBackendsFailed(vec!["gutendex: 500".into(), "openlibrary: timeout".into()])
                .to_string(),
            "All discovery backends failed: gutendex: 500; openlibrary: timeout"
        );
    }

    #[test]
    fn test_report_kind_serialization() {
        let err = ShelfError::UnsupportedFormat("image/png".to_string());
        let json = serde_json::to_value(err.report()).unwrap();
        assert_eq!(json["kind"], "unsupported_format");
        assert_eq!(json["message"], "Unsupported format: image/png");
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ShelfError::storage("failed to create directory", io);
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("denied"));
    }
}
