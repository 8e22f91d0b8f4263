//! Error types for Google Drive file access.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching a file from Google Drive.
#[derive(Debug, Error)]
pub enum DriveError {
    /// Network-level error (DNS resolution, connection refused, TLS, timeout).
    #[error("network error fetching Drive file {file_id}: {source}")]
    Network {
        /// The Drive file id.
        file_id: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Drive answered with a non-success status.
    #[error("HTTP {status} fetching Drive file {file_id}: {body}")]
    HttpStatus {
        /// The Drive file id.
        file_id: String,
        /// The HTTP status code.
        status: u16,
        /// Response body (Drive's JSON error object).
        body: String,
    },

    /// The access token was rejected or lacks access to the file.
    #[error(
        "[AUTH] Drive rejected the credentials (HTTP {status}) for file {file_id}\n  Suggestion: delete the stored token to re-run the consent flow"
    )]
    AuthRequired {
        /// The Drive file id.
        file_id: String,
        /// 401 or 403.
        status: u16,
    },

    /// File metadata did not have the expected shape.
    #[error("unexpected metadata for Drive file {file_id}: {source}")]
    Decode {
        /// The Drive file id.
        file_id: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing the downloaded content failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The target path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DriveError {
    /// Creates a network error.
    pub fn network(file_id: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            file_id: file_id.into(),
            source,
        }
    }

    /// Maps a non-success status to [`AuthRequired`](Self::AuthRequired) for
    /// 401/403 and [`HttpStatus`](Self::HttpStatus) otherwise.
    pub fn from_status(file_id: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        if matches!(status, 401 | 403) {
            Self::AuthRequired {
                file_id: file_id.into(),
                status,
            }
        } else {
            Self::HttpStatus {
                file_id: file_id.into(),
                status,
                body: body.into(),
            }
        }
    }

    /// Creates a decode error.
    pub fn decode(file_id: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            file_id: file_id.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_promotes_auth_codes() {
        assert!(matches!(
            DriveError::from_status("f1", 401, ""),
            DriveError::AuthRequired { status: 401, .. }
        ));
        assert!(matches!(
            DriveError::from_status("f1", 403, ""),
            DriveError::AuthRequired { status: 403, .. }
        ));
        assert!(matches!(
            DriveError::from_status("f1", 404, "not found"),
            DriveError::HttpStatus { status: 404, .. }
        ));
    }

    #[test]
    fn test_auth_required_display_has_prefix_and_hint() {
        let msg = DriveError::from_status("f1", 401, "").to_string();
        assert!(msg.starts_with("[AUTH]"), "{msg}");
        assert!(msg.contains("f1"), "{msg}");
        assert!(msg.contains("Suggestion"), "{msg}");
    }
}
