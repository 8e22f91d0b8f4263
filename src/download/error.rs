//! Per-record download failures.
//!
//! None of these stop the run; the engine logs them and moves on.

use std::path::PathBuf;

use thiserror::Error;

use super::naming::NamingError;
use crate::drive::DriveError;

/// Errors that can occur while retrieving one record's document.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The target path could not be computed.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// Drive metadata or content retrieval failed.
    #[error(transparent)]
    Drive(#[from] DriveError),

    /// The target directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        /// The directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Another record of the same batch already targets this path.
    #[error("target {path} already claimed by registry item #{claimed_by}")]
    TargetTaken {
        /// The contested file path.
        path: PathBuf,
        /// Sequence number of the record that claimed it first.
        claimed_by: u32,
    },
}

impl DownloadError {
    /// Creates a directory-creation error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }
}
