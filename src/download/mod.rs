//! Concurrent retrieval of registry documents into the output directory.
//!
//! - [`naming`] - target directory and file name computation
//! - [`DownloadEngine`] - one task per record, failures isolated per record
//! - [`DownloadError`] - why a single record produced no file

mod engine;
mod error;
pub mod naming;

pub use engine::{DownloadEngine, DownloadStats, EngineError};
pub use error::DownloadError;
pub use naming::{
    MIME_EXTENSIONS, NamingError, NamingOptions, RESERVED_CHARS, TargetPath, compute_target_path,
    extension_for_mime, sanitize_name,
};

// Note: no module-local Result aliases; use `Result<T, DownloadError>` explicitly.
