//! Google Drive access: OAuth token acquisition and file retrieval.
//!
//! - [`GoogleAuthenticator`] - cached/refreshed/interactive OAuth2 tokens
//! - [`FileStorage`] - async trait the download engine retrieves files through
//! - [`DriveClient`] - Drive v3 implementation of [`FileStorage`]

mod auth;
mod client;
mod error;

pub use auth::{
    AuthError, DEFAULT_CALLBACK_PORT, DRIVE_READONLY_SCOPE, GoogleAuthenticator, StoredToken,
    TOKEN_FILE_NAME,
};
pub use client::{DEFAULT_BASE_URL, DriveClient, FileStorage, RemoteFile};
pub use error::DriveError;
