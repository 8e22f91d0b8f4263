//! Shared HTTP client construction policy.
//!
//! Airtable, Google Drive and the OAuth token endpoint all go through one
//! `reqwest::Client` built here, so timeouts, compression and the User-Agent
//! stay consistent across both remote services.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout (5 minutes, sized for large scans).
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// User-Agent identifying the tool and its version.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("accounting-downloader/{version}")
}

/// Builds the shared HTTP client.
///
/// # Errors
///
/// Returns the underlying [`reqwest::Error`] when the TLS backend or system
/// configuration cannot be initialised.
pub fn build_http_client(request_timeout_secs: u64) -> Result<Client, reqwest::Error> {
    debug!(
        connect_timeout_secs = CONNECT_TIMEOUT_SECS,
        request_timeout_secs, "building HTTP client"
    );
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(request_timeout_secs))
        .gzip(true)
        .user_agent(default_user_agent())
        .build()
}
