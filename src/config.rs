//! Application configuration file.
//!
//! One JSON document with camelCase keys, loaded once at startup and passed by
//! reference to whatever needs it:
//!
//! ```json
//! {
//!   "applicationName": "Accounting",
//!   "download": { "targetDir": "accounting-files", "separatePartnerDirs": true },
//!   "airtable": {
//!     "baseId": "appXXXX", "recordTableId": "tblRecords",
//!     "partnerTableId": "tblPartners", "typeTableId": "tblTypes", "token": "patXXXX"
//!   },
//!   "google": { "clientSecret": "client_secret.json", "tokenDir": "tokens" }
//! }
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::airtable;
use crate::drive;
use crate::http::REQUEST_TIMEOUT_SECS;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "ACCOUNTING_DOWNLOADER_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const DEFAULT_CONFIG_FILE: &str = "accounting-config.json";

/// Errors loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error(
        "[CONFIG] config file not found: {path}\n  Suggestion: create it or point {CONFIG_PATH_ENV} at an existing file"
    )]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The config file exists but could not be read.
    #[error("[CONFIG] cannot read config file {path}: {source}")]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or misses required keys.
    #[error("[CONFIG] cannot parse config file {path}: {source}")]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is present but unusable.
    #[error("[CONFIG] invalid value for `{field}`: {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Name shown in the run banner and sent nowhere else.
    pub application_name: String,
    /// Local output settings.
    pub download: DownloadConfig,
    /// Registry source.
    pub airtable: AirtableConfig,
    /// Drive credentials.
    pub google: GoogleConfig,
}

/// `download` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfig {
    /// Output root. Deleted and recreated on every run.
    pub target_dir: PathBuf,
    /// One subdirectory per partner instead of a flat output root.
    pub separate_partner_dirs: bool,
    /// Cap on downloads in flight; unbounded when absent.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// `airtable` section.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirtableConfig {
    /// Base holding the registry (`app...`).
    pub base_id: String,
    /// Document registry table, filtered by month.
    pub record_table_id: String,
    /// Partner table, read in full.
    pub partner_table_id: String,
    /// Document type table, read in full.
    pub type_table_id: String,
    /// Personal access token.
    pub token: String,
    /// API root; defaults to the public Airtable endpoint.
    #[serde(default = "default_airtable_base_url")]
    pub base_url: String,
}

/// `google` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// Installed-app OAuth client secret JSON.
    pub client_secret: PathBuf,
    /// Directory holding the stored Drive token.
    pub token_dir: PathBuf,
    /// Drive v3 API root.
    #[serde(default = "default_drive_base_url")]
    pub drive_base_url: String,
    /// Local port receiving the OAuth redirect.
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
}

fn default_timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

fn default_airtable_base_url() -> String {
    airtable::DEFAULT_BASE_URL.to_string()
}

fn default_drive_base_url() -> String {
    drive::DEFAULT_BASE_URL.to_string()
}

fn default_callback_port() -> u16 {
    drive::DEFAULT_CALLBACK_PORT
}

impl std::fmt::Debug for AirtableConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableConfig")
            .field("base_id", &self.base_id)
            .field("record_table_id", &self.record_table_id)
            .field("partner_table_id", &self.partner_table_id)
            .field("type_table_id", &self.type_table_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Reads, parses and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, unreadable, malformed
    /// or holds invalid values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let config = Self::from_json(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parses and validates a config document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] (with an empty path) or [`ConfigError::Invalid`].
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot: blank strings and numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_blank("applicationName", &self.application_name)?;
        require_non_blank_path("download.targetDir", &self.download.target_dir)?;
        require_non_blank("airtable.baseId", &self.airtable.base_id)?;
        require_non_blank("airtable.recordTableId", &self.airtable.record_table_id)?;
        require_non_blank("airtable.partnerTableId", &self.airtable.partner_table_id)?;
        require_non_blank("airtable.typeTableId", &self.airtable.type_table_id)?;
        require_non_blank("airtable.token", &self.airtable.token)?;
        require_non_blank("airtable.baseUrl", &self.airtable.base_url)?;
        require_non_blank_path("google.clientSecret", &self.google.client_secret)?;
        require_non_blank_path("google.tokenDir", &self.google.token_dir)?;
        require_non_blank("google.driveBaseUrl", &self.google.drive_base_url)?;

        if let Some(value) = self.download.max_concurrency
            && !(1..=100).contains(&value)
        {
            return Err(ConfigError::invalid(
                "download.maxConcurrency",
                format!("{value}. Expected range: 1..=100"),
            ));
        }
        if !(1..=3600).contains(&self.download.timeout_secs) {
            return Err(ConfigError::invalid(
                "download.timeoutSecs",
                format!("{}. Expected range: 1..=3600", self.download.timeout_secs),
            ));
        }
        if self.google.callback_port == 0 {
            return Err(ConfigError::invalid(
                "google.callbackPort",
                "port 0 cannot receive the OAuth redirect",
            ));
        }
        Ok(())
    }
}

fn require_non_blank(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(())
}

fn require_non_blank_path(field: &'static str, value: &Path) -> Result<(), ConfigError> {
    if value.as_os_str().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(())
}

/// Resolves the config file location.
///
/// Priority:
/// 1. `$ACCOUNTING_DOWNLOADER_CONFIG` when set and non-empty
/// 2. `accounting-config.json` in the working directory
#[must_use]
pub fn default_config_path() -> PathBuf {
    config_path_from(env::var_os(CONFIG_PATH_ENV))
}

fn config_path_from(value: Option<std::ffi::OsString>) -> PathBuf {
    value
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}
