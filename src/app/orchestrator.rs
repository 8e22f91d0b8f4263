//! One run: authenticate, reset the output root, load the month, download.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::airtable::{AirtableClient, AirtableError};
use crate::config::AppConfig;
use crate::download::{DownloadEngine, EngineError, NamingOptions};
use crate::drive::{AuthError, DriveClient, FileStorage, GoogleAuthenticator};
use crate::http::build_http_client;
use crate::period::Period;
use crate::registry::{RecordRepository, RegistryTables};

/// Fatal run failures. Per-record download failures never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    /// No Drive access token could be obtained.
    #[error("[AUTH] {0}")]
    Auth(#[from] AuthError),

    /// A registry table could not be fetched completely.
    #[error("[FETCH] {0}")]
    Fetch(#[from] AirtableError),

    /// The output root could not be reset.
    #[error("cannot reset output directory {path}: {source}")]
    OutputDir {
        /// The output root.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The shared HTTP client could not be built.
    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The download engine rejected its settings.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// What one run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// The month that was downloaded.
    pub period: Period,
    /// Registry entries handed to the downloader.
    pub fetched: usize,
    /// Registry entries dropped for lacking a Drive file.
    pub skipped_without_file: usize,
    /// Files written.
    pub completed: usize,
    /// Entries that produced no file.
    pub failed: usize,
}

impl RunSummary {
    /// Entries that went through the download phase.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

/// Runs the whole pipeline against the live services named in `config`.
///
/// # Errors
///
/// Returns [`RunError`] when authentication, the output directory reset, or
/// any registry fetch fails. Individual download failures are logged and
/// counted in the summary instead.
pub async fn run(config: &AppConfig, period: Period) -> Result<RunSummary, RunError> {
    let client = build_http_client(config.download.timeout_secs).map_err(RunError::HttpClient)?;

    let authenticator = GoogleAuthenticator::new(
        client.clone(),
        &config.google.client_secret,
        &config.google.token_dir,
        config.google.callback_port,
    );
    let access_token = authenticator.access_token().await?;
    info!("authenticated with Google Drive");

    let storage: Arc<dyn FileStorage> = Arc::new(DriveClient::with_base_url(
        client.clone(),
        &config.google.drive_base_url,
        access_token,
    ));
    let repository = RecordRepository::new(
        AirtableClient::with_base_url(
            client,
            &config.airtable.base_url,
            &config.airtable.base_id,
            &config.airtable.token,
        ),
        registry_tables(config),
    );

    run_with(config, period, &repository, storage).await
}

/// Runs the pipeline after authentication with the given collaborators.
///
/// # Errors
///
/// See [`run`].
#[instrument(skip_all, fields(period = %period, target_dir = %config.download.target_dir.display()))]
pub async fn run_with(
    config: &AppConfig,
    period: Period,
    repository: &RecordRepository,
    storage: Arc<dyn FileStorage>,
) -> Result<RunSummary, RunError> {
    let mut engine = DownloadEngine::new(
        storage,
        &config.download.target_dir,
        period,
        NamingOptions {
            separate_partner_dirs: config.download.separate_partner_dirs,
        },
    );
    if let Some(max) = config.download.max_concurrency {
        engine = engine.with_max_concurrency(max)?;
    }

    reset_output_dir(&config.download.target_dir).await?;

    info!(
        application = %config.application_name,
        "Downloading files for {period}..."
    );
    let loaded = repository.load_invoices_for_month(period).await?;
    let fetched = loaded.invoices.len();

    let stats = engine.download_all(loaded.invoices).await;

    let summary = RunSummary {
        period,
        fetched,
        skipped_without_file: loaded.skipped_without_file,
        completed: stats.completed(),
        failed: stats.failed(),
    };
    info!(
        fetched = summary.fetched,
        skipped_without_file = summary.skipped_without_file,
        completed = summary.completed,
        failed = summary.failed,
        total = summary.total(),
        "run finished"
    );
    Ok(summary)
}

fn registry_tables(config: &AppConfig) -> RegistryTables {
    RegistryTables {
        records: config.airtable.record_table_id.clone(),
        partners: config.airtable.partner_table_id.clone(),
        types: config.airtable.type_table_id.clone(),
    }
}

/// Deletes `path` with everything in it and creates it again, empty.
async fn reset_output_dir(path: &Path) -> Result<(), RunError> {
    let output_dir_error = |source| RunError::OutputDir {
        path: path.to_path_buf(),
        source,
    };

    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(output_dir_error(e)),
    }
    tokio::fs::create_dir_all(path)
        .await
        .map_err(output_dir_error)?;

    info!(path = %path.display(), "output directory reset");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_reset_output_dir_discards_previous_content() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        std::fs::create_dir_all(root.join("Old Partner")).unwrap();
        std::fs::write(root.join("Old Partner/stale.pdf"), b"old").unwrap();

        reset_output_dir(&root).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_reset_output_dir_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested/out");

        reset_output_dir(&root).await.unwrap();

        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_reset_output_dir_fails_when_path_is_a_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        std::fs::write(&root, b"not a directory").unwrap();

        let err = reset_output_dir(&root).await.unwrap_err();
        assert!(matches!(err, RunError::OutputDir { .. }), "{err:?}");
    }

    #[test]
    fn test_run_summary_total() {
        let summary = RunSummary {
            period: Period::new(2024, 3).unwrap(),
            fetched: 5,
            skipped_without_file: 1,
            completed: 3,
            failed: 2,
        };
        assert_eq!(summary.total(), 5);
    }

    #[test]
    fn test_run_error_display_is_tagged() {
        let err = RunError::from(AirtableError::remote_fetch("tblRecords", 500, "boom"));
        let msg = err.to_string();
        assert!(msg.starts_with("[FETCH]"), "{msg}");
        assert!(msg.contains("tblRecords"), "{msg}");
    }
}
