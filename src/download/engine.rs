//! Concurrent retrieval of registry documents from file storage.
//!
//! # Concurrency Model
//!
//! - One Tokio task per record, all spawned up front
//! - Tasks share nothing mutable except the [`DownloadStats`] counters and
//!   the set of claimed target paths
//! - Two records whose names collapse onto the same target path never
//!   overwrite each other: the first to claim the path downloads, the other
//!   fails with [`DownloadError::TargetTaken`]
//! - Each task's failure is logged and counted inside the task; siblings keep
//!   running and the engine waits for every task to settle
//! - With [`DownloadEngine::with_max_concurrency`] a semaphore permit is
//!   taken before each spawn, capping tasks in flight
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use accounting_downloader::download::{DownloadEngine, NamingOptions};
//! use accounting_downloader::drive::DriveClient;
//! use accounting_downloader::Period;
//!
//! # async fn example(invoices: Vec<accounting_downloader::registry::ResolvedInvoice>) -> Result<(), Box<dyn std::error::Error>> {
//! let drive = Arc::new(DriveClient::new(reqwest::Client::new(), "ya29.token"));
//! let engine = DownloadEngine::new(
//!     drive,
//!     PathBuf::from("accounting-files"),
//!     Period::new(2024, 3)?,
//!     NamingOptions { separate_partner_dirs: true },
//! );
//! let stats = engine.download_all(invoices).await;
//! println!("Completed: {}, Failed: {}", stats.completed(), stats.failed());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;
use super::naming::{NamingOptions, compute_target_path};
use crate::drive::FileStorage;
use crate::period::Period;
use crate::registry::ResolvedInvoice;

/// Minimum allowed concurrency cap.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency cap.
const MAX_CONCURRENCY: usize = 100;

/// Error type for download engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency cap provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Counters from one download phase.
///
/// Uses atomic counters so every task can update them without locking.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents written to disk.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of records that produced no file.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of records processed (completed + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fans out one retrieval task per resolved registry entry.
pub struct DownloadEngine {
    storage: Arc<dyn FileStorage>,
    output_root: PathBuf,
    period: Period,
    naming: NamingOptions,
    semaphore: Option<Arc<Semaphore>>,
    max_concurrency: Option<usize>,
}

impl DownloadEngine {
    /// Creates an engine with unbounded fan-out.
    pub fn new(
        storage: Arc<dyn FileStorage>,
        output_root: impl Into<PathBuf>,
        period: Period,
        naming: NamingOptions,
    ) -> Self {
        Self {
            storage,
            output_root: output_root.into(),
            period,
            naming,
            semaphore: None,
            max_concurrency: None,
        }
    }

    /// Caps the number of tasks in flight.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `max_concurrency` is
    /// outside 1..=100.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&max_concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: max_concurrency,
            });
        }
        self.semaphore = Some(Arc::new(Semaphore::new(max_concurrency)));
        self.max_concurrency = Some(max_concurrency);
        Ok(self)
    }

    /// Returns the concurrency cap, `None` when unbounded.
    #[must_use]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Downloads every record and waits for all tasks to settle.
    ///
    /// Individual failures never abort the phase; they are logged with the
    /// record's sequence number and name and counted in the returned stats.
    #[instrument(skip(self, invoices), fields(records = invoices.len(), output_root = %self.output_root.display()))]
    pub async fn download_all(&self, invoices: Vec<ResolvedInvoice>) -> DownloadStats {
        let stats = Arc::new(DownloadStats::new());
        let claims: Arc<TargetClaims> = Arc::new(DashMap::new());
        let mut handles = Vec::with_capacity(invoices.len());

        info!("starting downloads");

        for invoice in invoices {
            let permit = match &self.semaphore {
                Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(seq = invoice.sequence_number(), "semaphore closed, skipping record");
                        stats.increment_failed();
                        continue;
                    }
                },
                None => None,
            };

            let storage = Arc::clone(&self.storage);
            let stats = Arc::clone(&stats);
            let claims = Arc::clone(&claims);
            let output_root = self.output_root.clone();
            let period = self.period;
            let naming = self.naming;

            handles.push(tokio::spawn(async move {
                let _permit = permit;

                info!(
                    seq = invoice.sequence_number(),
                    name = invoice.name(),
                    "downloading file of registry item"
                );

                let context = TaskContext {
                    output_root: &output_root,
                    period,
                    naming,
                    claims: &claims,
                };
                match download_one(storage.as_ref(), &invoice, &context).await {
                    Ok(path) => {
                        info!(
                            seq = invoice.sequence_number(),
                            path = %path.display(),
                            "file downloaded"
                        );
                        stats.increment_completed();
                    }
                    Err(e) => {
                        warn!(
                            seq = invoice.sequence_number(),
                            name = invoice.name(),
                            error = %e,
                            "download failed, record skipped"
                        );
                        stats.increment_failed();
                    }
                }
            }));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        for handle in handles {
            // A panicking task counts as a failed record; the rest continue.
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
                stats.increment_failed();
            }
        }

        let completed = stats.completed();
        let failed = stats.failed();
        info!(
            completed,
            failed,
            total = completed + failed,
            "downloads finished"
        );

        let final_stats = DownloadStats::new();
        final_stats.completed.store(completed, Ordering::SeqCst);
        final_stats.failed.store(failed, Ordering::SeqCst);
        final_stats
    }
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("output_root", &self.output_root)
            .field("period", &self.period)
            .field("naming", &self.naming)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

/// Target paths already taken in the current batch, with the claiming
/// record's sequence number.
type TargetClaims = DashMap<PathBuf, u32>;

/// Per-batch settings shared by every task.
struct TaskContext<'a> {
    output_root: &'a Path,
    period: Period,
    naming: NamingOptions,
    claims: &'a TargetClaims,
}

/// Metadata, target path, claim, directory, content: in that order.
async fn download_one(
    storage: &dyn FileStorage,
    invoice: &ResolvedInvoice,
    context: &TaskContext<'_>,
) -> Result<PathBuf, DownloadError> {
    let remote = storage.file_metadata(&invoice.remote_file_id).await?;
    let target = compute_target_path(
        invoice,
        &remote.mime_type,
        context.period,
        context.output_root,
        context.naming,
    )?;
    let path = target.path();
    claim_target(context.claims, &path, invoice.sequence_number())?;

    tokio::fs::create_dir_all(&target.directory)
        .await
        .map_err(|e| DownloadError::create_dir(&target.directory, e))?;

    let bytes = storage.download_to(&invoice.remote_file_id, &path).await?;
    debug!(path = %path.display(), bytes, "content written");
    Ok(path)
}

/// Reserves `path` for record `seq`. The first claim wins; later records
/// aiming at the same path fail instead of overwriting it.
fn claim_target(claims: &TargetClaims, path: &Path, seq: u32) -> Result<(), DownloadError> {
    match claims.entry(path.to_path_buf()) {
        Entry::Occupied(taken) => Err(DownloadError::TargetTaken {
            path: path.to_path_buf(),
            claimed_by: *taken.get(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(seq);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::airtable::{DocumentType, InvoiceRecord, Partner};
    use crate::drive::{DriveError, RemoteFile};

    /// In-memory store: file id -> (mime type, content).
    #[derive(Default)]
    struct MemoryStorage {
        files: HashMap<String, (String, Vec<u8>)>,
        downloads: Mutex<Vec<String>>,
    }

    impl MemoryStorage {
        fn with_file(mut self, id: &str, mime: &str, content: &[u8]) -> Self {
            self.files
                .insert(id.to_string(), (mime.to_string(), content.to_vec()));
            self
        }
    }

    #[async_trait]
    impl FileStorage for MemoryStorage {
        async fn file_metadata(&self, file_id: &str) -> Result<RemoteFile, DriveError> {
            let (mime, _) = self
                .files
                .get(file_id)
                .ok_or_else(|| DriveError::from_status(file_id, 404, "not found"))?;
            Ok(RemoteFile {
                id: file_id.to_string(),
                name: format!("{file_id}.bin"),
                mime_type: mime.clone(),
            })
        }

        async fn download_to(&self, file_id: &str, path: &Path) -> Result<u64, DriveError> {
            let (_, content) = self
                .files
                .get(file_id)
                .ok_or_else(|| DriveError::from_status(file_id, 404, "not found"))?;
            self.downloads.lock().unwrap().push(file_id.to_string());
            tokio::fs::write(path, content)
                .await
                .map_err(|e| DriveError::io(path, e))?;
            Ok(content.len() as u64)
        }
    }

    fn invoice(seq: u32, partner: Option<&str>, file_id: &str) -> ResolvedInvoice {
        ResolvedInvoice {
            record: InvoiceRecord {
                sequence_number: seq,
                name: Some(format!("item {seq}")),
                ..InvoiceRecord::default()
            },
            remote_file_id: file_id.to_string(),
            partner: partner.map(|name| {
                Arc::new(Partner {
                    name: name.to_string(),
                    notes: String::new(),
                })
            }),
            document_type: None,
        }
    }

    fn typed(mut invoice: ResolvedInvoice, kind: &str) -> ResolvedInvoice {
        invoice.document_type = Some(Arc::new(DocumentType {
            name: kind.to_string(),
        }));
        invoice
    }

    fn engine(storage: MemoryStorage, root: &Path, separate: bool) -> DownloadEngine {
        DownloadEngine::new(
            Arc::new(storage),
            root,
            Period::new(2024, 3).unwrap(),
            NamingOptions {
                separate_partner_dirs: separate,
            },
        )
    }

    #[test]
    fn test_engine_concurrency_cap_bounds() {
        let dir = TempDir::new().unwrap();
        let make = || engine(MemoryStorage::default(), dir.path(), false);

        assert_eq!(make().max_concurrency(), None);
        assert_eq!(make().with_max_concurrency(1).unwrap().max_concurrency(), Some(1));
        assert_eq!(make().with_max_concurrency(100).unwrap().max_concurrency(), Some(100));
        assert!(matches!(
            make().with_max_concurrency(0),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            make().with_max_concurrency(101),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[tokio::test]
    async fn test_download_all_writes_files_into_partner_directories() {
        let dir = TempDir::new().unwrap();
        let storage = MemoryStorage::default()
            .with_file("f1", "application/pdf", b"one")
            .with_file("f2", "image/jpeg", b"two");
        let stats = engine(storage, dir.path(), true)
            .download_all(vec![invoice(1, Some("Acme"), "f1"), invoice(2, Some("Globex"), "f2")])
            .await;

        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 0);
        assert_eq!(
            std::fs::read(dir.path().join("Acme/00001_Acme__202403.pdf")).unwrap(),
            b"one"
        );
        assert_eq!(
            std::fs::read(dir.path().join("Globex/00002_Globex__202403.jpg")).unwrap(),
            b"two"
        );
    }

    #[tokio::test]
    async fn test_failed_records_do_not_affect_siblings() {
        let dir = TempDir::new().unwrap();
        let storage = MemoryStorage::default()
            .with_file("good", "application/pdf", b"ok")
            .with_file("odd", "application/x-unknown", b"??")
            .with_file("orphan", "application/pdf", b"no partner");
        let stats = engine(storage, dir.path(), false)
            .download_all(vec![
                invoice(1, Some("Acme"), "good"),
                invoice(2, Some("Acme"), "odd"),
                invoice(3, None, "orphan"),
                invoice(4, Some("Acme"), "missing"),
            ])
            .await;

        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.failed(), 3);
        assert_eq!(stats.total(), 4);

        let written: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(written, vec!["Acme_00001__202403.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_naming_failure_skips_content_download() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(
            MemoryStorage::default().with_file("orphan", "application/pdf", b"x"),
        );
        let engine = DownloadEngine::new(
            Arc::clone(&storage) as Arc<dyn FileStorage>,
            dir.path(),
            Period::new(2024, 3).unwrap(),
            NamingOptions::default(),
        );

        let stats = engine.download_all(vec![invoice(3, None, "orphan")]).await;

        assert_eq!(stats.failed(), 1);
        assert!(storage.downloads.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_bounded_engine_still_downloads_everything() {
        let dir = TempDir::new().unwrap();
        let mut storage = MemoryStorage::default();
        let mut invoices = Vec::new();
        for seq in 1..=20 {
            let id = format!("f{seq}");
            storage = storage.with_file(&id, "text/plain", id.as_bytes());
            invoices.push(invoice(seq, Some("Acme"), &id));
        }

        let stats = engine(storage, dir.path(), true)
            .with_max_concurrency(3)
            .unwrap()
            .download_all(invoices)
            .await;

        assert_eq!(stats.completed(), 20);
        assert_eq!(std::fs::read_dir(dir.path().join("Acme")).unwrap().count(), 20);
    }

    #[tokio::test]
    async fn test_existing_file_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Acme_00001__202403.pdf");
        std::fs::write(&target, b"stale content that is longer").unwrap();

        let storage = MemoryStorage::default().with_file("f1", "application/pdf", b"fresh");
        let stats = engine(storage, dir.path(), false)
            .download_all(vec![invoice(1, Some("Acme"), "f1")])
            .await;

        assert_eq!(stats.completed(), 1);
        assert_eq!(std::fs::read(&target).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_flat_layout_collision_keeps_first_file() {
        let dir = TempDir::new().unwrap();
        let storage = MemoryStorage::default()
            .with_file("f1", "application/pdf", b"first")
            .with_file("f2", "application/pdf", b"second");
        // Both records name out/A_00001_00002_B_202403.pdf; one task at a
        // time makes seq 1 the first claimant.
        let stats = engine(storage, dir.path(), false)
            .with_max_concurrency(1)
            .unwrap()
            .download_all(vec![
                typed(invoice(1, Some("A"), "f1"), "00002_B"),
                typed(invoice(2, Some("A_00001"), "f2"), "B"),
            ])
            .await;

        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(
            std::fs::read(dir.path().join("A_00001_00002_B_202403.pdf")).unwrap(),
            b"first"
        );
    }

    #[test]
    fn test_second_claim_on_same_target_is_rejected() {
        let claims = TargetClaims::new();
        let path = Path::new("out/A_00001_00002_B_202403.pdf");

        claim_target(&claims, path, 1).unwrap();
        let err = claim_target(&claims, path, 2).unwrap_err();

        assert!(
            matches!(&err, DownloadError::TargetTaken { claimed_by: 1, path: p } if p == path),
            "{err:?}"
        );
        claim_target(&claims, Path::new("out/other.pdf"), 2).unwrap();
    }

    #[test]
    fn test_download_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    stats.increment_completed();
                    stats.increment_failed();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.completed(), 400);
        assert_eq!(stats.failed(), 400);
        assert_eq!(stats.total(), 800);
    }
}
