//! Accounting Downloader Library
//!
//! Downloads one month of accounting documents: the invoice registry lives in
//! Airtable, the documents themselves in Google Drive.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`period`] - the year/month being downloaded
//! - [`airtable`] - paginated Airtable client, record shapes, registry filter
//! - [`registry`] - month loading and the partner/document-type join
//! - [`drive`] - Google Drive OAuth and file retrieval
//! - [`download`] - file naming policy and the concurrent download engine
//! - [`config`] - configuration file loading and validation
//! - [`app`] - run orchestration
//!
//! A run is two phases. The fetch phase reads document types, partners and
//! the month's registry entries one table at a time and fails the whole run on
//! any error. The download phase starts one task per entry; a failed entry is
//! logged and skipped without touching the others.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod airtable;
pub mod app;
pub mod config;
pub mod download;
pub mod drive;
pub mod http;
pub mod period;
pub mod registry;

// Re-export commonly used types
pub use airtable::{AirtableClient, AirtableError, InvoiceRecord};
pub use app::{RunError, RunSummary, run, run_with};
pub use config::{AppConfig, ConfigError, default_config_path};
pub use download::{DownloadEngine, DownloadError, DownloadStats, NamingError, NamingOptions};
pub use drive::{DriveClient, DriveError, FileStorage, GoogleAuthenticator};
pub use period::{Period, PeriodError};
pub use registry::{LoadedInvoices, RecordRepository, RegistryTables, ResolvedInvoice};
