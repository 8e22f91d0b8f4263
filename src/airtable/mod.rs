//! Airtable access: paginated listing, record shapes, and the registry filter.
//!
//! # Example
//!
//! ```no_run
//! use accounting_downloader::airtable::{AirtableClient, DocumentType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AirtableClient::new(reqwest::Client::new(), "appXXXXXXXX", "patXXXXXXXX");
//! let types = client.fetch_as_map::<DocumentType>("tblTypes").await?;
//! println!("{} document types", types.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod filter;
mod model;

pub use client::{AirtableClient, DEFAULT_BASE_URL};
pub use error::AirtableError;
pub use filter::{INVOICE_DOCUMENT_TYPES, invoices_of_month};
pub use model::{AirtablePage, AirtableRecord, DocumentType, InvoiceRecord, Partner};
