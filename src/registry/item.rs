//! Registry entries after the partner/type join.

use std::sync::Arc;

use crate::airtable::{DocumentType, InvoiceRecord, Partner};

/// A registry entry whose partner and document type lookups have been done.
///
/// `partner` and `document_type` share the lookup maps' values rather than
/// copying them. A `None` means the link was empty or pointed at an id the
/// lookup table does not contain.
#[derive(Debug, Clone)]
pub struct ResolvedInvoice {
    /// The registry fields as fetched.
    pub record: InvoiceRecord,
    /// Drive file id; always present for entries handed to the downloader.
    pub remote_file_id: String,
    /// Resolved partner.
    pub partner: Option<Arc<Partner>>,
    /// Resolved document type.
    pub document_type: Option<Arc<DocumentType>>,
}

impl ResolvedInvoice {
    /// Per-month sequence number.
    #[must_use]
    pub fn sequence_number(&self) -> u32 {
        self.record.sequence_number
    }

    /// Display name for log lines.
    #[must_use]
    pub fn name(&self) -> &str {
        self.record.display_name()
    }
}

/// Output of a month load.
#[derive(Debug, Default)]
pub struct LoadedInvoices {
    /// Resolved entries in Airtable order.
    pub invoices: Vec<ResolvedInvoice>,
    /// Entries dropped because they carry no Drive file id.
    pub skipped_without_file: usize,
}
