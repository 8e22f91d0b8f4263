//! Target directory and file name for each downloaded document.
//!
//! Layouts, with fields joined by `_`:
//!
//! - separate partner directories: `<root>/<partner>/<seq>_<partner>_<type>_<YYYYMM>.<ext>`
//! - flat: `<root>/<partner>_<seq>_<type>_<YYYYMM>.<ext>`
//!
//! `<seq>` is the zero-padded five digit sequence number. `<type>` is empty
//! when the document type is unresolved. In the separate layout distinct
//! sequence numbers always yield distinct paths, since the file name starts
//! with the sequence number. The flat layout gives no such guarantee: names
//! containing `_` can shift fields across separators, so two records may map
//! to the same path. The download engine rejects the later of such records.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::period::Period;
use crate::registry::ResolvedInvoice;

/// Characters replaced by `_` in partner and document type names.
pub const RESERVED_CHARS: [char; 10] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*', '.'];

/// MIME types accepted from Drive and the extension each one gets.
pub const MIME_EXTENSIONS: [(&str, &str); 12] = [
    ("application/pdf", "pdf"),
    ("text/csv", "csv"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("application/vnd.ms-powerpoint", "ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("text/plain", "txt"),
    ("application/vnd.ms-excel", "xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    ("application/zip", "zip"),
];

/// Per-record naming failures. Each one skips the record, never the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    /// The record has no usable partner.
    #[error("no partner found for registry item #{seq}")]
    UnresolvedPartner {
        /// Sequence number of the record.
        seq: u32,
    },

    /// Drive reported a MIME type outside [`MIME_EXTENSIONS`].
    #[error("unknown MIME type '{mime_type}'")]
    UnknownMimeType {
        /// The MIME type as reported.
        mime_type: String,
    },
}

/// Layout switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingOptions {
    /// One subdirectory per partner instead of a flat output root.
    pub separate_partner_dirs: bool,
}

/// Where a record's document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
    /// Directory that must exist before writing.
    pub directory: PathBuf,
    /// File name inside `directory`.
    pub file_name: String,
}

impl TargetPath {
    /// Full path of the target file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Replaces every [`RESERVED_CHARS`] character with `_`.
///
/// Idempotent, and the output never contains a reserved character.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Looks up the file extension for a MIME type, ignoring parameters and case.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Computes the target directory and file name for `invoice`.
///
/// Pure: nothing is created on disk.
///
/// # Errors
///
/// [`NamingError::UnresolvedPartner`] when the partner is missing or its name
/// is blank, [`NamingError::UnknownMimeType`] when `mime_type` has no known
/// extension.
pub fn compute_target_path(
    invoice: &ResolvedInvoice,
    mime_type: &str,
    period: Period,
    output_root: &Path,
    options: NamingOptions,
) -> Result<TargetPath, NamingError> {
    let seq = invoice.sequence_number();
    let partner = invoice
        .partner
        .as_deref()
        .map(|p| sanitize_name(&p.name))
        .filter(|name| !name.trim().is_empty())
        .ok_or(NamingError::UnresolvedPartner { seq })?;

    let extension =
        extension_for_mime(mime_type).ok_or_else(|| NamingError::UnknownMimeType {
            mime_type: mime_type.to_string(),
        })?;

    let document_type = invoice
        .document_type
        .as_deref()
        .map(|t| sanitize_name(&t.name))
        .unwrap_or_default();
    let padded_seq = format!("{seq:05}");
    let stamp = period.yyyymm();

    let (directory, file_name) = if options.separate_partner_dirs {
        (
            output_root.join(partner.trim()),
            format!("{padded_seq}_{partner}_{document_type}_{stamp}.{extension}"),
        )
    } else {
        (
            output_root.to_path_buf(),
            format!("{partner}_{padded_seq}_{document_type}_{stamp}.{extension}"),
        )
    };

    Ok(TargetPath {
        directory,
        file_name,
    })
}
