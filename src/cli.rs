//! CLI argument definitions using clap derive macros.

use clap::Parser;

/// Download one month of accounting documents.
///
/// Reads the invoice registry from Airtable and downloads every referenced
/// document from Google Drive into the configured target directory, which is
/// emptied first. Settings come from `accounting-config.json` in the working
/// directory, or the file named by `ACCOUNTING_DOWNLOADER_CONFIG`. Log
/// verbosity follows `RUST_LOG`.
#[derive(Parser, Debug)]
#[command(name = "accounting-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Year of the invoices to download (e.g. 2024)
    #[arg(value_parser = clap::value_parser!(i32).range(1..=9999))]
    pub year: i32,

    /// Month of the invoices to download (1-12)
    #[arg(value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: u32,
}
