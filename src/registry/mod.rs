//! Month loading and the partner/document-type join.

mod item;
mod repository;

pub use item::{LoadedInvoices, ResolvedInvoice};
pub use repository::{RecordRepository, RegistryTables};
