//! Loads a month of registry entries and joins them with their lookups.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::item::{LoadedInvoices, ResolvedInvoice};
use crate::airtable::{
    AirtableClient, AirtableError, DocumentType, InvoiceRecord, Partner, invoices_of_month,
};
use crate::period::Period;

/// Table ids of the three tables the repository reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTables {
    /// Registry (invoice) table.
    pub records: String,
    /// Partner table.
    pub partners: String,
    /// Document type table.
    pub types: String,
}

/// Owns the lookup maps for one run and performs the foreign-key join.
#[derive(Debug)]
pub struct RecordRepository {
    client: AirtableClient,
    tables: RegistryTables,
}

impl RecordRepository {
    /// Creates a repository reading `tables` through `client`.
    #[must_use]
    pub fn new(client: AirtableClient, tables: RegistryTables) -> Self {
        Self { client, tables }
    }

    /// Loads the registry entries of `period` with partner and document type
    /// resolved.
    ///
    /// Tables are read one after another: document types, partners, then the
    /// filtered registry. Output order is Airtable's order. Entries without a
    /// Drive file id are dropped and counted.
    ///
    /// # Errors
    ///
    /// Any [`AirtableError`] from the three fetches aborts the load.
    #[instrument(skip(self), fields(period = %period))]
    pub async fn load_invoices_for_month(
        &self,
        period: Period,
    ) -> Result<LoadedInvoices, AirtableError> {
        let types = into_shared(
            self.client
                .fetch_as_map::<DocumentType>(&self.tables.types)
                .await?,
        );
        let partners = into_shared(
            self.client
                .fetch_as_map::<Partner>(&self.tables.partners)
                .await?,
        );

        let filter = invoices_of_month(period);
        debug!(%filter, "registry filter");
        let records = self
            .client
            .fetch_all::<InvoiceRecord>(&self.tables.records, Some(&filter))
            .await?;

        let loaded = join(
            records.into_iter().map(|r| r.fields),
            &partners,
            &types,
        );
        info!(
            invoices = loaded.invoices.len(),
            skipped_without_file = loaded.skipped_without_file,
            "registry loaded"
        );
        Ok(loaded)
    }
}

fn into_shared<T>(map: HashMap<String, T>) -> HashMap<String, Arc<T>> {
    map.into_iter().map(|(id, v)| (id, Arc::new(v))).collect()
}

/// Resolves partner and document type for each record by their first linked id.
pub(crate) fn join(
    records: impl IntoIterator<Item = InvoiceRecord>,
    partners: &HashMap<String, Arc<Partner>>,
    types: &HashMap<String, Arc<DocumentType>>,
) -> LoadedInvoices {
    let mut loaded = LoadedInvoices::default();

    for mut record in records {
        let Some(remote_file_id) = record
            .remote_file_id
            .take()
            .filter(|id| !id.trim().is_empty())
        else {
            warn!(
                seq = record.sequence_number,
                name = record.display_name(),
                "registry item has no Google Drive file, skipping"
            );
            loaded.skipped_without_file += 1;
            continue;
        };

        let partner = record
            .primary_partner_id()
            .and_then(|id| partners.get(id))
            .cloned();
        let document_type = record
            .primary_type_id()
            .and_then(|id| types.get(id))
            .cloned();

        if partner.is_none() {
            debug!(
                seq = record.sequence_number,
                partner_ids = ?record.partner_ids,
                "partner unresolved"
            );
        }

        loaded.invoices.push(ResolvedInvoice {
            record,
            remote_file_id,
            partner,
            document_type,
        });
    }

    loaded
}
