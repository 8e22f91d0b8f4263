//! Paginated Airtable list client.
//!
//! [`AirtableClient`] drains every page of a table listing before returning,
//! following the `offset` cursor Airtable hands back with each page. Any
//! failure aborts the whole listing; callers never see a partial result.

use std::collections::HashMap;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::error::AirtableError;
use super::model::{AirtablePage, AirtableRecord};

/// Default Airtable REST API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";

/// Read-only client for one Airtable base.
#[derive(Clone)]
pub struct AirtableClient {
    client: Client,
    base_url: String,
    base_id: String,
    token: String,
}

impl AirtableClient {
    /// Creates a client for `base_id` against the public Airtable API.
    pub fn new(client: Client, base_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL, base_id, token)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        client: Client,
        base_url: impl Into<String>,
        base_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            base_id: base_id.into(),
            token: token.into(),
        }
    }

    /// Fetches every record of `table_id`, optionally restricted by a
    /// `filterByFormula` expression, in the order Airtable returns them.
    ///
    /// # Errors
    ///
    /// Returns [`AirtableError::RemoteFetch`] on any non-success page,
    /// [`AirtableError::Network`] when a request fails outright, and
    /// [`AirtableError::Decode`] when a page does not match `T`.
    #[instrument(skip(self, filter_formula), fields(table_id = %table_id))]
    pub async fn fetch_all<T>(
        &self,
        table_id: &str,
        filter_formula: Option<&str>,
    ) -> Result<Vec<AirtableRecord<T>>, AirtableError>
    where
        T: DeserializeOwned,
    {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            info!(table_id, offset = offset.as_deref().unwrap_or(""), "fetching Airtable page");
            let page: AirtablePage<T> = self
                .fetch_page(table_id, filter_formula, offset.as_deref())
                .await?;
            let next = page.next_offset().map(str::to_string);
            debug!(table_id, records = page.records.len(), "page received");
            records.extend(page.records);

            match next {
                Some(cursor) => offset = Some(cursor),
                None => break,
            }
        }

        info!(table_id, records = records.len(), "table drained");
        Ok(records)
    }

    /// Fetches the whole of `table_id` and indexes the fields by record id.
    ///
    /// Duplicate ids keep the last occurrence.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_all`](Self::fetch_all).
    pub async fn fetch_as_map<T>(&self, table_id: &str) -> Result<HashMap<String, T>, AirtableError>
    where
        T: DeserializeOwned,
    {
        let records = self.fetch_all::<T>(table_id, None).await?;
        Ok(records
            .into_iter()
            .map(|record| (record.id, record.fields))
            .collect())
    }

    async fn fetch_page<T>(
        &self,
        table_id: &str,
        filter_formula: Option<&str>,
        offset: Option<&str>,
    ) -> Result<AirtablePage<T>, AirtableError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{}/{}", self.base_url, self.base_id, table_id);

        let mut query: Vec<(&str, &str)> = Vec::with_capacity(2);
        if let Some(offset) = offset.filter(|o| !o.trim().is_empty()) {
            query.push(("offset", offset));
        }
        if let Some(formula) = filter_formula.filter(|f| !f.trim().is_empty()) {
            query.push(("filterByFormula", formula));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await
            .map_err(|e| AirtableError::network(table_id, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AirtableError::network(table_id, e))?;

        if !status.is_success() {
            return Err(AirtableError::remote_fetch(table_id, status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| AirtableError::decode(table_id, e))
    }
}

impl std::fmt::Debug for AirtableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableClient")
            .field("base_url", &self.base_url)
            .field("base_id", &self.base_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_hides_token() {
        let client = AirtableClient::new(Client::new(), "appBase", "patSECRET");
        let debug = format!("{client:?}");
        assert!(debug.contains("appBase"));
        assert!(!debug.contains("patSECRET"), "token leaked: {debug}");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client =
            AirtableClient::with_base_url(Client::new(), "http://localhost:1234/v0/", "app", "t");
        assert_eq!(client.base_url, "http://localhost:1234/v0");
    }
}
