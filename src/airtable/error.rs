//! Error types for the Airtable module.
//!
//! Every variant is fatal for the fetch that raised it: no partial record list
//! is ever returned to the caller.

use thiserror::Error;

/// Errors that can occur while fetching records from Airtable.
#[derive(Debug, Error)]
pub enum AirtableError {
    /// Airtable answered with a non-success status.
    #[error("Airtable returned HTTP {status} for table '{table_id}': {body}")]
    RemoteFetch {
        /// Table being fetched.
        table_id: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body, usually Airtable's JSON error object.
        body: String,
    },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("network error fetching table '{table_id}': {source}")]
    Network {
        /// Table being fetched.
        table_id: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// A page body could not be decoded into the expected record shape.
    #[error("failed to decode page of table '{table_id}': {source}")]
    Decode {
        /// Table being fetched.
        table_id: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl AirtableError {
    /// Creates a remote-fetch error from a non-success response.
    pub fn remote_fetch(table_id: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::RemoteFetch {
            table_id: table_id.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates a network error.
    pub fn network(table_id: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            table_id: table_id.into(),
            source,
        }
    }

    /// Creates a decode error.
    pub fn decode(table_id: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            table_id: table_id.into(),
            source,
        }
    }

    /// Table the failed fetch was targeting.
    #[must_use]
    pub fn table_id(&self) -> &str {
        match self {
            Self::RemoteFetch { table_id, .. }
            | Self::Network { table_id, .. }
            | Self::Decode { table_id, .. } => table_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_fetch_display_carries_status_and_body() {
        let error = AirtableError::remote_fetch(
            "tblInvoices",
            422,
            r#"{"error":{"type":"INVALID_FILTER_BY_FORMULA"}}"#,
        );
        let msg = error.to_string();
        assert!(msg.contains("422"), "Expected status in: {msg}");
        assert!(msg.contains("tblInvoices"), "Expected table in: {msg}");
        assert!(
            msg.contains("INVALID_FILTER_BY_FORMULA"),
            "Expected body in: {msg}"
        );
        assert_eq!(error.table_id(), "tblInvoices");
    }

    #[test]
    fn test_decode_display_names_table() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = AirtableError::decode("tblPartners", source);
        assert!(error.to_string().contains("tblPartners"));
        assert_eq!(error.table_id(), "tblPartners");
    }
}
