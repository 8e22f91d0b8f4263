//! Airtable wire types and the accounting record shapes stored in the base.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, de};

// ==================== Airtable Envelope Types ====================

/// One record as returned by the Airtable list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirtableRecord<T> {
    /// Opaque record id (`rec...`).
    pub id: String,
    /// Creation timestamp assigned by Airtable.
    pub created_time: DateTime<Utc>,
    /// The table-specific fields.
    pub fields: T,
}

/// One page of a list response.
#[derive(Debug, Deserialize)]
pub struct AirtablePage<T> {
    /// Records on this page, in server order.
    pub records: Vec<AirtableRecord<T>>,
    /// Cursor for the next page; absent on the last page.
    #[serde(default)]
    pub offset: Option<String>,
}

impl<T> AirtablePage<T> {
    /// Returns the cursor for the following page, treating a blank cursor as
    /// the end of the listing.
    #[must_use]
    pub fn next_offset(&self) -> Option<&str> {
        self.offset
            .as_deref()
            .filter(|offset| !offset.trim().is_empty())
    }
}

// ==================== Accounting Tables ====================

/// A business partner (supplier or customer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Partner {
    /// Display name, used for directory and file names.
    #[serde(default)]
    pub name: String,
    /// Free-text notes.
    #[serde(default)]
    pub notes: String,
}

/// A document type label (invoice, proforma, credit note, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocumentType {
    /// Display name, used in file names.
    #[serde(default)]
    pub name: String,
}

/// One entry of the document registry table.
///
/// `partner_ids` and `type_ids` are linked-record fields, which Airtable
/// always returns as lists. Only the first id of each list is used for
/// resolution; additional ids are kept but ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    /// Per-month sequence number.
    #[serde(rename = "seq")]
    pub sequence_number: u32,
    /// Display name of the registry entry.
    pub name: Option<String>,
    /// Accounting reference date (the filter field).
    #[serde(default, deserialize_with = "lenient_date")]
    pub ref_date: Option<NaiveDate>,
    /// Payment due date.
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    /// When the entry was created in the base.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_on: Option<DateTime<Utc>>,
    /// When the entry was last modified.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub modified_on: Option<DateTime<Utc>>,
    /// Linked partner record ids.
    #[serde(rename = "partner", default)]
    pub partner_ids: Vec<String>,
    /// Linked document type record ids.
    #[serde(rename = "type", default)]
    pub type_ids: Vec<String>,
    /// Google Drive file id of the scanned document.
    #[serde(rename = "googleDriveId")]
    pub remote_file_id: Option<String>,
    /// Google Drive sharing URL, informational only.
    #[serde(rename = "googleDriveURL")]
    pub remote_file_url: Option<String>,
    /// Gross amount.
    pub amount: Option<Decimal>,
    /// ISO currency code.
    pub currency: Option<String>,
    /// Incoming or outgoing.
    pub direction: Option<String>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Search keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl InvoiceRecord {
    /// Returns the first linked partner id, if any.
    #[must_use]
    pub fn primary_partner_id(&self) -> Option<&str> {
        self.partner_ids.first().map(String::as_str)
    }

    /// Returns the first linked document type id, if any.
    #[must_use]
    pub fn primary_type_id(&self) -> Option<&str> {
        self.type_ids.first().map(String::as_str)
    }

    /// Name for log lines; empty when the entry has none.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

// ==================== Date Fields ====================

// Airtable date fields come back as `YYYY-MM-DD` or, when the field is
// configured to include a time, as an RFC 3339 timestamp. Blank means unset.

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = non_blank(deserializer)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(&raw).map(|dt| dt.date_naive()))
        .map(Some)
        .map_err(|_| de::Error::custom(format!("invalid date {raw:?}")))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = non_blank(deserializer)? else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        })
        .map(Some)
        .map_err(|_| de::Error::custom(format!("invalid timestamp {raw:?}")))
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}
