//! `filterByFormula` expressions for the registry table.

use crate::period::Period;

/// Registry `type` labels that count as accounting documents.
pub const INVOICE_DOCUMENT_TYPES: [&str; 10] = [
    "Átutalásos számla",
    "Díjbekérő",
    "Kártyás számla",
    "Készpénzes számla",
    "Proforma számla",
    "Útelszámolás",
    "Sztornó számla",
    "Érvénytelenítő számla",
    "Számlával egy tekintet alá eső okirat",
    "Teljesítési igazolás",
];

/// Builds the formula selecting accounting documents whose `refDate` falls
/// inside `period` (both ends inclusive) and whose `type` is one of
/// [`INVOICE_DOCUMENT_TYPES`].
///
/// The output depends only on `period`.
#[must_use]
pub fn invoices_of_month(period: Period) -> String {
    let from = period.first_day().format("%Y-%m-%d");
    let until = period.last_day().format("%Y-%m-%d");
    let types = INVOICE_DOCUMENT_TYPES
        .iter()
        .map(|label| format!("type=\"{label}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "AND(\
         OR(IS_SAME(refDate, \"{from}\"), IS_AFTER(refDate, \"{from}\")),\
         OR(IS_SAME(refDate, \"{until}\"), IS_BEFORE(refDate, \"{until}\")),\
         OR({types}))"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn formula(year: i32, month: u32) -> String {
        invoices_of_month(Period::new(year, month).unwrap())
    }

    #[test]
    fn test_filter_lower_bound_is_first_of_month() {
        let f = formula(2024, 3);
        assert!(f.contains(r#"IS_SAME(refDate, "2024-03-01")"#), "{f}");
        assert!(f.contains(r#"IS_AFTER(refDate, "2024-03-01")"#), "{f}");
    }

    #[test]
    fn test_filter_upper_bound_tracks_month_length() {
        for (year, month, last) in [
            (2024, 2, "2024-02-29"),
            (2023, 2, "2023-02-28"),
            (2024, 4, "2024-04-30"),
            (2024, 7, "2024-07-31"),
            (2024, 12, "2024-12-31"),
        ] {
            let f = formula(year, month);
            assert!(
                f.contains(&format!(r#"IS_SAME(refDate, "{last}")"#)),
                "missing upper bound {last} in {f}"
            );
            assert!(
                f.contains(&format!(r#"IS_BEFORE(refDate, "{last}")"#)),
                "missing upper bound {last} in {f}"
            );
        }
    }

    #[test]
    fn test_filter_lists_every_document_type() {
        let f = formula(2024, 3);
        for label in INVOICE_DOCUMENT_TYPES {
            assert!(f.contains(&format!("type=\"{label}\"")), "missing {label}");
        }
        assert_eq!(f.matches("type=\"").count(), INVOICE_DOCUMENT_TYPES.len());
    }

    #[test]
    fn test_filter_is_deterministic_and_balanced() {
        let a = formula(2025, 11);
        let b = formula(2025, 11);
        assert_eq!(a, b);
        assert!(a.starts_with("AND(OR(IS_SAME("), "{a}");
        assert_eq!(a.matches('(').count(), a.matches(')').count());
    }
}
