//! Accounting period (calendar month) selection.
//!
//! A [`Period`] is the unit a run works on: one calendar month of one year.
//! It owns the calendar math the rest of the crate needs, namely the first
//! and last day of the month (leap-year aware) and the `YYYYMM` stamp used in
//! file names.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Lowest accepted year.
pub const MIN_YEAR: i32 = 1;

/// Highest accepted year (four digits).
pub const MAX_YEAR: i32 = 9999;

/// Errors raised when constructing a [`Period`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    /// Month outside 1..=12.
    #[error("invalid month {month}: must be between 1 and 12")]
    InvalidMonth {
        /// The rejected month value.
        month: u32,
    },

    /// Year outside the four-digit range.
    #[error("invalid year {year}: must be between {MIN_YEAR} and {MAX_YEAR}")]
    InvalidYear {
        /// The rejected year value.
        year: i32,
    },
}

/// One calendar month of one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    first_day: NaiveDate,
}

impl Period {
    /// Creates a period for `year`/`month`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError`] when the month is not 1..=12 or the year is not
    /// a four-digit year.
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::InvalidMonth { month });
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(PeriodError::InvalidYear { year });
        }
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(PeriodError::InvalidMonth { month })?;
        Ok(Self { first_day })
    }

    /// Calendar year.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    /// Calendar month (1..=12).
    #[must_use]
    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    /// First day of the month.
    #[must_use]
    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// Last day of the month, accounting for month length and leap years.
    #[must_use]
    pub fn last_day(&self) -> NaiveDate {
        // The first of the next month minus one day; December rolls into
        // January of the following year.
        let (next_year, next_month) = if self.month() == 12 {
            (self.year() + 1, 1)
        } else {
            (self.year(), self.month() + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|next| next.pred_opt())
            .unwrap_or(self.first_day)
    }

    /// Zero-padded `YYYYMM` stamp.
    #[must_use]
    pub fn yyyymm(&self) -> String {
        format!("{:04}{:02}", self.year(), self.month())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}.{:02}", self.year(), self.month())
    }
}
