//! Billing period and output file naming

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Suffix of the organization list file: `YYYY-MM-bills.csv`
pub const BILLS_FILE_SUFFIX: &str = "-bills.csv";

/// Fixed part of every renamed bill
const BILL_TITLE: &str = "ZENICOG 이용 요금 청구서";

/// Year and month a run produces bills for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> crate::Result<Self> {
        if !(1000..=9999).contains(&year) {
            return Err(crate::BillsError::Config(format!(
                "Billing year must have four digits, got {}",
                year
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(crate::BillsError::Config(format!(
                "Billing month must be between 1 and 12, got {}",
                month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> crate::Result<Self> {
        Self::new(date.year(), date.month())
    }

    /// Parse a file name of the exact form `YYYY-MM-bills.csv`
    ///
    /// A name that matches the pattern but carries an impossible month is a
    /// configuration error rather than a non-match.
    pub fn from_bills_filename(name: &str) -> crate::Result<Self> {
        let (year, month) = split_bills_filename(name).ok_or_else(|| {
            crate::BillsError::Config(format!(
                "`{}` does not match YYYY-MM{}",
                name, BILLS_FILE_SUFFIX
            ))
        })?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

/// True when `name` has the shape `YYYY-MM-bills.csv`
pub fn is_bills_filename(name: &str) -> bool {
    split_bills_filename(name).is_some()
}

fn split_bills_filename(name: &str) -> Option<(i32, u32)> {
    let stem = name.strip_suffix(BILLS_FILE_SUFFIX)?;
    let (year, month) = stem.split_once('-')?;

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if year.len() != 4 || month.len() != 2 || !all_digits(year) || !all_digits(month) {
        return None;
    }

    Some((year.parse().ok()?, month.parse().ok()?))
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Name a downloaded bill is renamed to
///
/// `{YY}.{MM} ZENICOG 이용 요금 청구서_{name}.pdf`, where `/` in the display
/// name becomes `_`.
pub fn destination_filename(period: &BillingPeriod, display_name: &str) -> String {
    format!(
        "{:02}.{:02} {}_{}.pdf",
        period.year % 100,
        period.month,
        BILL_TITLE,
        display_name.replace('/', "_")
    )
}
