//! # Receipt Numbers
//!
//! Format: `RCP-YYYYMMDD-######`
//!
//! - `YYYYMMDD`: completion date (UTC)
//! - `######`: tenths of a second since UTC midnight, zero padded
//!
//! ```text
//! 00:00:00.0  ──►  000000
//! 23:59:59.9  ──►  863999
//!                  864000..=999999  headroom for bumps late in the day
//! ```
//!
//! The time-derived value only grows during a day, but two sales in the same
//! tenth of a second would collide, so [`ReceiptSequence`] remembers the last
//! value it issued and bumps past it. After a restart the host seeds it with
//! [`ReceiptSequence::observe`] from the last stored receipt of the day.
//!
//! ## Example
//! `RCP-20261019-482113`

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::sync::Mutex;

use crate::error::{CoreError, CoreResult};

pub const RECEIPT_PREFIX: &str = "RCP";

/// Largest sequence value that fits the six digits.
pub const MAX_SEQUENCE: u32 = 999_999;

/// Formats a receipt number from a date and a sequence value.
pub fn format_receipt_number(date: NaiveDate, sequence: u32) -> String {
    format!(
        "{}-{}-{:06}",
        RECEIPT_PREFIX,
        date.format("%Y%m%d"),
        sequence.min(MAX_SEQUENCE)
    )
}

/// Splits a receipt number into its date and sequence.
pub fn parse_receipt_number(value: &str) -> Option<(NaiveDate, u32)> {
    let mut parts = value.split('-');
    let (Some(prefix), Some(date), Some(seq), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    if prefix != RECEIPT_PREFIX
        || date.len() != 8
        || seq.len() != 6
        || !seq.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let seq = seq.parse().ok()?;
    Some((date, seq))
}

/// True if `value` has the `RCP-YYYYMMDD-######` shape and a real date.
pub fn is_receipt_number(value: &str) -> bool {
    parse_receipt_number(value).is_some()
}

/// The `RCP-YYYYMMDD-` prefix shared by every receipt issued on `date`.
pub fn receipt_prefix_for(date: NaiveDate) -> String {
    format!("{}-{}-", RECEIPT_PREFIX, date.format("%Y%m%d"))
}

/// Issues receipt numbers that never repeat within a day on one terminal.
#[derive(Debug, Default)]
pub struct ReceiptSequence {
    last: Mutex<Option<(NaiveDate, u32)>>,
}

impl ReceiptSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next receipt number for `now`.
    ///
    /// Fails only once all six-digit values of the day are used up.
    pub fn next(&self, now: DateTime<Utc>) -> CoreResult<String> {
        let date = now.date_naive();
        // Leap seconds report nanos past 1e9
        let tenths = now.nanosecond().min(999_999_999) / 100_000_000;
        let candidate = now.num_seconds_from_midnight() * 10 + tenths;

        // A poisoned lock still holds a valid (date, seq) pair.
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        let sequence = match *last {
            Some((day, previous)) if day == date && candidate <= previous => {
                if previous >= MAX_SEQUENCE {
                    return Err(CoreError::ReceiptSequenceExhausted { date });
                }
                previous + 1
            }
            _ => candidate,
        };
        *last = Some((date, sequence));

        Ok(format_receipt_number(date, sequence))
    }

    /// Records a receipt issued earlier (for example before a restart) so
    /// [`Self::next`] never hands it out again. Malformed or older values
    /// are ignored.
    pub fn observe(&self, receipt_number: &str) {
        let Some(seen) = parse_receipt_number(receipt_number) else {
            return;
        };

        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.map_or(true, |current| seen > current) {
            *last = Some(seen);
        }
    }
}
