//! Calculation history integrity
//!
//! Every history row is sealed with a SHA-256 checksum over its content when
//! it is stored. A row whose content no longer matches its checksum has been
//! edited after the fact.

use crate::models::CalculationHistory;
use chrono::{DateTime, DurationRound, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;

/// Hashed view of a history row. The row id and the checksum itself are
/// excluded; the owning order id is included.
#[derive(Serialize)]
struct SealedContent<'a> {
    order_id: i64,
    calculation_type: &'a str,
    input_value: f64,
    percentage_used: f64,
    calculated_amount: f64,
    calculation_timestamp: DateTime<Utc>,
}

impl<'a> From<&'a CalculationHistory> for SealedContent<'a> {
    fn from(row: &'a CalculationHistory) -> Self {
        Self {
            order_id: row.order_id,
            calculation_type: &row.calculation_type,
            input_value: row.input_value,
            percentage_used: row.percentage_used,
            calculated_amount: row.calculated_amount,
            calculation_timestamp: row.calculation_timestamp,
        }
    }
}

/// Compute the hex SHA-256 checksum of a history row
pub fn compute_checksum(row: &CalculationHistory) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into the hasher
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &SealedContent::from(row)).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Timestamps are kept at microsecond precision, the finest a Postgres
/// `TIMESTAMPTZ` holds, so a reloaded row hashes the same as when sealed.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(chrono::Duration::microseconds(1)).unwrap_or(at)
}

/// Stamp the checksum once `order_id` is final
pub fn seal(row: &mut CalculationHistory) {
    row.calculation_timestamp = stored_precision(row.calculation_timestamp);
    row.checksum = compute_checksum(row);
}

pub fn verify(row: &CalculationHistory) -> bool {
    !row.checksum.is_empty() && compute_checksum(row) == row.checksum
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
