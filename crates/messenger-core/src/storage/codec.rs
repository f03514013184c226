//! Column encodings
//!
//! Ids are stored as hyphenated TEXT, timestamps as INTEGER microseconds.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Encode a timestamp for storage
pub fn encode_ts(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Encode an exclusive upper bound, rounding sub-microsecond instants up
///
/// Stored values only carry microseconds, so a stored instant is strictly
/// before `ts` exactly when it is strictly before the rounded-up bound.
pub fn encode_upper_bound(ts: DateTime<Utc>) -> i64 {
    let micros = ts.timestamp_micros();
    if ts.timestamp_subsec_nanos() % 1_000 != 0 {
        micros.saturating_add(1)
    } else {
        micros
    }
}

/// Decode a stored timestamp
pub fn decode_ts(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Parse(format!("Timestamp out of range: {}", micros)))
}

/// Decode an optional stored timestamp
pub fn decode_opt_ts(micros: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    micros.map(decode_ts).transpose()
}

/// Decode a stored id
pub fn decode_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Parse(format!("Invalid {} ID '{}': {}", what, raw, e)))
}
