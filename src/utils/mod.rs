// src/utils/mod.rs
pub mod crypto;
pub mod serialization;

use chrono::{SecondsFormat, Utc};

/// Current UTC time as RFC 3339 with milliseconds and a `Z` suffix
/// (`2024-03-01T10:00:00.000Z`), the timestamp format of every stored record.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
