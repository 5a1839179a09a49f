//! Wall-clock helpers: `HH:MM` time-of-day parsing and serde adapters.

use chrono::NaiveTime;

use crate::error::{DigestError, Result};

pub const HHMM_FORMAT: &str = "%H:%M";

/// Parse a daily time-of-day such as `"09:00"` or `"9:00"`.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), HHMM_FORMAT).map_err(|e| {
        DigestError::TaskConfiguration(format!("invalid time '{value}', expected HH:MM: {e}"))
    })
}

pub fn format_hhmm(time: &NaiveTime) -> String {
    time.format(HHMM_FORMAT).to_string()
}

/// `#[serde(with = "newsdigest_core::time::hhmm")]` for `NaiveTime` fields.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_hhmm(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}
