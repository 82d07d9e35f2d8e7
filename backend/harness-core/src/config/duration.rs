//! `humantime` strings as serde durations.

use std::time::Duration;

use serde::{Deserialize, Deserializer, de::Error as DeError};

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw)
        .map_err(|e| D::Error::custom(format!("invalid duration '{raw}': {e}")))
}
