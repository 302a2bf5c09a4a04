use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// clap value parser for humantime durations (`300ms`, `5m`, `1m30s`).
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value.trim()).map_err(|e| format!("invalid duration '{value}': {e}"))
}

/// Deserializes a string, treating a missing or blank value as empty.
pub fn trimmed_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|v| v.trim().to_string()).unwrap_or_default())
}

/// `Some(value)` unless the value is blank.
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
