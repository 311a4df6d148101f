//! Environment variable parsing shared by daemon config and telemetry.

use std::str::FromStr;

use tracing::warn;

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|value| parse_bool(&value))
}

pub fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(non_empty)
}

/// Parse a numeric env var, warning and falling back to `default` when the
/// value is present but malformed.
pub fn parse_env_number<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    let Some(value) = env_string(key) else {
        return default;
    };
    match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, "Invalid numeric config; using default");
            default
        }
    }
}
