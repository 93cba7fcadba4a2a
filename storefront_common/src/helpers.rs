use std::{env, str::FromStr, time::Duration};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads a boolean flag from the environment.
pub fn env_flag(name: &str, default: bool) -> bool {
    parse_boolean_flag(env::var(name).ok(), default)
}

/// Reads and parses an environment variable. Returns `Ok(None)` if it is not set, and the raw value if it could not be
/// parsed, so that the caller can log something useful.
pub fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, String> {
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().map(Some).map_err(|_| s),
        Err(_) => Ok(None),
    }
}

/// Reads a duration, expressed in whole seconds, from the environment.
pub fn env_duration_secs(name: &str) -> Result<Option<Duration>, String> {
    env_parse::<u64>(name).map(|v| v.map(Duration::from_secs))
}
