//! Environment overrides for component configuration.
//!
//! Every config struct starts from its `Default`, then picks up
//! `LODESTAR_*` environment variables, then command-line flags.

use std::str::FromStr;
use std::time::Duration;

use crate::protocol::error::{LodestarError, Result};

/// Reads `key` from the environment and parses it, falling back to
/// `default` when unset or empty.
///
/// # Errors
///
/// Returns `Config` if the variable is set but does not parse.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| LodestarError::Config(format!("{}={:?} is invalid: {}", key, raw, e))),
        _ => Ok(default),
    }
}

/// Like [`env_or`] for durations given in milliseconds.
pub fn env_millis_or(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_millis() as u64).map(Duration::from_millis)
}

/// Rejects a zero period; tokio timers cannot tick at one.
///
/// # Errors
///
/// Returns `Config` naming `what` if `interval` is zero.
pub fn require_nonzero(what: &str, interval: Duration) -> Result<Duration> {
    if interval.is_zero() {
        return Err(LodestarError::Config(format!("{} must be greater than 0ms", what)));
    }
    Ok(interval)
}
