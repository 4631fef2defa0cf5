//! Session configuration
//!
//! Defaults match the camera's fixed protocol parameters. Every knob can be
//! overridden through environment variables:
//!
//! | Variable                    | Field                  |
//! |-----------------------------|------------------------|
//! | `DXO_READ_TIMEOUT_MS`       | `read_timeout`         |
//! | `DXO_MAX_FLUSH_RETRIES`     | `max_flush_retries`    |
//! | `DXO_MAX_LIVE_VIEW_BUFFER`  | `max_live_view_buffer` |
//! | `DXO_FRAME_VALIDATION`      | `validation`           |

use std::time::Duration;

use crate::frame_validation::ValidationLevel;
use crate::protocol::MAX_PACKET_SIZE;

/// Default cap on consecutive forced-flush notifications per decode
pub const DEFAULT_MAX_FLUSH_RETRIES: u32 = 32;

/// Default cap on the live-view accumulation buffer (8 MiB)
pub const DEFAULT_MAX_LIVE_VIEW_BUFFER: usize = 8 * 1024 * 1024;

/// Tunables for a camera session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Bytes requested per transport read
    pub max_packet_size: usize,
    /// Deadline for a single transport read (`None` blocks indefinitely)
    pub read_timeout: Option<Duration>,
    /// Forced-flush notifications tolerated before a decode gives up
    pub max_flush_retries: u32,
    /// Live-view bytes accumulated without a complete frame before the buffer is dropped
    pub max_live_view_buffer: usize,
    /// Validation applied to stitched live-view frames
    pub validation: ValidationLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            read_timeout: None,
            max_flush_retries: DEFAULT_MAX_FLUSH_RETRIES,
            max_live_view_buffer: DEFAULT_MAX_LIVE_VIEW_BUFFER,
            validation: ValidationLevel::Moderate,
        }
    }
}

impl SessionConfig {
    /// Build a configuration from `DXO_*` environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "DXO_READ_TIMEOUT_MS") {
            // 0 disables the deadline
            config.read_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(retries) = parse_var(&lookup, "DXO_MAX_FLUSH_RETRIES") {
            config.max_flush_retries = retries;
        }
        if let Some(bytes) = parse_var(&lookup, "DXO_MAX_LIVE_VIEW_BUFFER") {
            config.max_live_view_buffer = bytes;
        }
        if let Some(level) = lookup("DXO_FRAME_VALIDATION") {
            config.validation = ValidationLevel::from_env_str(&level);
        }

        config
    }
}

fn parse_var<V, F>(lookup: &F, key: &str) -> Option<V>
where
    V: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}='{}': not a valid number", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_packet_size, 512);
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.max_flush_retries, DEFAULT_MAX_FLUSH_RETRIES);
        assert_eq!(config.validation, ValidationLevel::Moderate);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(SessionConfig::from_lookup(|_| None), SessionConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("DXO_READ_TIMEOUT_MS", "1500"),
            ("DXO_MAX_FLUSH_RETRIES", "4"),
            ("DXO_MAX_LIVE_VIEW_BUFFER", "1024"),
            ("DXO_FRAME_VALIDATION", "strict"),
        ]));

        assert_eq!(config.read_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.max_flush_retries, 4);
        assert_eq!(config.max_live_view_buffer, 1024);
        assert_eq!(config.validation, ValidationLevel::Strict);
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config = SessionConfig::from_lookup(lookup_from(&[("DXO_READ_TIMEOUT_MS", "0")]));
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn test_invalid_number_ignored() {
        let config = SessionConfig::from_lookup(lookup_from(&[("DXO_MAX_FLUSH_RETRIES", "many")]));
        assert_eq!(config.max_flush_retries, DEFAULT_MAX_FLUSH_RETRIES);
    }
}
