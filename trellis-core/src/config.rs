//! Runtime Configuration
//!
//! Tunables for the reactive runtime. The defaults match what the runtime
//! was designed around; hosts rarely need to change them.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Configuration for one thread's reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on drain passes within a single flush.
    ///
    /// Exceeding it aborts the flush, logs an error and discards the
    /// remaining queue. This only exists to keep a reactive loop from hanging
    /// the host.
    pub max_flush_iterations: usize,

    /// Arrays longer than this are deep-tracked through `length` only.
    pub deep_track_array_limit: usize,
}

impl RuntimeConfig {
    pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 100;
    pub const DEFAULT_DEEP_TRACK_ARRAY_LIMIT: usize = 100;

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(Error::Config)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: Self::DEFAULT_MAX_FLUSH_ITERATIONS,
            deep_track_array_limit: Self::DEFAULT_DEEP_TRACK_ARRAY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_flush_iterations, 100);
        assert_eq!(config.deep_track_array_limit, 100);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "max_flush_iterations": 8 }"#).unwrap();
        assert_eq!(config.max_flush_iterations, 8);
        assert_eq!(config.deep_track_array_limit, 100);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            RuntimeConfig::from_json("{ nope"),
            Err(Error::Config(_))
        ));
    }
}
