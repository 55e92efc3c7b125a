//! Engine configuration, parsed from the properties mapping passed to `Init`.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

use crate::storage::{Feature, StateError, StateResult};

pub const DATA_DIR: &str = "dataDir";
pub const IN_MEMORY: &str = "inMemory";
pub const CACHE_CAPACITY_BYTES: &str = "cacheCapacityBytes";
pub const FLUSH_EVERY_MS: &str = "flushEveryMs";
pub const BULK_GET: &str = "bulkGet";
pub const TRANSACTIONAL: &str = "transactional";

/// Typed engine configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Database directory; `None` opens a temporary database removed on drop
    pub data_dir: Option<PathBuf>,

    /// sled page cache size in bytes
    pub cache_capacity_bytes: u64,

    /// Background flush interval; `None` disables background flushing
    pub flush_every_ms: Option<u64>,

    /// Serve BulkGet natively and advertise `BULK_GET`
    pub bulk_get: bool,

    /// Run BulkSet / BulkDelete in one transaction and advertise `TRANSACTIONAL`
    pub transactional: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_capacity_bytes: 64 * 1024 * 1024, // 64MB
            flush_every_ms: Some(500),
            bulk_get: true,
            transactional: false,
        }
    }
}

impl EngineConfig {
    /// Temporary database with default settings.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parses the `Init` properties.
    ///
    /// Exactly one of `dataDir` or `inMemory=true` is required. Unknown properties are
    /// ignored with a warning, since the runtime forwards its whole component metadata.
    pub fn from_properties(properties: &HashMap<String, String>) -> StateResult<Self> {
        let mut config = Self::default();
        let mut in_memory = false;

        for (name, value) in properties {
            match name.as_str() {
                DATA_DIR => {
                    if value.trim().is_empty() {
                        return Err(invalid(name, value, "a non-empty path"));
                    }
                    config.data_dir = Some(PathBuf::from(value.trim()));
                }
                IN_MEMORY => in_memory = parse_bool(name, value)?,
                CACHE_CAPACITY_BYTES => config.cache_capacity_bytes = parse_u64(name, value)?,
                FLUSH_EVERY_MS => {
                    config.flush_every_ms = match parse_u64(name, value)? {
                        0 => None,
                        ms => Some(ms),
                    }
                }
                BULK_GET => config.bulk_get = parse_bool(name, value)?,
                TRANSACTIONAL => config.transactional = parse_bool(name, value)?,
                _ => warn!(property = %name, "Ignoring unknown state store property"),
            }
        }

        match (&config.data_dir, in_memory) {
            (Some(_), true) => Err(StateError::Configuration(format!(
                "{DATA_DIR} and {IN_MEMORY} are mutually exclusive"
            ))),
            (None, false) => Err(StateError::Configuration(format!(
                "either {DATA_DIR} or {IN_MEMORY}=true is required"
            ))),
            _ => Ok(config),
        }
    }

    /// Capabilities this configuration provides, in a stable order.
    pub fn features(&self) -> Vec<Feature> {
        let mut features = vec![Feature::ETag, Feature::Ttl, Feature::StrongConsistency];
        if self.bulk_get {
            features.push(Feature::BulkGet);
        }
        if self.transactional {
            features.push(Feature::Transactional);
        }
        features.sort();
        features
    }
}

fn invalid(name: &str, value: &str, expected: &str) -> StateError {
    StateError::Configuration(format!("{name} must be {expected}, got {value:?}"))
}

fn parse_bool(name: &str, value: &str) -> StateResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(name, value, "a boolean")),
    }
}

fn parse_u64(name: &str, value: &str) -> StateResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(name, value, "an unsigned integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_in_memory_defaults() {
        let config = EngineConfig::from_properties(&props(&[(IN_MEMORY, "true")])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_all_properties() {
        let config = EngineConfig::from_properties(&props(&[
            (DATA_DIR, "/var/lib/extstate"),
            (CACHE_CAPACITY_BYTES, "1048576"),
            (FLUSH_EVERY_MS, "0"),
            (BULK_GET, "false"),
            (TRANSACTIONAL, "TRUE"),
            ("redisHost", "ignored:6379"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/extstate")));
        assert_eq!(config.cache_capacity_bytes, 1_048_576);
        assert_eq!(config.flush_every_ms, None);
        assert!(!config.bulk_get);
        assert!(config.transactional);
    }

    #[test]
    fn test_incomplete_configuration() {
        assert!(matches!(
            EngineConfig::from_properties(&HashMap::new()),
            Err(StateError::Configuration(_))
        ));
        assert!(matches!(
            EngineConfig::from_properties(&props(&[(IN_MEMORY, "false")])),
            Err(StateError::Configuration(_))
        ));
        assert!(matches!(
            EngineConfig::from_properties(&props(&[(DATA_DIR, "/tmp/x"), (IN_MEMORY, "true")])),
            Err(StateError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        for (name, value) in [
            (IN_MEMORY, "maybe"),
            (CACHE_CAPACITY_BYTES, "-1"),
            (FLUSH_EVERY_MS, "fast"),
            (DATA_DIR, "  "),
        ] {
            let result = EngineConfig::from_properties(&props(&[(IN_MEMORY, "true"), (name, value)]));
            assert!(
                matches!(result, Err(StateError::Configuration(_))),
                "{name}={value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_features_follow_configuration() {
        let config = EngineConfig::default();
        assert_eq!(
            config.features(),
            vec![
                Feature::ETag,
                Feature::Ttl,
                Feature::BulkGet,
                Feature::StrongConsistency
            ]
        );

        let config = EngineConfig {
            bulk_get: false,
            transactional: true,
            ..Default::default()
        };
        assert!(config.features().contains(&Feature::Transactional));
        assert!(!config.features().contains(&Feature::BulkGet));
    }
}
