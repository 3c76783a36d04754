//! Bridge configuration

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the registry file
pub const ENV_REGISTRY: &str = "MIRRORBUF_REGISTRY";

/// Environment variable naming a single buffer file, published as "state"
pub const ENV_PATH: &str = "MIRRORBUF_PATH";

/// Environment variable overriding the refresh interval, in milliseconds
pub const ENV_REFRESH_MS: &str = "MIRRORBUF_REFRESH_MS";

/// Default refresh interval (100ms)
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Registry file; wins over every other source
    pub registry_path: Option<PathBuf>,
    /// Fallback single buffer file
    pub direct_path: Option<PathBuf>,
    /// Sleep between passes in [`Bridge::run`](crate::Bridge::run)
    pub refresh_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            registry_path: None,
            direct_path: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl BridgeConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let refresh_interval = get(ENV_REFRESH_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL);

        Self {
            registry_path: get(ENV_REGISTRY).map(PathBuf::from),
            direct_path: get(ENV_PATH).map(PathBuf::from),
            refresh_interval,
        }
    }

    pub fn with_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    pub fn with_direct_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.direct_path = Some(path.into());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[]));
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.refresh_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_reads_keys() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_REGISTRY, "/dev/shm/registry.txt"),
            (ENV_PATH, "/dev/shm/state.bin"),
            (ENV_REFRESH_MS, "250"),
        ]));
        assert_eq!(config.registry_path, Some(PathBuf::from("/dev/shm/registry.txt")));
        assert_eq!(config.direct_path, Some(PathBuf::from("/dev/shm/state.bin")));
        assert_eq!(config.refresh_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_empty_and_bad_values() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_REGISTRY, "  "),
            (ENV_REFRESH_MS, "soon"),
        ]));
        assert_eq!(config.registry_path, None);
        assert_eq!(config.refresh_interval, DEFAULT_REFRESH_INTERVAL);
    }
}
