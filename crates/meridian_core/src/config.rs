//! Scheduler configuration, loaded once at startup.
//!
//! ```toml
//! tick_ms = 50
//! threads = 4
//! resolver_period_ms = 3
//!
//! [strategy]
//! kind = "sharded"
//! shard_size = 64
//!
//! [costs]
//! agent = 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::registry::ObjectKind;

/// Default tick period: 20 ticks per second.
pub const DEFAULT_TICK_MS: u64 = 50;
/// Default worker count.
pub const DEFAULT_THREADS: usize = 2;
/// Default contention resolver period.
pub const DEFAULT_RESOLVER_PERIOD_MS: u64 = 3;
/// Default estimated cost of any object.
pub const DEFAULT_COST: u64 = 5;

/// Which thread provider the driver starts with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Group by container.
    #[default]
    PerContainer,
    /// Group by loaded region.
    PerRegion,
    /// Assign objects one by one.
    RoundRobin,
    /// Fixed-size shards.
    Sharded {
        /// Objects per shard.
        shard_size: usize,
    },
}

/// Estimated tick cost per object kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CostTable {
    /// Container objects.
    pub container: u64,
    /// Region objects.
    pub region: u64,
    /// Agents.
    pub agent: u64,
}

impl CostTable {
    /// Cost for `kind`.
    #[must_use]
    pub const fn cost_of(&self, kind: ObjectKind) -> u64 {
        match kind {
            ObjectKind::Container => self.container,
            ObjectKind::Region => self.region,
            ObjectKind::Agent => self.agent,
        }
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            container: DEFAULT_COST,
            region: DEFAULT_COST,
            agent: DEFAULT_COST,
        }
    }
}

/// Scheduler configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Tick period in milliseconds.
    pub tick_ms: u64,
    /// Worker threads.
    pub threads: usize,
    /// Contention resolver period in milliseconds.
    pub resolver_period_ms: u64,
    /// Objects ticked between in-batch drains. `0` disables them.
    pub drain_interval: usize,
    /// Accumulate cross-thread wait time.
    pub wait_monitoring: bool,
    /// Worker thread name prefix.
    pub thread_name_prefix: String,
    /// Assignment strategy.
    pub strategy: StrategyConfig,
    /// Default object costs.
    pub costs: CostTable,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            threads: DEFAULT_THREADS,
            resolver_period_ms: DEFAULT_RESOLVER_PERIOD_MS,
            drain_interval: 0,
            wait_monitoring: true,
            thread_name_prefix: "meridian-tick".to_string(),
            strategy: StrategyConfig::default(),
            costs: CostTable::default(),
        }
    }
}

impl SchedulerConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] on out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`SchedulerConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be greater than 0".into()));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be greater than 0".into()));
        }
        if self.resolver_period_ms == 0 {
            return Err(ConfigError::Invalid("resolver_period_ms must be greater than 0".into()));
        }
        if let StrategyConfig::Sharded { shard_size: 0 } = self.strategy {
            return Err(ConfigError::Invalid("strategy.shard_size must be greater than 0".into()));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::Invalid("thread_name_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Tick period.
    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Contention resolver period.
    #[must_use]
    pub const fn resolver_period(&self) -> Duration {
        Duration::from_millis(self.resolver_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.threads, 2);
        assert_eq!(config.resolver_period(), Duration::from_millis(3));
        assert_eq!(config.strategy, StrategyConfig::PerContainer);
        assert_eq!(config.costs.cost_of(ObjectKind::Region), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(SchedulerConfig::from_toml_str("").unwrap(), SchedulerConfig::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            tick_ms = 25
            threads = 8
            drain_interval = 16
            wait_monitoring = false

            [strategy]
            kind = "sharded"
            shard_size = 32

            [costs]
            agent = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_period(), Duration::from_millis(25));
        assert_eq!(config.threads, 8);
        assert_eq!(config.drain_interval, 16);
        assert!(!config.wait_monitoring);
        assert_eq!(config.strategy, StrategyConfig::Sharded { shard_size: 32 });
        assert_eq!(config.costs.agent, 2);
        assert_eq!(config.costs.container, 5);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let error = SchedulerConfig::from_toml_str("threads = 0").unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));

        let error = SchedulerConfig::from_toml_str("[strategy]\nkind = \"sharded\"\nshard_size = 0").unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_keys_are_parse_errors() {
        let error = SchedulerConfig::from_toml_str("tick_rate = 20").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let error = SchedulerConfig::load("/nonexistent/meridian.toml").unwrap_err();
        assert!(matches!(error, ConfigError::Io { .. }));
    }
}
