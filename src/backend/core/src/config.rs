//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{RbacError, Result};
use crate::telemetry::LoggingConfig;

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// RBAC configuration
    #[serde(default)]
    pub rbac: RbacConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RbacConfig {
    /// When false, every permission check is allowed
    #[serde(default = "default_rbac_enable")]
    pub enable: bool,

    /// Read-through cache in front of the store
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            enable: default_rbac_enable(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Enable the role/grant/assignment cache
    #[serde(default)]
    pub enabled: bool,

    /// Upper bound on how long an entry is served without invalidation
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Maximum entries per cached table
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

// Default value functions
fn default_rbac_enable() -> bool { true }
fn default_cache_ttl() -> Duration { Duration::from_secs(60) }
fn default_cache_max_entries() -> usize { 10_000 }

impl Config {
    /// Load configuration from environment variables (`PACKGUARD__RBAC__ENABLE=false`).
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PACKGUARD").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("PACKGUARD").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        let cache = &self.rbac.cache;
        if cache.enabled && cache.ttl.is_zero() {
            return Err(RbacError::configuration("rbac.cache.ttl must be greater than zero"));
        }
        if cache.enabled && cache.max_entries == 0 {
            return Err(RbacError::configuration(
                "rbac.cache.max_entries must be greater than zero",
            ));
        }
        Ok(())
    }
}
