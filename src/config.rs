//! Configuration system for the GGMP services.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `ggmp.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `GGMP_HOST` - Bind address for all three services
//! - `KEYMASTER_PORT` - Keymaster port (default 3001)
//! - `KEYMASTER_KEYS_FILE` - Path of the persisted key snapshot
//! - `KEYMASTER_USAGE_MAX_RECORDS` - Usage records kept per key (0 = unbounded)
//! - `KEYMASTER_USAGE_MAX_AGE_SECS` - Age after which usage records are dropped (0 = unbounded)
//! - `POLICY_PORT` - Policy port (default 3002)
//! - `NUCLEUS_PORT` - Nucleus port (default 3003)
//! - `NUCLEUS_STALE_CLEANUP_ENABLED` - Evict servers that stop heartbeating
//! - `NUCLEUS_STALE_TIMEOUT_SECS` - Seconds without a heartbeat before eviction
//! - `NUCLEUS_STALE_SWEEP_CRON` - Cron schedule of the eviction sweep
//! - `GGMP_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{ServiceError, ServiceResult};

/// Global configuration singleton.
static CONFIG: OnceLock<GgmpConfig> = OnceLock::new();

/// Upper bound for every seconds-valued window (100 years).
pub const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GgmpConfig {
    /// License key service
    pub keymaster: KeymasterConfig,
    /// Server registry service
    pub nucleus: NucleusConfig,
    /// Policy service
    pub policy: PolicyConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Keymaster configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeymasterConfig {
    pub host: String,
    pub port: u16,
    /// Snapshot file holding every registered key
    pub keys_file: String,
    /// Maximum usage records retained per key, oldest dropped first (0 = unbounded)
    pub usage_max_records: usize,
    /// Usage records older than this many seconds are dropped (0 = unbounded)
    pub usage_max_age_secs: u64,
}

impl Default for KeymasterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            keys_file: "keys.json".to_string(),
            usage_max_records: 0,
            usage_max_age_secs: 0,
        }
    }
}

/// Nucleus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NucleusConfig {
    pub host: String,
    pub port: u16,
    /// Domain appended to a server id to form its `host`
    pub host_suffix: String,
    /// Whether servers that stop heartbeating are evicted
    pub stale_cleanup_enabled: bool,
    /// Seconds since `lastSeen` after which a server counts as stale
    pub stale_timeout_secs: u64,
    /// Cron expression (with seconds) for the eviction sweep
    pub stale_sweep_cron: String,
}

impl Default for NucleusConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3003,
            host_suffix: "ggmp.local".to_string(),
            stale_cleanup_enabled: true,
            stale_timeout_secs: 300,
            stale_sweep_cron: "0 * * * * *".to_string(),
        }
    }
}

/// Policy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub host: String,
    pub port: u16,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3002,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl GgmpConfig {
    /// Load configuration from `ggmp.toml` and the environment.
    ///
    /// Sources are applied in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `ggmp.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> ServiceResult<Self> {
        let host = env::var("GGMP_HOST").ok();

        let settings = Config::builder()
            .set_default("keymaster.host", "0.0.0.0")?
            .set_default("keymaster.port", 3001)?
            .set_default("keymaster.keys_file", "keys.json")?
            .set_default("keymaster.usage_max_records", 0)?
            .set_default("keymaster.usage_max_age_secs", 0)?
            .set_default("nucleus.host", "0.0.0.0")?
            .set_default("nucleus.port", 3003)?
            .set_default("nucleus.host_suffix", "ggmp.local")?
            .set_default("nucleus.stale_cleanup_enabled", true)?
            .set_default("nucleus.stale_timeout_secs", 300)?
            .set_default("nucleus.stale_sweep_cron", "0 * * * * *")?
            .set_default("policy.host", "0.0.0.0")?
            .set_default("policy.port", 3002)?
            .set_default("logging.level", "info")?
            // Load from ggmp.toml (optional)
            .add_source(config::File::with_name("ggmp").required(false))
            // Override with environment variables
            .set_override_option("keymaster.host", host.clone())?
            .set_override_option("nucleus.host", host.clone())?
            .set_override_option("policy.host", host)?
            .set_override_option("keymaster.port", env_parsed::<i64>("KEYMASTER_PORT"))?
            .set_override_option("keymaster.keys_file", env::var("KEYMASTER_KEYS_FILE").ok())?
            .set_override_option(
                "keymaster.usage_max_records",
                env_parsed::<i64>("KEYMASTER_USAGE_MAX_RECORDS"),
            )?
            .set_override_option(
                "keymaster.usage_max_age_secs",
                env_parsed::<i64>("KEYMASTER_USAGE_MAX_AGE_SECS"),
            )?
            .set_override_option("nucleus.port", env_parsed::<i64>("NUCLEUS_PORT"))?
            .set_override_option(
                "nucleus.stale_cleanup_enabled",
                env_parsed::<bool>("NUCLEUS_STALE_CLEANUP_ENABLED"),
            )?
            .set_override_option(
                "nucleus.stale_timeout_secs",
                env_parsed::<i64>("NUCLEUS_STALE_TIMEOUT_SECS"),
            )?
            .set_override_option(
                "nucleus.stale_sweep_cron",
                env::var("NUCLEUS_STALE_SWEEP_CRON").ok(),
            )?
            .set_override_option("policy.port", env_parsed::<i64>("POLICY_PORT"))?
            .set_override_option("logging.level", env::var("GGMP_LOG_LEVEL").ok())?
            .build()
            .map_err(|e| ServiceError::Config(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| ServiceError::Config(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ServiceResult<()> {
        for (name, port) in [
            ("keymaster.port", self.keymaster.port),
            ("nucleus.port", self.nucleus.port),
            ("policy.port", self.policy.port),
        ] {
            if port == 0 {
                return Err(ServiceError::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.keymaster.keys_file.trim().is_empty() {
            return Err(ServiceError::Config(
                "keymaster.keys_file cannot be empty".to_string(),
            ));
        }

        if self.nucleus.stale_cleanup_enabled && self.nucleus.stale_timeout_secs == 0 {
            return Err(ServiceError::Config(
                "nucleus.stale_timeout_secs must be greater than 0 when stale cleanup is enabled"
                    .to_string(),
            ));
        }

        for (name, secs) in [
            ("keymaster.usage_max_age_secs", self.keymaster.usage_max_age_secs),
            ("nucleus.stale_timeout_secs", self.nucleus.stale_timeout_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return Err(ServiceError::Config(format!(
                    "{name} must be at most {MAX_WINDOW_SECS} seconds, got {secs}"
                )));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ServiceError::Config(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// Loads and validates on first access, then caches.
pub fn get_config() -> ServiceResult<&'static GgmpConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = GgmpConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| ServiceError::Config("configuration was not initialised".to_string()))
}
