//! Configuration management for the bridge
//!
//! Loads from TOML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::{NodeSpawner, PoolConfig};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub pool: PoolSettings,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Number of worker processes
    pub size: usize,
    /// Per-call timeout in milliseconds (acquire + execute)
    pub call_timeout_ms: u64,
    /// Worker start + handshake timeout in milliseconds
    pub startup_timeout_ms: u64,
    /// Consecutive failed starts before the pool gives up
    pub max_restart_attempts: u32,
    /// First restart delay in milliseconds, doubled per attempt
    pub restart_base_delay_ms: u64,
    /// Restart delay ceiling in milliseconds
    pub restart_max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Node.js executable
    pub node_path: String,
    /// Worker entry point that loads the exchange library
    pub worker_script: String,
    /// Directory containing the library's node_modules (exported as NODE_PATH)
    #[serde(default)]
    pub library_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl BridgeConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();
        Self::load_from(
            Config::builder()
                .add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name("config/local").required(false))
                // Override with environment variables (CCXT_BRIDGE__POOL__SIZE=4)
                .add_source(Environment::with_prefix("CCXT_BRIDGE").separator("__")),
        )
    }

    /// Applies defaults underneath the given sources.
    fn load_from(
        sources: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = sources
            // Pool defaults
            .set_default("pool.size", 16)?
            .set_default("pool.call_timeout_ms", 30_000)?
            .set_default("pool.startup_timeout_ms", 30_000)?
            .set_default("pool.max_restart_attempts", 5)?
            .set_default("pool.restart_base_delay_ms", 250)?
            .set_default("pool.restart_max_delay_ms", 10_000)?
            // Runtime defaults
            .set_default("runtime.node_path", "node")?
            .set_default("runtime.worker_script", "bridge/worker.js")?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .build()
            .context("Failed to build configuration")?;

        let bridge_config: BridgeConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        bridge_config.validate()?;
        Ok(bridge_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.call_timeout_ms == 0 {
            bail!("pool.call_timeout_ms must be greater than zero");
        }
        if self.pool.startup_timeout_ms == 0 {
            bail!("pool.startup_timeout_ms must be greater than zero");
        }
        if self.pool.restart_base_delay_ms > self.pool.restart_max_delay_ms {
            bail!("pool.restart_base_delay_ms cannot exceed pool.restart_max_delay_ms");
        }
        if self.runtime.worker_script.trim().is_empty() {
            bail!("runtime.worker_script must be set");
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::from(&self.pool)
    }

    pub fn spawner(&self) -> NodeSpawner {
        let spawner = NodeSpawner::new(&self.runtime.node_path, &self.runtime.worker_script);
        match &self.runtime.library_path {
            Some(path) if !path.trim().is_empty() => spawner.library_path(PathBuf::from(path)),
            _ => spawner,
        }
    }

    /// One-line summary for startup logs
    pub fn digest(&self) -> String {
        format!(
            "pool_size={} call_timeout_ms={} max_restarts={} node={} script={}",
            self.pool.size,
            self.pool.call_timeout_ms,
            self.pool.max_restart_attempts,
            self.runtime.node_path,
            self.runtime.worker_script
        )
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            size: settings.size,
            call_timeout: Duration::from_millis(settings.call_timeout_ms),
            startup_timeout: Duration::from_millis(settings.startup_timeout_ms),
            max_restart_attempts: settings.max_restart_attempts,
            restart_base_delay: Duration::from_millis(settings.restart_base_delay_ms),
            restart_max_delay: Duration::from_millis(settings.restart_max_delay_ms),
        }
    }
}

impl std::fmt::Display for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<BridgeConfig> {
        BridgeConfig::load_from(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn defaults_apply() {
        let cfg = from_toml("").unwrap();
        assert_eq!(cfg.pool.size, 16);
        assert_eq!(cfg.pool.call_timeout_ms, 30_000);
        assert_eq!(cfg.runtime.node_path, "node");
        assert!(cfg.runtime.library_path.is_none());
        assert!(!cfg.logging.json);

        let pool = cfg.pool_config();
        assert_eq!(pool.call_timeout, Duration::from_secs(30));
        assert_eq!(pool.max_restart_attempts, 5);
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = from_toml(
            r#"
            [pool]
            size = 2
            call_timeout_ms = 5000

            [runtime]
            library_path = "/opt/ccxt"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pool.size, 2);
        assert_eq!(cfg.pool_config().call_timeout, Duration::from_secs(5));
        assert_eq!(
            cfg.spawner().library_path,
            Some(PathBuf::from("/opt/ccxt"))
        );
        assert!(cfg.digest().contains("pool_size=2"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = from_toml("[pool]\ncall_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("call_timeout_ms"));
    }
}
