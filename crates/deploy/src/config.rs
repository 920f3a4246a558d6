//! Deployment configuration.
//!
//! Everything the orchestrator needs from the environment comes in through
//! [`DeployConfig`], built once and passed in at construction. Core logic
//! never reads ambient state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};

/// The default name for the slipway configuration file.
pub const SLIPCONF_FILENAME: &str = "Slipway.toml";

/// Retry and backoff tunables for remote operations.
///
/// Only errors classified transient are retried; see
/// [`GatewayError::is_transient`](crate::GatewayError::is_transient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries per remote operation, on top of the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub factor: f32,
    /// Ceiling on the per-retry delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Backoff builder matching this configuration, with jitter.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_factor(self.factor)
            .with_max_times(self.max_retries as usize)
            .with_jitter()
    }
}

/// Configuration for a deployment pipeline.
///
/// Can be serialized to/from TOML format (`Slipway.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// URL of the cluster's JSON-RPC endpoint.
    pub cluster_url: String,
    /// Path to the authority keypair file.
    pub keypair_path: PathBuf,
    /// Maximum bytes per chunk write, bounded by the cluster's transaction
    /// payload limit.
    pub chunk_size: usize,
    /// How many chunk writes may be in flight at once.
    pub chunk_concurrency: usize,
    /// Minimum extension granted when a program account is undersized, to
    /// amortize future growth.
    pub min_extend_bytes: u64,
    /// Per-remote-call timeout in seconds.
    pub rpc_timeout_secs: u64,
    /// Retry and backoff tunables.
    pub retry: RetryConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            cluster_url: "http://127.0.0.1:8899".to_string(),
            keypair_path: default_keypair_path(),
            chunk_size: 900,
            chunk_concurrency: 4,
            min_extend_bytes: 10 * 1024,
            rpc_timeout_secs: 5,
            retry: RetryConfig::default(),
        }
    }
}

impl DeployConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Slipway.toml`
    /// inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(SLIPCONF_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.cluster_url)
            .context(format!("Invalid cluster URL: {}", self.cluster_url))?;
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if self.chunk_concurrency == 0 {
            anyhow::bail!("chunk_concurrency must be greater than zero");
        }
        Ok(())
    }
}

/// Default keypair location under the user's configuration directory.
pub fn default_keypair_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("slipway").join("id.json"))
        .unwrap_or_else(|| PathBuf::from("id.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new("slipway-config").expect("Failed to create temp dir");
        let path = dir.path().join(SLIPCONF_FILENAME);

        let mut config = DeployConfig::default();
        config.cluster_url = "https://validator.example.com:8899".to_string();
        config.retry.max_retries = 7;

        config.save_to_file(&path).expect("Failed to save config");
        let loaded = DeployConfig::load_from_file(&path).expect("Failed to load config");

        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new("slipway-config").expect("Failed to create temp dir");
        let config = DeployConfig::default();
        config
            .save_to_file(&dir.path().join(SLIPCONF_FILENAME))
            .expect("Failed to save config");

        let loaded =
            DeployConfig::load_from_file(dir.path()).expect("Failed to load config from dir");
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new("slipway-config").expect("Failed to create temp dir");
        let result = DeployConfig::load_from_file(&dir.path().join("nope.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = DeployConfig {
            cluster_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = DeployConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = DeployConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.max_delay_ms, 8_000);
    }
}
