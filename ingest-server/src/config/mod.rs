//! Configuration module for the ingest server.
//!
//! Handles loading configuration from an optional TOML file, then applying
//! CLI flags and environment variables on top.

pub mod file;
pub mod overrides;

use crate::config::file::FileConfig;
use crate::config::overrides::IngestOverrides;
use ledger_ingest_core::config::{
    BreakerConfig, ChainConfig, EventSpec, IngestConfig, PollerConfig, ProcessorConfig, RetryPolicy,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub database_max_connections: u32,
}

/// Loaded configuration result containing all parts.
///
/// `ingest` is not validated here: an invalid ingest section disables the
/// listener at startup but never stops the server.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    listen_override: Option<SocketAddr>,
    overrides: IngestOverrides,
}

impl ConfigLoader {
    pub fn new(
        config_path: Option<&Path>,
        listen_override: Option<SocketAddr>,
        overrides: IngestOverrides,
    ) -> Self {
        Self {
            config_path: config_path.map(Path::to_path_buf),
            listen_override,
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if one was given
    /// 2. Apply CLI / environment overrides
    /// 3. Build the runtime configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = match &self.config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => FileConfig::default(),
        };

        self.overrides.clone().apply(&mut file_config);
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        Ok(build_loaded_config(file_config))
    }
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let FileConfig {
        server,
        ingest,
        chain,
    } = file_config;

    // A bad URL leaves the chain unconfigured; the supervisor then refuses
    // to start and health reports the listener as down.
    let rpc_url = chain
        .rpc_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::error!(error = %e, "Ignoring invalid WEB3_RPC_URL");
                None
            }
        });

    LoadedConfig {
        server: ServerConfig {
            listen: server.listen,
            database_max_connections: server.database_max_connections,
        },
        ingest: IngestConfig {
            enabled: ingest.enabled,
            chain: ChainConfig {
                rpc_url,
                contract_address: chain.contract_address.filter(|a| !a.trim().is_empty()),
                events: chain
                    .events
                    .into_iter()
                    .map(|event| EventSpec {
                        name: event.name,
                        topic0: event.topic0,
                        params: event.params,
                    })
                    .collect(),
                request_timeout: Duration::from_secs(chain.request_timeout_seconds),
            },
            poller: PollerConfig {
                max_block_span: ingest.max_block_span,
                confirmations: ingest.confirmations,
                start_block: ingest.start_block,
                store_timeout: Duration::from_secs(ingest.store_timeout_secs),
            },
            processor: ProcessorConfig {
                batch_size: ingest.batch_size,
                claim_lease: Duration::from_secs(ingest.claim_lease_secs),
                retry: RetryPolicy {
                    max_retries: ingest.max_retries,
                    base: Duration::from_secs(ingest.backoff_base_secs),
                    cap: Duration::from_secs(ingest.backoff_cap_secs),
                },
                store_timeout: Duration::from_secs(ingest.store_timeout_secs),
                handler_timeout: Duration::from_secs(ingest.handler_timeout_secs),
            },
            breaker: BreakerConfig {
                failure_threshold: ingest.failure_threshold,
                cooldown: Duration::from_secs(ingest.cooldown_seconds),
                max_cooldown: Duration::from_secs(ingest.max_cooldown_seconds),
                health_cache_ttl: Duration::from_secs(ingest.health_cache_ttl_seconds),
            },
            poll_interval: Duration::from_secs(ingest.poll_interval_secs),
            process_interval: Duration::from_secs(ingest.process_interval_secs),
            heartbeat_interval: Duration::from_secs(ingest.heartbeat_secs),
        },
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core_defaults() {
        let loaded = ConfigLoader::new(None, None, IngestOverrides::default())
            .load()
            .unwrap();
        let core = IngestConfig::default();
        assert_eq!(loaded.ingest.poll_interval, core.poll_interval);
        assert_eq!(loaded.ingest.process_interval, core.process_interval);
        assert_eq!(loaded.ingest.processor.retry, core.processor.retry);
        assert_eq!(loaded.ingest.breaker.cooldown, core.breaker.cooldown);
        assert_eq!(loaded.ingest.processor.handler_timeout, core.processor.handler_timeout);
        assert_eq!(loaded.server.listen.port(), 8080);
        assert!(loaded.ingest.chain.rpc_url.is_none());
        loaded.ingest.validate().unwrap();
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut file: FileConfig = toml::from_str(
            r#"
[ingest]
max_retries = 8
poll_interval_secs = 9
"#,
        )
        .unwrap();
        IngestOverrides {
            max_retries: Some(2),
            web3_rpc_url: Some("https://rpc.example.org".to_string()),
            enable_blockchain_listener: Some(false),
            ..IngestOverrides::default()
        }
        .apply(&mut file);

        let loaded = build_loaded_config(file);
        assert_eq!(loaded.ingest.processor.retry.max_retries, 2);
        assert_eq!(loaded.ingest.poll_interval, Duration::from_secs(9));
        assert!(!loaded.ingest.enabled);
        assert_eq!(
            loaded.ingest.chain.rpc_url.unwrap().as_str(),
            "https://rpc.example.org/"
        );
    }

    #[test]
    fn test_invalid_rpc_url_leaves_chain_unconfigured() {
        let mut file = FileConfig::default();
        file.chain.rpc_url = Some("not a url".to_string());
        let loaded = build_loaded_config(file);
        assert!(loaded.ingest.chain.rpc_url.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = ConfigLoader::new(
            Some(Path::new("/nonexistent/ingest-server.toml")),
            None,
            IngestOverrides::default(),
        );
        assert!(matches!(loader.load(), Err(ConfigError::IoError(_))));
    }
}
