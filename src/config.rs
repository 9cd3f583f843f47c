//! # Configuration Management
//!
//! This module handles loading the client configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP__ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `NODE_HOST`, `NODE_PORT`, `NODE_PASSWORD` (first node only)
//! 2. Environment variables (APP__CLIENT__USER_ID, APP__BACKOFF__BASE_MS, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

/// Main configuration: who we are, how we back off, and which nodes we talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub backoff: BackoffConfig,
    pub nodes: Vec<NodeConfig>,
}

/// Identity and behaviour shared by every node connection.
///
/// ## Fields:
/// - `user_id`: the bot user id sent as `User-Id` in the handshake
/// - `client_name`: sent as `Client-Name`
/// - `user_agent`: sent as `User-Agent`
/// - `shard_count`: sent as `Num-Shards`
/// - `auto_reconnect`: whether a closed connection enters the backoff/reconnect cycle
/// - `readiness_timeout_ms`: how long `connect()` waits for the host to become ready
/// - `report_interval_secs`: how often the binary logs a health report (0 disables)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub user_id: u64,
    pub client_name: String,
    pub user_agent: String,
    pub shard_count: u32,
    pub auto_reconnect: bool,
    pub readiness_timeout_ms: u64,
    pub report_interval_secs: u64,
}

/// Reconnect delay tuning.
///
/// Delays follow `base_ms * 2^min(attempt, max_exponent)`, capped at `max_delay_ms`.
/// `jitter` adds up to that fraction of the delay on top (0.0 disables it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_exponent: u32,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

/// One remote audio node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique name used in logs, notifications and registry lookups
    pub identifier: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Use `wss://` instead of `ws://`
    #[serde(default)]
    pub secure: bool,
    /// Fixed resume key; a random one is generated when absent
    #[serde(default)]
    pub resume_key: Option<String>,
    /// When set, `configureResuming` is sent after every handshake
    #[serde(default)]
    pub resume_timeout_secs: Option<u64>,
    /// WebSocket ping interval; no heartbeat when absent
    #[serde(default)]
    pub heartbeat_secs: Option<u64>,
    #[serde(default)]
    pub region: Option<String>,
}

impl NodeConfig {
    /// Build a node entry with the remaining fields at their defaults.
    pub fn new(identifier: &str, host: &str, port: u16, password: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            host: host.to_string(),
            port,
            password: password.to_string(),
            secure: false,
            resume_key: None,
            resume_timeout_secs: None,
            heartbeat_secs: None,
            region: None,
        }
    }

    /// `ws://host:port` or `wss://host:port` depending on the secure flag.
    pub fn uri(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig {
                user_id: 0,
                client_name: "audio-node-client".to_string(),
                user_agent: format!("audio-node-client/{}", env!("CARGO_PKG_VERSION")),
                shard_count: 1,
                auto_reconnect: true,
                readiness_timeout_ms: 30_000,
                report_interval_secs: 60,
            },
            backoff: BackoffConfig {
                base_ms: 1_000,
                max_exponent: 10,
                max_delay_ms: 300_000, // five minutes
                jitter: 0.0,
            },
            nodes: vec![NodeConfig::new("main", "127.0.0.1", 2333, "youshallnotpass")],
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP__CLIENT__USER_ID=1234`: Override the bot user id
    /// - `APP__BACKOFF__MAX_DELAY_MS=60000`: Cap reconnect delays at one minute
    /// - `NODE_HOST=lavalink.internal`: Point the first node somewhere else
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__"),
            );

        let mut config: AppConfig = settings.build()?.try_deserialize()?;

        // Deployment shortcuts for the common single-node setup
        if let Some(first) = config.nodes.first_mut() {
            if let Ok(host) = env::var("NODE_HOST") {
                first.host = host;
            }
            if let Ok(port) = env::var("NODE_PORT") {
                first.port = port
                    .parse()
                    .map_err(|e| anyhow::anyhow!("NODE_PORT is not a valid port: {}", e))?;
            }
            if let Ok(password) = env::var("NODE_PASSWORD") {
                first.password = password;
            }
        }

        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(anyhow::anyhow!("At least one node must be configured"));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.identifier.is_empty() {
                return Err(anyhow::anyhow!("Node identifier cannot be empty"));
            }
            if !seen.insert(node.identifier.as_str()) {
                return Err(anyhow::anyhow!("Duplicate node identifier: {}", node.identifier));
            }
            if node.host.is_empty() {
                return Err(anyhow::anyhow!("Node {} has an empty host", node.identifier));
            }
            if node.port == 0 {
                return Err(anyhow::anyhow!("Node {} port cannot be 0", node.identifier));
            }
            if let Err(e) = node.uri().into_client_request() {
                return Err(anyhow::anyhow!(
                    "Node {} address {} is not a valid URL: {}",
                    node.identifier,
                    node.uri(),
                    e
                ));
            }
        }

        if self.client.shard_count == 0 {
            return Err(anyhow::anyhow!("Shard count must be greater than 0"));
        }

        if self.backoff.base_ms == 0 {
            return Err(anyhow::anyhow!("Backoff base delay must be greater than 0"));
        }

        if self.backoff.max_delay_ms < self.backoff.base_ms {
            return Err(anyhow::anyhow!(
                "Backoff ceiling ({}ms) is below the base delay ({}ms)",
                self.backoff.max_delay_ms,
                self.backoff.base_ms
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(anyhow::anyhow!("Backoff jitter must be between 0.0 and 1.0"));
        }

        Ok(())
    }

    pub fn node(&self, identifier: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.identifier == identifier)
    }
}
