//! # Node Registry
//!
//! Owns every `NodeClient` of the process. The registry is created once at
//! startup and passed to whoever needs a node; there is no global instance.
//!
//! ## Shared Pieces:
//! All clients share one connector, one event sink, one readiness signal and
//! one set of client settings. Each client owns its own node, backoff and
//! connection.
//!
//! ## Node Selection:
//! `best_available` picks the available node with the lowest load penalty, so
//! new players land on the least busy node.

use crate::config::{AppConfig, NodeConfig};
use crate::error::{NodeError, NodeResult};
use crate::node::{ClientSettings, Node, NodeClient};
use crate::notify::EventSink;
use crate::readiness::Readiness;
use crate::transport::Connector;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct NodeRegistry {
    clients: RwLock<HashMap<String, Arc<NodeClient>>>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn EventSink>,
    readiness: Readiness,
    settings: ClientSettings,
    started_at: Instant,
}

impl NodeRegistry {
    pub fn new(
        connector: Arc<dyn Connector>,
        sink: Arc<dyn EventSink>,
        readiness: Readiness,
        settings: ClientSettings,
    ) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            connector,
            sink,
            readiness,
            settings,
            started_at: Instant::now(),
        }
    }

    /// Build a registry with one client per configured node.
    pub async fn from_config(
        config: &AppConfig,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn EventSink>,
        readiness: Readiness,
    ) -> NodeResult<Self> {
        let registry = Self::new(connector, sink, readiness, ClientSettings::from_config(config));
        for node in &config.nodes {
            registry.add_node(node.clone()).await?;
        }
        Ok(registry)
    }

    /// Register a node. Identifiers must be unique.
    pub async fn add_node(&self, config: NodeConfig) -> NodeResult<Arc<NodeClient>> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&config.identifier) {
            return Err(NodeError::Config(format!(
                "node {} is already registered",
                config.identifier
            )));
        }

        let identifier = config.identifier.clone();
        let node = Arc::new(Node::new(config, self.settings.shard_count));
        info!(node = %identifier, uri = %node.uri(), "Registered node");

        let client = NodeClient::new(
            node,
            Arc::clone(&self.connector),
            Arc::clone(&self.sink),
            self.readiness.clone(),
            self.settings.clone(),
        );
        clients.insert(identifier, Arc::clone(&client));
        Ok(client)
    }

    pub async fn get(&self, identifier: &str) -> Option<Arc<NodeClient>> {
        self.clients.read().await.get(identifier).cloned()
    }

    /// Shut a node down and forget it.
    pub async fn remove(&self, identifier: &str) -> NodeResult<Arc<NodeClient>> {
        let client = self
            .clients
            .write()
            .await
            .remove(identifier)
            .ok_or_else(|| NodeError::UnknownNode(identifier.to_string()))?;

        client.shutdown().await;
        info!(node = %identifier, "Removed node");
        Ok(client)
    }

    /// Every client, ordered by node identifier.
    pub async fn clients(&self) -> Vec<Arc<NodeClient>> {
        let mut clients: Vec<Arc<NodeClient>> = self.clients.read().await.values().cloned().collect();
        clients.sort_by(|a, b| a.node().identifier().cmp(b.node().identifier()));
        clients
    }

    /// The available node with the lowest load penalty.
    pub async fn best_available(&self) -> Option<Arc<NodeClient>> {
        let mut best: Option<(f64, Arc<NodeClient>)> = None;
        for client in self.clients().await {
            if !client.node().is_available() {
                continue;
            }
            let penalty = client.node().penalty().await;
            match &best {
                Some((lowest, _)) if *lowest <= penalty => {}
                _ => best = Some((penalty, client)),
            }
        }
        best.map(|(_, client)| client)
    }

    /// Connect every node. Failures are logged and do not stop the others;
    /// nodes with auto-reconnect keep trying in the background.
    pub async fn connect_all(&self) -> usize {
        let mut connected = 0;
        for client in self.clients().await {
            match client.connect().await {
                Ok(()) => connected += 1,
                Err(err) => warn!(
                    node = %client.node().identifier(),
                    error = %err,
                    "Initial connect failed"
                ),
            }
        }
        connected
    }

    pub async fn shutdown_all(&self) {
        for client in self.clients().await {
            client.shutdown().await;
        }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
