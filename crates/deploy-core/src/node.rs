//! Environment-scoped cache of backend nodes.
//!
//! Job resolution needs a node's executor count on every deployment, so nodes
//! are read from this cache rather than fetched per call. The cache is only
//! rebuilt by [`NodeRegistry::refresh`], which node creation and deletion call
//! on success.

use crate::backend::{Backend, Node, NodeSpec, SshLauncher};
use crate::config::{NodeConfig, NodeOptions};
use crate::error::DeployError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct NodeRegistry {
    backend: Arc<dyn Backend>,
    environment: String,
    primary_node: String,
    defaults: NodeConfig,
    cache: RwLock<Arc<HashMap<String, Node>>>,
}

impl NodeRegistry {
    /// Empty registry; call [`refresh`](Self::refresh) to populate it.
    pub fn new(
        backend: Arc<dyn Backend>,
        environment: impl Into<String>,
        primary_node: impl Into<String>,
        defaults: NodeConfig,
    ) -> Self {
        Self {
            backend,
            environment: environment.into(),
            primary_node: primary_node.into(),
            defaults,
            cache: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn defaults(&self) -> &NodeConfig {
        &self.defaults
    }

    /// Whether `node` belongs to this registry's environment.
    pub fn in_scope(&self, node: &Node) -> bool {
        node.description.starts_with(&self.environment) || node.name == self.primary_node
    }

    /// Reload the cache from the backend. On failure the previous cache stays
    /// in place and the error is returned.
    pub async fn refresh(&self) -> Result<usize, DeployError> {
        let nodes = match self.backend.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!("Node cache refresh failed, keeping previous cache: {}", e);
                return Err(e);
            }
        };

        let scoped: HashMap<String, Node> = nodes
            .into_iter()
            .filter(|n| self.in_scope(n))
            .map(|n| (n.name.clone(), n))
            .collect();
        let count = scoped.len();

        *self.cache.write() = Arc::new(scoped);
        info!("Node cache refreshed: {} node(s) in '{}'", count, self.environment);
        Ok(count)
    }

    /// Cache lookup only; never hits the backend.
    pub fn resolve(&self, name: &str) -> Option<Node> {
        self.cache.read().get(name).cloned()
    }

    /// Snapshot of all cached nodes, sorted by name.
    pub fn nodes(&self) -> Vec<Node> {
        let snapshot: Arc<HashMap<String, Node>> = self.cache.read().clone();
        let mut nodes: Vec<Node> = snapshot.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Register `ip` as an SSH-launched node. Prefer private addresses; note
    /// that the same private IP may exist in several environments.
    pub async fn create(
        &self,
        ip: &str,
        remark: &str,
        options: &NodeOptions,
    ) -> Result<Node, DeployError> {
        let settings = options.merge_over(&self.defaults);
        let spec = NodeSpec {
            name: ip.to_string(),
            num_executors: settings.num_executors,
            description: format!("{}:({}){}", self.environment, ip, remark),
            remote_fs: settings.remote_fs,
            launcher: SshLauncher {
                host: ip.to_string(),
                port: settings.ssh_port,
                credentials_id: settings.credentials_id,
                jvm_options: settings.jvm_options,
            },
        };

        let node = self.backend.create_node(&spec).await.map_err(|e| {
            error!("Creating node {} failed: {}", ip, e);
            e
        })?;
        info!("Created node {} with {} executor(s)", node.name, node.num_executors);

        if let Err(e) = self.refresh().await {
            warn!("Node {} created but cache refresh failed: {}", node.name, e);
        }
        Ok(node)
    }

    /// Delete a node on the backend. Returns whether the backend confirmed.
    pub async fn delete(&self, name: &str) -> Result<bool, DeployError> {
        if self.backend.get_node(name).await?.is_none() {
            return Err(DeployError::NodeNotFound(name.to_string()));
        }

        let deleted = self.backend.delete_node(name).await.map_err(|e| {
            error!("Deleting node {} failed: {}", name, e);
            e
        })?;

        if deleted {
            info!("Deleted node {}", name);
            if let Err(e) = self.refresh().await {
                warn!("Node {} deleted but cache refresh failed: {}", name, e);
            }
        } else {
            warn!("Backend declined to delete node {}", name);
        }
        Ok(deleted)
    }
}
