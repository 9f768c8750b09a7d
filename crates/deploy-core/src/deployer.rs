use crate::artifact::ArtifactStore;
use crate::backend::{Backend, Node};
use crate::config::{Config, JobVisibility, NodeConfig};
use crate::dispatch::Dispatcher;
use crate::error::{DeployError, DeployFailure};
use crate::job::JobResolver;
use crate::node::NodeRegistry;
use crate::poll::ResultPoller;
use crate::service::Service;
use crate::task::{Deployment, DeploymentResult, TaskId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Engine settings, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct DeployerSettings {
    pub environment: String,
    pub primary_node: String,
    pub node_defaults: NodeConfig,
    pub artifact_store: ArtifactStore,
    pub job_visibility: JobVisibility,
}

impl DeployerSettings {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            primary_node: "master".to_string(),
            node_defaults: NodeConfig::default(),
            artifact_store: ArtifactStore::default(),
            job_visibility: JobVisibility::default(),
        }
    }
}

impl From<&Config> for DeployerSettings {
    fn from(config: &Config) -> Self {
        Self {
            environment: config.environment.clone(),
            primary_node: config.primary_node.clone(),
            node_defaults: config.node_defaults.clone(),
            artifact_store: config.artifact_store.clone(),
            job_visibility: config.job_visibility,
        }
    }
}

/// Entry point tying the node registry, registered services, dispatcher and
/// result poller to one backend and environment.
pub struct Deployer {
    environment: String,
    nodes: NodeRegistry,
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    dispatcher: Dispatcher,
    poller: ResultPoller,
}

impl Deployer {
    /// The node cache starts empty; call `nodes().refresh()` before deploying.
    pub fn new(backend: Arc<dyn Backend>, settings: DeployerSettings) -> Self {
        let nodes = NodeRegistry::new(
            Arc::clone(&backend),
            settings.environment.clone(),
            settings.primary_node,
            settings.node_defaults,
        );
        let resolver = JobResolver::new(
            Arc::clone(&backend),
            settings.environment.clone(),
            settings.job_visibility,
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&backend),
            settings.environment.clone(),
            settings.artifact_store,
            resolver,
        );

        Self {
            environment: settings.environment,
            nodes,
            services: RwLock::new(HashMap::new()),
            dispatcher,
            poller: ResultPoller::new(backend),
        }
    }

    /// Build a deployer with every service from `config` registered. Script
    /// files resolve relative to `base_dir`.
    pub fn from_config(
        backend: Arc<dyn Backend>,
        config: &Config,
        base_dir: &Path,
    ) -> anyhow::Result<Self> {
        let deployer = Self::new(backend, DeployerSettings::from(config));
        for service in &config.services {
            deployer.add_service(Arc::new(service.build(base_dir)?));
        }
        Ok(deployer)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// Register a service, replacing any previous one with the same name.
    pub fn add_service(&self, service: Arc<dyn Service>) -> Option<Arc<dyn Service>> {
        info!("Registered service {}", service.name());
        self.services
            .write()
            .insert(service.name().to_string(), service)
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.read().get(name).cloned()
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn deploy(
        &self,
        service: &dyn Service,
        node: &Node,
    ) -> Result<Deployment, DeployFailure> {
        self.dispatcher.deploy(service, node).await
    }

    /// Deploy by name. Unknown services or nodes fail before any backend call.
    pub async fn deploy_by_name(
        &self,
        service_name: &str,
        node_name: &str,
    ) -> Result<Deployment, DeployFailure> {
        let service = self.service(service_name).ok_or_else(|| {
            DeployFailure::unresolved(DeployError::ServiceNotFound(service_name.to_string()))
        })?;
        let node = self.nodes.resolve(node_name).ok_or_else(|| {
            DeployFailure::unresolved(DeployError::NodeNotFound(node_name.to_string()))
        })?;

        self.dispatcher.deploy(service.as_ref(), &node).await
    }

    pub async fn get_result(
        &self,
        job_name: &str,
        task_id: TaskId,
    ) -> Result<DeploymentResult, DeployError> {
        self.poller.get_result(job_name, task_id).await
    }

    /// Job definition `service` would get on `node`, without touching the
    /// backend or the deploy counter.
    pub fn render_job(&self, service_name: &str, node_name: &str) -> Result<String, DeployError> {
        let service = self
            .service(service_name)
            .ok_or_else(|| DeployError::ServiceNotFound(service_name.to_string()))?;
        service.script().render(node_name)
    }
}
