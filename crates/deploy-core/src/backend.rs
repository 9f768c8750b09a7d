use crate::error::DeployError;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Execution target registered on the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub num_executors: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub offline: bool,
}

/// Everything the backend needs to register a new SSH-launched node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub num_executors: u32,
    pub description: String,
    pub remote_fs: String,
    pub launcher: SshLauncher,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshLauncher {
    pub host: String,
    pub port: String,
    pub credentials_id: String,
    pub jvm_options: String,
}

/// Backend-side job handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub name: String,
}

/// One materialized run of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Build {
    pub number: u64,
    pub building: bool,
    #[serde(default)]
    pub result: Option<String>,
}

impl Build {
    pub fn is_running(&self) -> bool {
        self.building
    }

    pub fn is_good(&self) -> bool {
        self.result.as_deref() == Some("SUCCESS")
    }

    /// Raw backend result string, empty while the build has none.
    pub fn result(&self) -> &str {
        self.result.as_deref().unwrap_or("")
    }
}

/// Build-automation server the engine delegates execution to.
/// Every call may block on the network; none of them retry.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Backend kind for logs ("jenkins", "memory").
    fn kind(&self) -> &str;

    async fn list_nodes(&self) -> Result<Vec<Node>, DeployError>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>, DeployError>;

    async fn create_node(&self, spec: &NodeSpec) -> Result<Node, DeployError>;

    /// Returns whether the backend reported the node as deleted.
    async fn delete_node(&self, name: &str) -> Result<bool, DeployError>;

    /// `Ok(None)` when no job with this name exists (yet).
    async fn get_job(&self, name: &str) -> Result<Option<Job>, DeployError>;

    async fn create_job(&self, name: &str, definition: &str) -> Result<Job, DeployError>;

    async fn invoke_job(
        &self,
        job: &Job,
        params: &BTreeMap<String, String>,
    ) -> Result<TaskId, DeployError>;

    /// `Ok(None)` while the queued task has not turned into a build.
    async fn get_build_by_queue_id(
        &self,
        job: &Job,
        task_id: TaskId,
    ) -> Result<Option<Build>, DeployError>;

    async fn console_output(&self, job: &Job, build: &Build) -> Result<String, DeployError>;
}
