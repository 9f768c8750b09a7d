use crate::task::TaskId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Build not found for job {job} (task {task})")]
    BuildNotFound { job: String, task: TaskId },

    #[error("Backend request failed: {0}")]
    Backend(String),

    #[error("Job creation failed for {job}: {reason}")]
    JobCreate { job: String, reason: String },

    #[error("Job {job} not visible after {attempts} attempts: {last_error}")]
    JobNotVisible {
        job: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Parameter {0} is not declared by the job template")]
    UndeclaredParameter(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record id prefix '{prefix}' matches {matches} records")]
    AmbiguousRecord { prefix: String, matches: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failed deployment. Carries the job name whenever resolution got far
/// enough to compute it, so the caller can still poll or retry by hand.
#[derive(Error, Debug)]
#[error("Deployment failed: {source}")]
pub struct DeployFailure {
    pub job_name: Option<String>,
    #[source]
    pub source: DeployError,
}

impl DeployFailure {
    pub fn new(job_name: Option<String>, source: DeployError) -> Self {
        Self { job_name, source }
    }

    /// Failure before any job name was known (unknown service or node).
    pub fn unresolved(source: DeployError) -> Self {
        Self {
            job_name: None,
            source,
        }
    }
}
