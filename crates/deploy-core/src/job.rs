use crate::backend::{Backend, Job, Node};
use crate::config::JobVisibility;
use crate::error::DeployError;
use crate::service::Service;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Backend job name for one execution slot of a service on a node:
/// `v{version}-{environment}-{service}-{node}-{slot}`.
pub fn job_name(version: u32, environment: &str, service: &str, node: &str, slot: u32) -> String {
    format!("v{}-{}-{}-{}-{}", version, environment, service, node, slot)
}

/// Round-robin slot for a counter value. Nodes reporting zero executors are
/// treated as having one.
pub fn slot_index(counter: u32, num_executors: u32) -> u32 {
    counter % num_executors.max(1)
}

/// Job name chosen for one deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSlot {
    pub name: String,
    pub slot: u32,
}

#[derive(Debug, Clone)]
pub struct ResolvedJob {
    pub name: String,
    pub slot: u32,
    pub job: Job,
}

/// Maps (service, node) onto a backend job, creating it on first use.
///
/// Each call consumes one counter value, so deployments of a service rotate
/// across the node's executor slots and at most `num_executors` jobs exist per
/// (service, node) pair and template version.
pub struct JobResolver {
    backend: Arc<dyn Backend>,
    environment: String,
    visibility: JobVisibility,
}

impl JobResolver {
    pub fn new(
        backend: Arc<dyn Backend>,
        environment: impl Into<String>,
        visibility: JobVisibility,
    ) -> Self {
        Self {
            backend,
            environment: environment.into(),
            visibility,
        }
    }

    /// Bump the service counter and compute the job name for this attempt.
    pub fn assign(&self, service: &dyn Service, node: &Node) -> JobSlot {
        let counter = service.increment_deploy_counter();
        let slot = slot_index(counter, node.num_executors);
        let name = job_name(
            service.script().version(),
            &self.environment,
            service.name(),
            &node.name,
            slot,
        );
        debug!("Service {} counter {} -> job {}", service.name(), counter, name);
        JobSlot { name, slot }
    }

    pub async fn resolve_or_create(
        &self,
        service: &dyn Service,
        node: &Node,
    ) -> Result<ResolvedJob, DeployError> {
        let JobSlot { name, slot } = self.assign(service, node);
        let job = self.fetch_or_create(service, node, &name).await?;
        Ok(ResolvedJob { name, slot, job })
    }

    /// Fetch `name`, creating it from the service's script if it does not
    /// exist. Creation itself is never retried.
    pub async fn fetch_or_create(
        &self,
        service: &dyn Service,
        node: &Node,
        name: &str,
    ) -> Result<Job, DeployError> {
        if let Some(job) = self.backend.get_job(name).await? {
            return Ok(job);
        }

        let definition = service.script().render(&node.name)?;
        if let Err(e) = self.backend.create_job(name, &definition).await {
            error!("Creating job {} failed: {}", name, e);
            return Err(match e {
                already @ DeployError::JobCreate { .. } => already,
                other => DeployError::JobCreate {
                    job: name.to_string(),
                    reason: other.to_string(),
                },
            });
        }
        info!("Created job {} on {}", name, self.backend.kind());

        self.wait_visible(name).await
    }

    /// The backend may lag behind its own create call; poll a bounded number
    /// of times.
    async fn wait_visible(&self, name: &str) -> Result<Job, DeployError> {
        let attempts = self.visibility.attempts.max(1);
        let mut last_error = String::from("job not found");

        for attempt in 1..=attempts {
            match self.backend.get_job(name).await {
                Ok(Some(job)) => return Ok(job),
                Ok(None) => last_error = "job not found".to_string(),
                Err(e) => last_error = e.to_string(),
            }
            warn!(
                "Job {} not visible yet (attempt {}/{}): {}",
                name, attempt, attempts, last_error
            );
            if attempt < attempts {
                tokio::time::sleep(self.visibility.interval()).await;
            }
        }

        error!("Job {} still not visible after {} attempts", name, attempts);
        Err(DeployError::JobNotVisible {
            job: name.to_string(),
            attempts,
            last_error,
        })
    }
}
