use crate::backend::Backend;
use crate::error::DeployError;
use crate::task::{DeploymentResult, DeploymentStatus, TaskId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

/// Translates backend build state into a deployment status.
pub struct ResultPoller {
    backend: Arc<dyn Backend>,
}

impl ResultPoller {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Fetch the current state of the build queued as `task_id`.
    ///
    /// A task the backend has not turned into a build yet is reported as
    /// `BuildNotFound`; callers poll again. Console output is fetched fresh on
    /// every call.
    pub async fn get_result(
        &self,
        job_name: &str,
        task_id: TaskId,
    ) -> Result<DeploymentResult, DeployError> {
        let job = self
            .backend
            .get_job(job_name)
            .await?
            .ok_or_else(|| DeployError::JobNotFound(job_name.to_string()))?;

        let build = match self.backend.get_build_by_queue_id(&job, task_id).await {
            Ok(Some(build)) => build,
            Ok(None) => {
                return Err(DeployError::BuildNotFound {
                    job: job_name.to_string(),
                    task: task_id,
                })
            }
            Err(e) => {
                error!("Fetching build for {} task {} failed: {}", job_name, task_id, e);
                return Err(e);
            }
        };

        let status = DeploymentStatus::from_build(build.is_running(), build.is_good());
        let console_output = self.backend.console_output(&job, &build).await?;
        debug!(
            "Job {} task {} build #{}: {} ({})",
            job_name,
            task_id,
            build.number,
            status,
            build.result()
        );

        Ok(DeploymentResult {
            job_name: job_name.to_string(),
            task_id,
            build_number: build.number,
            status,
            result: build.result().to_string(),
            console_output,
            polled_at: Utc::now(),
        })
    }
}
