use crate::artifact::ArtifactStore;
use crate::backend::{Backend, Node};
use crate::error::{DeployError, DeployFailure};
use crate::job::{JobResolver, JobSlot};
use crate::service::Service;
use crate::task::Deployment;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

pub const PARAM_RUN_ENV: &str = "RUN_ENV";
pub const PARAM_S3GET_URL: &str = "S3GET_URL";
pub const PARAM_S3ENV_VAR: &str = "S3ENV_VAR";

/// Full invocation parameters: environment constants overlaid by the
/// service's own parameters, which win on collision.
pub fn build_parameters(
    environment: &str,
    artifact: &ArtifactStore,
    service_params: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::from([
        (PARAM_RUN_ENV.to_string(), environment.to_string()),
        (PARAM_S3GET_URL.to_string(), artifact.fetcher_url.clone()),
        (PARAM_S3ENV_VAR.to_string(), artifact.env_blob()),
    ]);
    params.extend(service_params);
    params
}

/// Resolves the job for a deployment and queues one build of it.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    environment: String,
    artifact: ArtifactStore,
    resolver: JobResolver,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        environment: impl Into<String>,
        artifact: ArtifactStore,
        resolver: JobResolver,
    ) -> Self {
        Self {
            backend,
            environment: environment.into(),
            artifact,
            resolver,
        }
    }

    pub fn resolver(&self) -> &JobResolver {
        &self.resolver
    }

    /// Queue a deployment of `service` on `node`. Returns as soon as the
    /// backend has accepted the build; poll the result separately.
    pub async fn deploy(
        &self,
        service: &dyn Service,
        node: &Node,
    ) -> Result<Deployment, DeployFailure> {
        // Rejected before a slot is consumed or anything reaches the backend.
        let params = build_parameters(&self.environment, &self.artifact, service.parameters());
        if let Some(undeclared) = params.keys().find(|k| !service.script().declares(k)) {
            let e = DeployError::UndeclaredParameter(undeclared.clone());
            error!("Deploying {} to {} failed: {}", service.name(), node.name, e);
            return Err(DeployFailure::unresolved(e));
        }

        let JobSlot { name, slot } = self.resolver.assign(service, node);
        let fail = |e: DeployError| {
            error!("Deploying {} to {} via {} failed: {}", service.name(), node.name, name, e);
            DeployFailure::new(Some(name.clone()), e)
        };

        let job = self
            .resolver
            .fetch_or_create(service, node, &name)
            .await
            .map_err(&fail)?;

        let task_id = self.backend.invoke_job(&job, &params).await.map_err(&fail)?;
        info!(
            "Queued {} on {} (job {}, slot {}, task {})",
            service.name(),
            node.name,
            name,
            slot,
            task_id
        );

        Ok(Deployment {
            job_name: name,
            task_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_parameters_take_precedence() {
        let artifact = ArtifactStore {
            fetcher_url: "http://host/s3get.tgz".into(),
            ..Default::default()
        };
        let service = BTreeMap::from([
            ("RUN_ENV".to_string(), "override".to_string()),
            ("PKG_URL".to_string(), "pkg.tgz".to_string()),
        ]);

        let params = build_parameters("prod", &artifact, service);
        assert_eq!(params["RUN_ENV"], "override");
        assert_eq!(params["PKG_URL"], "pkg.tgz");
        assert_eq!(params["S3GET_URL"], "http://host/s3get.tgz");
        assert!(params["S3ENV_VAR"].starts_with("GOCD_S3_AK="));
    }

    #[test]
    fn environment_constants_always_present() {
        let params = build_parameters("dev", &ArtifactStore::default(), BTreeMap::new());
        let keys: Vec<_> = params.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["RUN_ENV", "S3ENV_VAR", "S3GET_URL"]);
        assert_eq!(params["RUN_ENV"], "dev");
    }
}
