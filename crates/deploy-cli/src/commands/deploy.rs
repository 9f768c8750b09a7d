use crate::dispatch::Context;
use deploy_core::record::{count_records, records_dir, DeploymentRecord};
use deploy_core::Config;
use std::path::Path;
use std::sync::Arc;

pub fn override_package_url(config: &mut Config, service: &str, pkg_url: String) -> anyhow::Result<()> {
    let entry = config
        .services
        .iter_mut()
        .find(|s| s.name == service)
        .ok_or_else(|| anyhow::anyhow!("Service not found: {}", service))?;
    entry.pkg_url = pkg_url;
    Ok(())
}

pub async fn run(ctx: &Context, service: &str, node: &str) -> anyhow::Result<()> {
    let record = deploy_recorded(ctx, &records_dir(), service, node).await?;

    println!("Deployment queued:");
    println!("  ID:      {}", record.id);
    println!("  Service: {}", record.service);
    println!("  Node:    {}", record.node);
    println!("  Job:     {}", record.job_name);
    println!("  Task:    {}", record.task_id);

    Ok(())
}

/// Re-register `service` with its deploy counter seeded from the ledger in
/// `dir`, so each process picks up the slot rotation where the last left off.
pub fn seed_counter(ctx: &Context, dir: &Path, service: &str) -> anyhow::Result<u32> {
    let entry = ctx
        .config
        .find_service(service)
        .ok_or_else(|| anyhow::anyhow!("Service not found: {}", service))?;
    let count = count_records(dir, service, ctx.deployer.environment())?;
    let seeded = entry.build(&ctx.base_dir)?.with_counter(count);
    ctx.deployer.add_service(Arc::new(seeded));
    Ok(count)
}

/// Queue a deployment and write its record to `dir`.
pub async fn deploy_recorded(
    ctx: &Context,
    dir: &Path,
    service: &str,
    node: &str,
) -> anyhow::Result<DeploymentRecord> {
    seed_counter(ctx, dir, service)?;
    ctx.deployer.nodes().refresh().await?;

    let deployment = match ctx.deployer.deploy_by_name(service, node).await {
        Ok(d) => d,
        Err(failure) => {
            if let Some(job) = &failure.job_name {
                eprintln!("Job: {}", job);
            }
            return Err(failure.into());
        }
    };

    let record = DeploymentRecord::new(service, node, ctx.deployer.environment(), &deployment);
    record.write_to_dir(dir)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_core::memory::MemoryBackend;

    const CONFIG: &str = "backend: { url: \"http://jenkins\" }\nenvironment: prod\nservices:\n  - { name: api, pkg_url: a.tgz, target_path: /opt, run_cmd: run }\n";

    fn context(backend: Arc<MemoryBackend>) -> Context {
        let config = Config::from_yaml(CONFIG).unwrap();
        Context::with_backend(config, backend, ".".into()).unwrap()
    }

    #[test]
    fn test_override_package_url() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        override_package_url(&mut config, "api", "b.tgz".into()).unwrap();
        assert_eq!(config.services[0].pkg_url, "b.tgz");
        assert!(override_package_url(&mut config, "web", "c.tgz".into()).is_err());
    }

    #[tokio::test]
    async fn test_consecutive_runs_rotate_slots() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new().with_node("10.0.0.1", 4, "prod:(10.0.0.1)"));

        let mut jobs = Vec::new();
        for _ in 0..5 {
            // Fresh context per deployment, as with one process per command.
            let ctx = context(backend.clone());
            let record = deploy_recorded(&ctx, dir.path(), "api", "10.0.0.1").await.unwrap();
            jobs.push(record.job_name);
        }

        assert_eq!(
            jobs,
            vec![
                "v1-prod-api-10.0.0.1-1",
                "v1-prod-api-10.0.0.1-2",
                "v1-prod-api-10.0.0.1-3",
                "v1-prod-api-10.0.0.1-0",
                "v1-prod-api-10.0.0.1-1",
            ]
        );
        assert_eq!(count_records(dir.path(), "api", "prod").unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unknown_service_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryBackend::new()));
        assert!(deploy_recorded(&ctx, dir.path(), "web", "10.0.0.1").await.is_err());
    }
}
