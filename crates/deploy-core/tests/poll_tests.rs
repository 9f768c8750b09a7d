#[cfg(test)]
mod tests {
    use deploy_core::config::JobVisibility;
    use deploy_core::memory::MemoryBackend;
    use deploy_core::{
        DefaultService, DeployError, DeploySpec, Deployer, DeployerSettings, DeploymentStatus,
        TaskId,
    };
    use std::sync::Arc;

    async fn deployer() -> (Arc<MemoryBackend>, Deployer) {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_node("N", 2, "prod:(N)")
                .with_node("M", 1, "prod:(M)"),
        );
        let mut settings = DeployerSettings::new("prod");
        settings.job_visibility = JobVisibility {
            attempts: 1,
            interval_ms: 0,
        };
        let deployer = Deployer::new(backend.clone(), settings);
        deployer.nodes().refresh().await.unwrap();
        deployer.add_service(Arc::new(DefaultService::new(
            "S",
            DeploySpec {
                pkg_url: "pkg.tgz".into(),
                target_path: "/opt/app".into(),
                run_cmd: "run.sh".into(),
                ..DeploySpec::default()
            },
        )));
        (backend, deployer)
    }

    #[tokio::test]
    async fn test_queued_task_is_build_not_found() {
        let (_backend, deployer) = deployer().await;
        let d = deployer.deploy_by_name("S", "N").await.unwrap();

        let err = deployer.get_result(&d.job_name, d.task_id).await.unwrap_err();
        assert!(matches!(err, DeployError::BuildNotFound { task, .. } if task == d.task_id));
    }

    #[tokio::test]
    async fn test_status_follows_build_lifecycle() {
        let (backend, deployer) = deployer().await;
        let d = deployer.deploy_by_name("S", "N").await.unwrap();

        backend.start_build(&d.job_name, d.task_id);
        backend.append_console(&d.job_name, d.task_id, "deploy: downloading s3get...\n");
        let running = deployer.get_result(&d.job_name, d.task_id).await.unwrap();
        assert_eq!(running.status, DeploymentStatus::Running);
        assert!(!running.status.is_terminal());
        assert_eq!(running.result, "");
        assert_eq!(running.console_output, "deploy: downloading s3get...\n");

        backend.finish_build(&d.job_name, d.task_id, "SUCCESS", "done\n");
        let finished = deployer.get_result(&d.job_name, d.task_id).await.unwrap();
        assert_eq!(finished.status, DeploymentStatus::Finish);
        assert_eq!(finished.result, "SUCCESS");
        assert_eq!(finished.console_output, "done\n");
        assert_eq!(finished.build_number, running.build_number);
    }

    #[tokio::test]
    async fn test_failed_and_aborted_builds_map_to_error() {
        let (backend, deployer) = deployer().await;
        for result in ["FAILURE", "ABORTED", "UNSTABLE"] {
            let d = deployer.deploy_by_name("S", "N").await.unwrap();
            backend.finish_build(&d.job_name, d.task_id, result, "");
            let polled = deployer.get_result(&d.job_name, d.task_id).await.unwrap();
            assert_eq!(polled.status, DeploymentStatus::Error, "{result}");
            assert_eq!(polled.result, result);
        }
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (_backend, deployer) = deployer().await;
        let err = deployer
            .get_result("v1-prod-S-N-9", TaskId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::JobNotFound(name) if name == "v1-prod-S-N-9"));
    }

    #[tokio::test]
    async fn test_results_survive_node_deletion() {
        let (backend, deployer) = deployer().await;
        let d = deployer.deploy_by_name("S", "M").await.unwrap();
        backend.finish_build(&d.job_name, d.task_id, "SUCCESS", "ok");

        assert!(deployer.nodes().delete("M").await.unwrap());
        assert!(deployer.nodes().resolve("M").is_none());

        let failure = deployer.deploy_by_name("S", "M").await.unwrap_err();
        assert!(matches!(failure.source, DeployError::NodeNotFound(_)));

        let polled = deployer.get_result(&d.job_name, d.task_id).await.unwrap();
        assert_eq!(polled.status, DeploymentStatus::Finish);
    }
}
