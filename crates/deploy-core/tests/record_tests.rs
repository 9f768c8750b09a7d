#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use deploy_core::record::{count_records, find_record, list_records, DeploymentRecord};
    use deploy_core::{DeployError, Deployment, DeploymentResult, DeploymentStatus, TaskId};

    fn record(service: &str, task: u64) -> DeploymentRecord {
        DeploymentRecord::new(
            service,
            "10.0.0.1",
            "prod",
            &Deployment {
                job_name: format!("v1-prod-{}-10.0.0.1-1", service),
                task_id: TaskId(task),
            },
        )
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record("api", 42);
        rec.write_to_dir(dir.path()).unwrap();

        let loaded = find_record(dir.path(), &rec.id).unwrap().unwrap();
        assert_eq!(loaded.id, rec.id);
        assert_eq!(loaded.task_id, TaskId(42));
        assert_eq!(loaded.job_name, "v1-prod-api-10.0.0.1-1");
        assert!(loaded.status.is_none());
        assert!(!loaded.is_terminal());
    }

    #[test]
    fn test_apply_poll_result() {
        let mut rec = record("api", 7);
        let polled_at = Utc::now();
        rec.apply(&DeploymentResult {
            job_name: rec.job_name.clone(),
            task_id: rec.task_id,
            build_number: 3,
            status: DeploymentStatus::Error,
            result: "FAILURE".into(),
            console_output: "boom".into(),
            polled_at,
        });
        assert_eq!(rec.status, Some(DeploymentStatus::Error));
        assert_eq!(rec.result.as_deref(), Some("FAILURE"));
        assert_eq!(rec.updated_at, polled_at);
        assert!(rec.is_terminal());

        let json = rec.to_json();
        assert_eq!(json["status"], "error");
        assert_eq!(json["status_code"], 3);
        assert_eq!(json["task_id"], 7);
    }

    #[test]
    fn test_list_newest_first_and_prefix_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut older = record("api", 1);
        older.dispatched_at = Utc::now() - Duration::minutes(5);
        let newer = record("worker", 2);
        older.write_to_dir(dir.path()).unwrap();
        newer.write_to_dir(dir.path()).unwrap();
        std::fs::write(dir.path().join("garbage.json"), "{not json").unwrap();

        let records = list_records(dir.path()).unwrap();
        let services: Vec<_> = records.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(services, vec!["worker", "api"]);

        let found = find_record(dir.path(), &newer.id[..8]).unwrap().unwrap();
        assert_eq!(found.service, "worker");
        assert!(find_record(dir.path(), "zzzz").unwrap().is_none());
    }

    #[test]
    fn test_missing_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_records(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_errors_surface_as_deploy_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            DeploymentRecord::read_from_file(&bad),
            Err(DeployError::Json(_))
        ));
        assert!(matches!(
            DeploymentRecord::read_from_file(&dir.path().join("absent.json")),
            Err(DeployError::Io(_))
        ));

        record("api", 1).write_to_dir(dir.path()).unwrap();
        record("api", 2).write_to_dir(dir.path()).unwrap();
        assert!(matches!(
            find_record(dir.path(), ""),
            Err(DeployError::AmbiguousRecord { matches: 2, .. })
        ));
    }

    #[test]
    fn test_count_per_service_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        record("api", 1).write_to_dir(dir.path()).unwrap();
        record("api", 2).write_to_dir(dir.path()).unwrap();
        record("worker", 3).write_to_dir(dir.path()).unwrap();
        let mut other_env = record("api", 4);
        other_env.environment = "dev".into();
        other_env.write_to_dir(dir.path()).unwrap();

        assert_eq!(count_records(dir.path(), "api", "prod").unwrap(), 2);
        assert_eq!(count_records(dir.path(), "api", "dev").unwrap(), 1);
        assert_eq!(count_records(dir.path(), "web", "prod").unwrap(), 0);
    }
}
