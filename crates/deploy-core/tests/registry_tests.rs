#[cfg(test)]
mod tests {
    use deploy_core::config::{NodeConfig, NodeOptions};
    use deploy_core::memory::MemoryBackend;
    use deploy_core::node::NodeRegistry;
    use deploy_core::DeployError;
    use std::sync::Arc;

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(
            MemoryBackend::new()
                .with_node("master", 2, "the built-in node")
                .with_node("10.0.0.1", 4, "prod:(10.0.0.1)api")
                .with_node("10.0.0.2", 2, "prod:(10.0.0.2)worker")
                .with_node("10.1.0.1", 4, "dev:(10.1.0.1)sandbox"),
        )
    }

    fn registry(backend: &Arc<MemoryBackend>) -> NodeRegistry {
        NodeRegistry::new(backend.clone(), "prod", "master", NodeConfig::default())
    }

    #[tokio::test]
    async fn test_refresh_keeps_environment_and_primary_nodes() {
        let backend = backend();
        let registry = registry(&backend);

        assert_eq!(registry.refresh().await.unwrap(), 3);
        let names: Vec<String> = registry.nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["10.0.0.1", "10.0.0.2", "master"]);
        assert!(registry.resolve("10.1.0.1").is_none());
    }

    #[tokio::test]
    async fn test_resolve_is_cache_only() {
        let backend = backend();
        let registry = registry(&backend);
        assert!(registry.resolve("10.0.0.1").is_none());

        registry.refresh().await.unwrap();
        let node = registry.resolve("10.0.0.1").unwrap();
        assert_eq!(node.num_executors, 4);

        // Backend changes are invisible until the next refresh.
        backend.add_node(deploy_core::Node {
            name: "10.0.0.3".into(),
            num_executors: 1,
            description: "prod:(10.0.0.3)".into(),
            offline: false,
        });
        assert!(registry.resolve("10.0.0.3").is_none());
        registry.refresh().await.unwrap();
        assert!(registry.resolve("10.0.0.3").is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_cache() {
        let backend = backend();
        let registry = registry(&backend);
        registry.refresh().await.unwrap();

        backend.set_fail_list_nodes(true);
        let err = registry.refresh().await.unwrap_err();
        assert!(matches!(err, DeployError::Backend(_)));
        assert_eq!(registry.nodes().len(), 3);
        assert!(registry.resolve("10.0.0.2").is_some());
    }

    #[tokio::test]
    async fn test_create_merges_options_over_defaults() {
        let backend = backend();
        let defaults = NodeConfig {
            credentials_id: "defssh".into(),
            ..NodeConfig::default()
        };
        let registry = NodeRegistry::new(backend.clone(), "prod", "master", defaults);

        let options = NodeOptions {
            num_executors: Some(3),
            ssh_port: Some("2222".into()),
            ..NodeOptions::default()
        };
        let node = registry.create("172.17.0.3", "edge", &options).await.unwrap();
        assert_eq!(node.num_executors, 3);

        let spec = backend.node_specs().pop().unwrap();
        assert_eq!(spec.name, "172.17.0.3");
        assert_eq!(spec.description, "prod:(172.17.0.3)edge");
        assert_eq!(spec.remote_fs, "/var/lib/jenkins");
        assert_eq!(spec.launcher.host, "172.17.0.3");
        assert_eq!(spec.launcher.port, "2222");
        assert_eq!(spec.launcher.credentials_id, "defssh");
        assert_eq!(spec.launcher.jvm_options, "-Xms16m -Xmx64m");

        // Creation refreshes the cache.
        assert_eq!(registry.resolve("172.17.0.3").unwrap().num_executors, 3);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_cache_untouched() {
        let backend = backend();
        let registry = registry(&backend);
        registry.refresh().await.unwrap();

        let err = registry
            .create("10.0.0.1", "again", &NodeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Backend(_)));
        assert_eq!(registry.nodes().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_removes_node_after_refresh() {
        let backend = backend();
        let registry = registry(&backend);
        registry.refresh().await.unwrap();

        assert!(registry.delete("10.0.0.2").await.unwrap());
        assert!(registry.resolve("10.0.0.2").is_none());
        assert_eq!(registry.nodes().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_unknown_node() {
        let backend = backend();
        let registry = registry(&backend);
        let err = registry.delete("10.9.9.9").await.unwrap_err();
        assert!(matches!(err, DeployError::NodeNotFound(name) if name == "10.9.9.9"));
    }
}
