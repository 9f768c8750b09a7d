use crate::dispatch;
use deploy_core::Config;
use std::path::Path;

const SAMPLE_CONFIG: &str = r#"# deployctl configuration

backend:
  url: http://127.0.0.1:8080/
  user: admin
  token: your-api-token
  timeout_secs: 30

# Nodes whose description starts with this environment are in scope.
environment: dev
primary_node: master

node_defaults:
  num_executors: 1
  jvm_options: -Xms16m -Xmx64m
  remote_fs: /var/lib/jenkins
  ssh_port: "22"
  credentials_id: deploy-ssh-key

artifact_store:
  access_key: AK
  secret_key: SK
  endpoint: http://127.0.0.1:9000
  bucket: releases
  region: us-east-1
  fetcher_url: http://127.0.0.1:9000/tools/s3get.tgz

job_visibility:
  attempts: 3
  interval_ms: 1000

services:
  - name: api
    pkg_url: api/api-1.0.0.tgz
    target_path: /opt/api
    run_cmd: ./restart.sh
    env:
      LOG_LEVEL: info
"#;

pub async fn run(config_path: Option<&Path>, path: bool, init: bool) -> anyhow::Result<()> {
    let config_path = dispatch::resolve_path(config_path);

    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config already exists at: {}", config_path.display());
            println!("Remove it first if you want to reinitialize.");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, SAMPLE_CONFIG)?;
        println!("Sample config written to: {}", config_path.display());
        return Ok(());
    }

    println!("Config path: {}", config_path.display());
    if config_path.exists() {
        let config = Config::load_from(&config_path)?;
        println!("Backend:     {}", config.backend.url);
        println!("Environment: {}", config.environment);
        println!("Services:    {}", config.services.len());
        for s in &config.services {
            println!("  - {} ({})", s.name, s.target_path);
        }
    } else {
        println!("Status:      not found");
        println!("Run `deployctl config --init` to create one.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_is_valid() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.environment, "dev");
        assert_eq!(config.services[0].name, "api");
    }
}
