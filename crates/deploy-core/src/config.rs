use crate::artifact::ArtifactStore;
use crate::script::{ParamDef, ScriptTemplate};
use crate::service::{DefaultService, DeploySpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
/// Loaded from ~/.config/deployctl/config.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_primary_node")]
    pub primary_node: String,
    #[serde(default)]
    pub node_defaults: NodeConfig,
    #[serde(default)]
    pub artifact_store: ArtifactStore,
    #[serde(default)]
    pub job_visibility: JobVisibility,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Settings applied to every node the registry creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    #[serde(default = "default_num_executors")]
    pub num_executors: u32,
    #[serde(default = "default_jvm_options")]
    pub jvm_options: String,
    #[serde(default = "default_remote_fs")]
    pub remote_fs: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: String,
    #[serde(default)]
    pub credentials_id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            num_executors: default_num_executors(),
            jvm_options: default_jvm_options(),
            remote_fs: default_remote_fs(),
            ssh_port: default_ssh_port(),
            credentials_id: String::new(),
        }
    }
}

/// Per-call overrides for node creation. Unset fields fall back to the
/// registry's `NodeConfig`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOptions {
    pub num_executors: Option<u32>,
    pub jvm_options: Option<String>,
    pub remote_fs: Option<String>,
    pub ssh_port: Option<String>,
    pub credentials_id: Option<String>,
}

impl NodeOptions {
    pub fn merge_over(&self, defaults: &NodeConfig) -> NodeConfig {
        NodeConfig {
            num_executors: self.num_executors.unwrap_or(defaults.num_executors),
            jvm_options: self
                .jvm_options
                .clone()
                .unwrap_or_else(|| defaults.jvm_options.clone()),
            remote_fs: self
                .remote_fs
                .clone()
                .unwrap_or_else(|| defaults.remote_fs.clone()),
            ssh_port: self
                .ssh_port
                .clone()
                .unwrap_or_else(|| defaults.ssh_port.clone()),
            credentials_id: self
                .credentials_id
                .clone()
                .unwrap_or_else(|| defaults.credentials_id.clone()),
        }
    }
}

/// How long to wait for a freshly created job to become visible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobVisibility {
    #[serde(default = "default_visibility_attempts")]
    pub attempts: u32,
    #[serde(default = "default_visibility_interval_ms")]
    pub interval_ms: u64,
}

impl JobVisibility {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for JobVisibility {
    fn default() -> Self {
        Self {
            attempts: default_visibility_attempts(),
            interval_ms: default_visibility_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub pkg_url: String,
    pub target_path: String,
    pub run_cmd: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Extra invocation parameters. Names must be declared by `script.params`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub script: Option<ScriptConfig>,
}

/// Custom deploy script bound to one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub version: u32,
    pub body_file: PathBuf,
    /// Declared in addition to the default deploy parameters.
    #[serde(default)]
    pub params: Vec<ParamDef>,
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_primary_node() -> String {
    "master".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_num_executors() -> u32 {
    1
}

fn default_jvm_options() -> String {
    "-Xms16m -Xmx64m".to_string()
}

fn default_remote_fs() -> String {
    "/var/lib/jenkins".to_string()
}

fn default_ssh_port() -> String {
    "22".to_string()
}

fn default_visibility_attempts() -> u32 {
    3
}

fn default_visibility_interval_ms() -> u64 {
    1000
}

impl Config {
    /// Load config from the default path (~/.config/deployctl/config.yaml).
    pub fn load_default() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load and validate config from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("deployctl")
            .join("config.yaml")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend.url.trim().is_empty() {
            anyhow::bail!("backend.url must not be empty");
        }
        if self.environment.trim().is_empty() {
            anyhow::bail!("environment must not be empty");
        }
        if self.node_defaults.num_executors == 0 {
            anyhow::bail!("node_defaults.num_executors must be at least 1");
        }
        if self.job_visibility.attempts == 0 {
            anyhow::bail!("job_visibility.attempts must be at least 1");
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                anyhow::bail!("service name must not be empty");
            }
            if !seen.insert(service.name.as_str()) {
                anyhow::bail!("duplicate service name: {}", service.name);
            }
        }
        Ok(())
    }

    /// Find a service config by name.
    pub fn find_service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

impl ServiceConfig {
    /// Build the service this entry describes. Relative `script.body_file`
    /// paths resolve against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> anyhow::Result<DefaultService> {
        let spec = DeploySpec {
            pkg_url: self.pkg_url.clone(),
            target_path: self.target_path.clone(),
            run_cmd: self.run_cmd.clone(),
            env: self.env.clone(),
        };

        let mut service = match &self.script {
            None => DefaultService::new(&self.name, spec),
            Some(script) => {
                let path = if script.body_file.is_absolute() {
                    script.body_file.clone()
                } else {
                    base_dir.join(&script.body_file)
                };
                let body = std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("reading script {}: {}", path.display(), e))?;
                let mut params = ScriptTemplate::default_deploy_params();
                params.extend(script.params.iter().cloned());
                let template = ScriptTemplate::new(params, body, script.version);
                DefaultService::with_script(&self.name, spec, template)
            }
        };

        for (key, value) in &self.params {
            service = service.with_parameter(key, value);
        }
        Ok(service)
    }
}
