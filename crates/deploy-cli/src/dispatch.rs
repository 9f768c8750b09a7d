use deploy_core::backend::Backend;
use deploy_core::config::Config;
use deploy_core::error::DeployError;
use deploy_core::Deployer;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loaded config plus the engine built from it.
pub struct Context {
    pub config: Config,
    pub deployer: Deployer,
    /// Directory custom script files resolve against.
    pub base_dir: PathBuf,
}

impl Context {
    pub fn new(config: Config, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let backend = create_backend(&config)?;
        let path = resolve_path(config_path);
        let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self::with_backend(config, backend, base_dir)
    }

    pub fn with_backend(
        config: Config,
        backend: Arc<dyn Backend>,
        base_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let deployer = Deployer::from_config(backend, &config, &base_dir)?;
        Ok(Self {
            config,
            deployer,
            base_dir,
        })
    }
}

pub fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path)
}

pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = resolve_path(config_path);
    if !path.exists() {
        anyhow::bail!(
            "No config at {}. Run `deployctl config --init` to create one.",
            path.display()
        );
    }
    Config::load_from(&path)
}

pub fn load(config_path: Option<&Path>) -> anyhow::Result<Context> {
    Context::new(load_config(config_path)?, config_path)
}

/// Create the backend the config points at.
pub fn create_backend(config: &Config) -> Result<Arc<dyn Backend>, DeployError> {
    Ok(Arc::new(deploy_jenkins::JenkinsBackend::new(&config.backend)?))
}
