use crate::artifact::env_blob;
use crate::script::ScriptTemplate;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// A deployable unit as seen by the engine.
///
/// `parameters()` must only use names the bound script declares. Implementors
/// may compute parameters at dispatch time instead of storing them.
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Invocation parameters for the next deployment.
    fn parameters(&self) -> BTreeMap<String, String>;

    fn script(&self) -> &ScriptTemplate;

    /// Atomically bump the deployment counter and return the new value.
    fn increment_deploy_counter(&self) -> u32;
}

/// Inputs of the stock deploy script.
#[derive(Debug, Clone, Default)]
pub struct DeploySpec {
    /// Artifact store key of the tgz package.
    pub pkg_url: String,
    pub target_path: String,
    pub run_cmd: String,
    /// Passed to `RUN_CMD` through the environment. Put per-environment
    /// settings (db credentials and the like) here, not in the package.
    pub env: BTreeMap<String, String>,
}

pub const PARAM_PKG_URL: &str = "PKG_URL";
pub const PARAM_TARGET_PATH: &str = "TARGET_PATH";
pub const PARAM_RUN_CMD: &str = "RUN_CMD";
pub const PARAM_ENV_VAR: &str = "ENV_VAR";

/// Service with a stored parameter map. Parameters can be edited in place
/// between deployments, e.g. to roll out a new package version.
#[derive(Debug)]
pub struct DefaultService {
    name: String,
    params: RwLock<BTreeMap<String, String>>,
    script: ScriptTemplate,
    deploy_counter: AtomicU32,
}

impl DefaultService {
    pub fn new(name: impl Into<String>, spec: DeploySpec) -> Self {
        Self::with_script(name, spec, ScriptTemplate::default_deploy())
    }

    pub fn with_script(name: impl Into<String>, spec: DeploySpec, script: ScriptTemplate) -> Self {
        let params = BTreeMap::from([
            (PARAM_PKG_URL.to_string(), spec.pkg_url),
            (PARAM_TARGET_PATH.to_string(), spec.target_path),
            (PARAM_RUN_CMD.to_string(), spec.run_cmd),
            (PARAM_ENV_VAR.to_string(), env_blob(&spec.env)),
        ]);

        Self {
            name: name.into(),
            params: RwLock::new(params),
            script,
            deploy_counter: AtomicU32::new(0),
        }
    }

    /// Start the deploy counter at `count`, e.g. the number of deployments a
    /// previous process already made, so slot rotation carries on from there.
    pub fn with_counter(self, count: u32) -> Self {
        self.deploy_counter.store(count, Ordering::SeqCst);
        self
    }

    /// Add or replace one parameter while building the service.
    pub fn with_parameter(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.write().insert(key.into(), value.into());
        self
    }

    pub fn set_parameter(&self, key: impl Into<String>, value: impl Into<String>) {
        self.params.write().insert(key.into(), value.into());
    }

    pub fn update_package_url(&self, pkg_url: impl Into<String>) {
        self.set_parameter(PARAM_PKG_URL, pkg_url);
    }

    /// Current counter value without bumping it.
    pub fn deploy_count(&self) -> u32 {
        self.deploy_counter.load(Ordering::SeqCst)
    }
}

impl Service for DefaultService {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        self.params.read().clone()
    }

    fn script(&self) -> &ScriptTemplate {
        &self.script
    }

    fn increment_deploy_counter(&self) -> u32 {
        self.deploy_counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }
}
