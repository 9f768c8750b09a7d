pub mod artifact;
pub mod backend;
pub mod config;
pub mod deployer;
pub mod dispatch;
pub mod error;
pub mod job;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod node;
pub mod poll;
pub mod record;
pub mod script;
pub mod service;
pub mod task;

pub use backend::{Backend, Build, Job, Node, NodeSpec};
pub use config::Config;
pub use deployer::{Deployer, DeployerSettings};
pub use error::{DeployError, DeployFailure};
pub use script::ScriptTemplate;
pub use service::{DefaultService, DeploySpec, Service};
pub use task::{Deployment, DeploymentResult, DeploymentStatus, TaskId};
