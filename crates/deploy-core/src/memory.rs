//! In-process [`Backend`] for tests. Enabled by the `test-util` feature.
//!
//! Keeps nodes, jobs and builds in memory and exposes knobs to simulate the
//! failure modes of a real server: an unreachable node listing, rejected job
//! creation, jobs that take a few lookups to become visible, and builds that
//! stay queued until explicitly started.

use crate::backend::{Backend, Build, Job, Node, NodeSpec};
use crate::error::DeployError;
use crate::task::TaskId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// One `invoke_job` call as the backend saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub job_name: String,
    pub task_id: TaskId,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct StoredJob {
    definition: String,
    hidden_lookups: u32,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<Node>,
    node_specs: Vec<NodeSpec>,
    jobs: HashMap<String, StoredJob>,
    builds: HashMap<(String, TaskId), (Build, String)>,
    invocations: Vec<Invocation>,
    next_queue_id: u64,
    next_build_number: HashMap<String, u64>,

    fail_list_nodes: bool,
    fail_create_job: bool,
    fail_invoke: bool,
    visibility_lag: u32,

    get_job_calls: usize,
    create_job_calls: usize,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, name: &str, num_executors: u32, description: &str) -> Self {
        self.add_node(Node {
            name: name.to_string(),
            num_executors,
            description: description.to_string(),
            offline: false,
        });
        self
    }

    pub fn add_node(&self, node: Node) {
        self.state.lock().nodes.push(node);
    }

    /// Make `list_nodes` fail until switched back.
    pub fn set_fail_list_nodes(&self, fail: bool) {
        self.state.lock().fail_list_nodes = fail;
    }

    pub fn set_fail_create_job(&self, fail: bool) {
        self.state.lock().fail_create_job = fail;
    }

    pub fn set_fail_invoke(&self, fail: bool) {
        self.state.lock().fail_invoke = fail;
    }

    /// Number of `get_job` lookups a newly created job stays hidden for.
    pub fn set_visibility_lag(&self, lookups: u32) {
        self.state.lock().visibility_lag = lookups;
    }

    /// Create a job directly, bypassing the create-call counter.
    pub fn insert_job(&self, name: &str, definition: &str) {
        self.state.lock().jobs.insert(
            name.to_string(),
            StoredJob {
                definition: definition.to_string(),
                hidden_lookups: 0,
            },
        );
    }

    pub fn job_definition(&self, name: &str) -> Option<String> {
        self.state.lock().jobs.get(name).map(|j| j.definition.clone())
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn node_specs(&self) -> Vec<NodeSpec> {
        self.state.lock().node_specs.clone()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    pub fn get_job_calls(&self) -> usize {
        self.state.lock().get_job_calls
    }

    pub fn create_job_calls(&self) -> usize {
        self.state.lock().create_job_calls
    }

    /// Turn a queued task into a running build.
    pub fn start_build(&self, job_name: &str, task_id: TaskId) -> u64 {
        let mut state = self.state.lock();
        let counter = state
            .next_build_number
            .entry(job_name.to_string())
            .or_insert(0);
        *counter += 1;
        let number = *counter;
        state.builds.insert(
            (job_name.to_string(), task_id),
            (
                Build {
                    number,
                    building: true,
                    result: None,
                },
                String::new(),
            ),
        );
        number
    }

    /// Finish a build with the given backend result string ("SUCCESS",
    /// "FAILURE", ...). Starts it first if needed.
    pub fn finish_build(&self, job_name: &str, task_id: TaskId, result: &str, console: &str) {
        let key = (job_name.to_string(), task_id);
        if !self.state.lock().builds.contains_key(&key) {
            self.start_build(job_name, task_id);
        }
        if let Some((build, output)) = self.state.lock().builds.get_mut(&key) {
            build.building = false;
            build.result = Some(result.to_string());
            *output = console.to_string();
        }
    }

    pub fn append_console(&self, job_name: &str, task_id: TaskId, text: &str) {
        if let Some((_, output)) = self
            .state
            .lock()
            .builds
            .get_mut(&(job_name.to_string(), task_id))
        {
            output.push_str(text);
        }
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, DeployError> {
        let state = self.state.lock();
        if state.fail_list_nodes {
            return Err(DeployError::Backend("node listing unavailable".into()));
        }
        Ok(state.nodes.clone())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, DeployError> {
        Ok(self
            .state
            .lock()
            .nodes
            .iter()
            .find(|n| n.name == name)
            .cloned())
    }

    async fn create_node(&self, spec: &NodeSpec) -> Result<Node, DeployError> {
        let mut state = self.state.lock();
        if state.nodes.iter().any(|n| n.name == spec.name) {
            return Err(DeployError::Backend(format!(
                "node {} already exists",
                spec.name
            )));
        }
        let node = Node {
            name: spec.name.clone(),
            num_executors: spec.num_executors,
            description: spec.description.clone(),
            offline: false,
        };
        state.nodes.push(node.clone());
        state.node_specs.push(spec.clone());
        Ok(node)
    }

    async fn delete_node(&self, name: &str) -> Result<bool, DeployError> {
        let mut state = self.state.lock();
        let before = state.nodes.len();
        state.nodes.retain(|n| n.name != name);
        Ok(state.nodes.len() < before)
    }

    async fn get_job(&self, name: &str) -> Result<Option<Job>, DeployError> {
        let mut state = self.state.lock();
        state.get_job_calls += 1;
        match state.jobs.get_mut(name) {
            Some(stored) if stored.hidden_lookups > 0 => {
                stored.hidden_lookups -= 1;
                Ok(None)
            }
            Some(_) => Ok(Some(Job {
                name: name.to_string(),
            })),
            None => Ok(None),
        }
    }

    async fn create_job(&self, name: &str, definition: &str) -> Result<Job, DeployError> {
        let mut state = self.state.lock();
        state.create_job_calls += 1;
        if state.fail_create_job {
            return Err(DeployError::Backend("job creation rejected".into()));
        }
        if state.jobs.contains_key(name) {
            return Err(DeployError::JobCreate {
                job: name.to_string(),
                reason: "a job with this name already exists".into(),
            });
        }
        let hidden_lookups = state.visibility_lag;
        state.jobs.insert(
            name.to_string(),
            StoredJob {
                definition: definition.to_string(),
                hidden_lookups,
            },
        );
        Ok(Job {
            name: name.to_string(),
        })
    }

    async fn invoke_job(
        &self,
        job: &Job,
        params: &BTreeMap<String, String>,
    ) -> Result<TaskId, DeployError> {
        let mut state = self.state.lock();
        if state.fail_invoke {
            return Err(DeployError::Backend("build trigger rejected".into()));
        }
        if !state.jobs.contains_key(&job.name) {
            return Err(DeployError::JobNotFound(job.name.clone()));
        }
        state.next_queue_id += 1;
        let task_id = TaskId(state.next_queue_id);
        state.invocations.push(Invocation {
            job_name: job.name.clone(),
            task_id,
            params: params.clone(),
        });
        Ok(task_id)
    }

    async fn get_build_by_queue_id(
        &self,
        job: &Job,
        task_id: TaskId,
    ) -> Result<Option<Build>, DeployError> {
        Ok(self
            .state
            .lock()
            .builds
            .get(&(job.name.clone(), task_id))
            .map(|(build, _)| build.clone()))
    }

    async fn console_output(&self, job: &Job, build: &Build) -> Result<String, DeployError> {
        let state = self.state.lock();
        state
            .builds
            .iter()
            .find(|((name, _), (b, _))| *name == job.name && b.number == build.number)
            .map(|(_, (_, output))| output.clone())
            .ok_or_else(|| DeployError::Backend(format!("no console for {} #{}", job.name, build.number)))
    }
}
