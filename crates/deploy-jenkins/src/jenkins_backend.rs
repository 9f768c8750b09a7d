use deploy_core::backend::{Backend, Build, Job, Node, NodeSpec};
use deploy_core::config::BackendConfig;
use deploy_core::error::DeployError;
use deploy_core::task::TaskId;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const NODE_TREE: &str = "computer[displayName,description,numExecutors,offline]";

/// Jenkins REST backend: nodes, jobs and builds via the JSON API, job
/// definitions as config.xml. Authenticates with a user API token.
pub struct JenkinsBackend {
    client: Client,
    base_url: Url,
    user: String,
    token: String,
}

#[derive(Deserialize)]
struct ComputerSet {
    #[serde(default)]
    computer: Vec<Computer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Computer {
    display_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    num_executors: u32,
    #[serde(default)]
    offline: bool,
}

impl From<Computer> for Node {
    fn from(c: Computer) -> Self {
        Node {
            name: c.display_name,
            num_executors: c.num_executors,
            description: c.description.unwrap_or_default(),
            offline: c.offline,
        }
    }
}

#[derive(Deserialize)]
struct JobInfo {
    name: String,
}

#[derive(Deserialize)]
struct QueueItem {
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    executable: Option<Executable>,
}

#[derive(Deserialize)]
struct Executable {
    number: u64,
}

#[derive(Deserialize)]
struct BuildInfo {
    number: u64,
    #[serde(default)]
    building: bool,
    #[serde(default)]
    result: Option<String>,
}

impl JenkinsBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, DeployError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| DeployError::Config(format!("backend.url '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DeployError::Config(format!(
                "backend.url '{}' cannot be a base URL",
                config.url
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeployError::Backend(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            user: config.user.clone(),
            token: config.token.clone(),
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, DeployError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DeployError::Config(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        if self.user.is_empty() {
            request
        } else {
            request.basic_auth(&self.user, Some(&self.token))
        }
    }

    /// Send a request. `Ok(None)` on 404, error on any other non-success.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Option<Response>, DeployError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| DeployError::Backend(format!("{}: {}", what, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Jenkins {} failed: {} - {}", what, status, body.trim());
            return Err(DeployError::Backend(format!("{}: HTTP {}", what, status)));
        }
        Ok(Some(response))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<Option<T>, DeployError> {
        debug!("GET {}", url);
        match self.send(self.client.get(url), what).await? {
            Some(response) => response
                .json()
                .await
                .map(Some)
                .map_err(|e| DeployError::Backend(format!("{}: decoding response: {}", what, e))),
            None => Ok(None),
        }
    }
}

/// Path segment Jenkins uses for a node. The controller itself is exposed as
/// `(master)` rather than by its display name.
fn node_segment(name: &str) -> &str {
    if name == "master" {
        "(master)"
    } else {
        name
    }
}

/// Queue id from the `Location` header returned when a build is triggered,
/// e.g. `http://jenkins/queue/item/42/`.
fn parse_queue_id(location: &str) -> Option<TaskId> {
    let path = location.trim_end_matches('/');
    let (prefix, id) = path.rsplit_once('/')?;
    if !prefix.ends_with("/queue/item") {
        return None;
    }
    id.parse().ok().map(TaskId)
}

/// Form payload for `computer/doCreateItem`: a permanent agent launched
/// over SSH, kept online at all times.
fn create_node_payload(spec: &NodeSpec) -> serde_json::Value {
    serde_json::json!({
        "name": spec.name,
        "nodeDescription": spec.description,
        "numExecutors": spec.num_executors,
        "remoteFS": spec.remote_fs,
        "labelString": spec.name,
        "mode": "NORMAL",
        "type": "hudson.slaves.DumbSlave",
        "retentionStrategy": {
            "stapler-class": "hudson.slaves.RetentionStrategy$Always",
        },
        "nodeProperties": {
            "stapler-class-bag": "true",
        },
        "launcher": {
            "stapler-class": "hudson.plugins.sshslaves.SSHLauncher",
            "$class": "hudson.plugins.sshslaves.SSHLauncher",
            "host": spec.launcher.host,
            "port": spec.launcher.port,
            "credentialsId": spec.launcher.credentials_id,
            "jvmOptions": spec.launcher.jvm_options,
        },
    })
}

#[async_trait::async_trait]
impl Backend for JenkinsBackend {
    fn kind(&self) -> &str {
        "jenkins"
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, DeployError> {
        let mut url = self.endpoint(&["computer", "api", "json"])?;
        url.query_pairs_mut().append_pair("tree", NODE_TREE);
        let set: ComputerSet = self
            .get_json(url, "list nodes")
            .await?
            .ok_or_else(|| DeployError::Backend("list nodes: computer API not found".into()))?;
        Ok(set.computer.into_iter().map(Node::from).collect())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, DeployError> {
        let url = self.endpoint(&["computer", node_segment(name), "api", "json"])?;
        let computer: Option<Computer> = self.get_json(url, &format!("get node {}", name)).await?;
        Ok(computer.map(Node::from))
    }

    async fn create_node(&self, spec: &NodeSpec) -> Result<Node, DeployError> {
        let url = self.endpoint(&["computer", "doCreateItem"])?;
        let payload = create_node_payload(spec).to_string();
        let form = [
            ("name", spec.name.as_str()),
            ("type", "hudson.slaves.DumbSlave"),
            ("json", payload.as_str()),
        ];
        let what = format!("create node {}", spec.name);
        self.send(self.client.post(url).form(&form), &what)
            .await?
            .ok_or_else(|| DeployError::Backend(format!("{}: endpoint not found", what)))?;

        info!("Jenkins node {} created", spec.name);
        self.get_node(&spec.name)
            .await?
            .ok_or_else(|| DeployError::Backend(format!("{}: node missing after creation", what)))
    }

    async fn delete_node(&self, name: &str) -> Result<bool, DeployError> {
        let url = self.endpoint(&["computer", node_segment(name), "doDelete"])?;
        let deleted = self
            .send(self.client.post(url), &format!("delete node {}", name))
            .await?
            .is_some();
        if deleted {
            info!("Jenkins node {} deleted", name);
        }
        Ok(deleted)
    }

    async fn get_job(&self, name: &str) -> Result<Option<Job>, DeployError> {
        let mut url = self.endpoint(&["job", name, "api", "json"])?;
        url.query_pairs_mut().append_pair("tree", "name");
        let info: Option<JobInfo> = self.get_json(url, &format!("get job {}", name)).await?;
        Ok(info.map(|i| Job { name: i.name }))
    }

    async fn create_job(&self, name: &str, definition: &str) -> Result<Job, DeployError> {
        let mut url = self.endpoint(&["createItem"])?;
        url.query_pairs_mut().append_pair("name", name);
        debug!("POST {}", url);

        let response = self
            .authed(
                self.client
                    .post(url)
                    .header(header::CONTENT_TYPE, "application/xml")
                    .body(definition.to_string()),
            )
            .send()
            .await
            .map_err(|e| DeployError::JobCreate {
                job: name.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::JobCreate {
                job: name.to_string(),
                reason: format!("HTTP {}: {}", status, body.trim()),
            });
        }

        info!("Jenkins job {} created", name);
        Ok(Job {
            name: name.to_string(),
        })
    }

    async fn invoke_job(
        &self,
        job: &Job,
        params: &BTreeMap<String, String>,
    ) -> Result<TaskId, DeployError> {
        let url = self.endpoint(&["job", &job.name, "buildWithParameters"])?;
        let what = format!("trigger {}", job.name);
        let response = self
            .send(self.client.post(url).form(params), &what)
            .await?
            .ok_or_else(|| DeployError::JobNotFound(job.name.clone()))?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DeployError::Backend(format!("{}: no Location header", what)))?;
        parse_queue_id(location)
            .ok_or_else(|| DeployError::Backend(format!("{}: unexpected Location {}", what, location)))
    }

    async fn get_build_by_queue_id(
        &self,
        job: &Job,
        task_id: TaskId,
    ) -> Result<Option<Build>, DeployError> {
        let id = task_id.to_string();
        let url = self.endpoint(&["queue", "item", &id, "api", "json"])?;
        let item: Option<QueueItem> = self.get_json(url, &format!("queue item {}", id)).await?;

        let number = match item {
            Some(QueueItem {
                executable: Some(exe),
                ..
            }) => exe.number,
            Some(QueueItem { cancelled: true, .. }) => {
                return Err(DeployError::Backend(format!(
                    "queue item {} of {} was cancelled",
                    id, job.name
                )))
            }
            // Still waiting for an executor, or already purged from the queue.
            _ => return Ok(None),
        };

        let number_segment = number.to_string();
        let url = self.endpoint(&["job", &job.name, &number_segment, "api", "json"])?;
        let info: Option<BuildInfo> = self
            .get_json(url, &format!("build {} #{}", job.name, number))
            .await?;
        Ok(info.map(|b| Build {
            number: b.number,
            building: b.building,
            result: b.result,
        }))
    }

    async fn console_output(&self, job: &Job, build: &Build) -> Result<String, DeployError> {
        let number = build.number.to_string();
        let url = self.endpoint(&["job", &job.name, &number, "consoleText"])?;
        let what = format!("console {} #{}", job.name, build.number);
        let response = self
            .send(self.client.get(url), &what)
            .await?
            .ok_or_else(|| DeployError::Backend(format!("{}: not found", what)))?;
        response
            .text()
            .await
            .map_err(|e| DeployError::Backend(format!("{}: {}", what, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_core::backend::SshLauncher;

    fn backend(url: &str) -> JenkinsBackend {
        JenkinsBackend::new(&BackendConfig {
            url: url.to_string(),
            user: "admin".into(),
            token: "t".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_queue_id_from_location() {
        assert_eq!(parse_queue_id("http://jenkins:8080/queue/item/42/"), Some(TaskId(42)));
        assert_eq!(parse_queue_id("/jenkins/queue/item/7"), Some(TaskId(7)));
        assert_eq!(parse_queue_id("http://jenkins:8080/job/x/42/"), None);
        assert_eq!(parse_queue_id("http://jenkins:8080/queue/item/abc/"), None);
    }

    #[test]
    fn test_master_node_segment() {
        assert_eq!(node_segment("master"), "(master)");
        assert_eq!(node_segment("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn test_endpoint_keeps_prefix_and_encodes() {
        let b = backend("http://host:8080/jenkins/");
        let url = b.endpoint(&["job", "v1-prod-api-10.0.0.1-0", "api", "json"]).unwrap();
        assert_eq!(url.as_str(), "http://host:8080/jenkins/job/v1-prod-api-10.0.0.1-0/api/json");

        let b = backend("http://host:8080");
        let url = b.endpoint(&["computer", node_segment("master"), "api", "json"]).unwrap();
        assert_eq!(url.path(), "/computer/(master)/api/json");

        let url = b.endpoint(&["job", "a b"]).unwrap();
        assert_eq!(url.path(), "/job/a%20b");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = JenkinsBackend::new(&BackendConfig {
            url: "not a url".into(),
            user: String::new(),
            token: String::new(),
            timeout_secs: 5,
        })
        .err()
        .unwrap();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_create_node_payload() {
        let spec = NodeSpec {
            name: "10.0.0.9".into(),
            num_executors: 2,
            description: "prod:(10.0.0.9)web".into(),
            remote_fs: "/var/lib/jenkins".into(),
            launcher: SshLauncher {
                host: "10.0.0.9".into(),
                port: "22".into(),
                credentials_id: "ssh-key".into(),
                jvm_options: "-Xms16m -Xmx64m".into(),
            },
        };
        let payload = create_node_payload(&spec);
        assert_eq!(payload["numExecutors"], 2);
        assert_eq!(payload["nodeDescription"], "prod:(10.0.0.9)web");
        assert_eq!(payload["remoteFS"], "/var/lib/jenkins");
        assert_eq!(payload["launcher"]["$class"], "hudson.plugins.sshslaves.SSHLauncher");
        assert_eq!(payload["launcher"]["host"], "10.0.0.9");
        assert_eq!(payload["launcher"]["credentialsId"], "ssh-key");
        assert_eq!(payload["launcher"]["jvmOptions"], "-Xms16m -Xmx64m");
    }

    #[test]
    fn test_computer_json_into_node() {
        let set: ComputerSet = serde_json::from_str(
            r#"{"computer":[
                {"displayName":"master","description":null,"numExecutors":2,"offline":false},
                {"displayName":"10.0.0.1","description":"prod:(10.0.0.1)","numExecutors":1,"offline":true}
            ]}"#,
        )
        .unwrap();
        let nodes: Vec<Node> = set.computer.into_iter().map(Node::from).collect();
        assert_eq!(nodes[0].name, "master");
        assert_eq!(nodes[0].description, "");
        assert_eq!(nodes[1].description, "prod:(10.0.0.1)");
        assert!(nodes[1].offline);
    }
}
