//! Local ledger of dispatched deployments.
//!
//! The engine itself keeps nothing once `deploy` returns; front ends that need
//! to poll later store one JSON record per deployment here.

use crate::error::DeployError;
use crate::task::{Deployment, DeploymentResult, DeploymentStatus, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub service: String,
    pub node: String,
    pub environment: String,
    pub job_name: String,
    pub task_id: TaskId,
    pub dispatched_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<DeploymentStatus>,
    #[serde(default)]
    pub result: Option<String>,
}

impl DeploymentRecord {
    pub fn new(service: &str, node: &str, environment: &str, deployment: &Deployment) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            service: service.to_string(),
            node: node.to_string(),
            environment: environment.to_string(),
            job_name: deployment.job_name.clone(),
            task_id: deployment.task_id,
            dispatched_at: now,
            updated_at: now,
            status: None,
            result: None,
        }
    }

    /// Fold a poll result into the record.
    pub fn apply(&mut self, result: &DeploymentResult) {
        self.status = Some(result.status);
        self.result = Some(result.result.clone()).filter(|r| !r.is_empty());
        self.updated_at = result.polled_at;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }

    /// Write the record to `<id>.json` in `dir`, creating `dir` if needed.
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), DeployError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.id));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from_file(path: &Path) -> Result<Self, DeployError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Structured JSON for scripts and dashboards.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "service": self.service,
            "node": self.node,
            "environment": self.environment,
            "job_name": self.job_name,
            "task_id": self.task_id.0,
            "status": self.status,
            "status_code": self.status.map(|s| s.code()),
            "result": self.result,
            "dispatched_at": self.dispatched_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

/// Default ledger directory.
pub fn records_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("deployctl")
        .join("deployments")
}

/// All readable records in `dir`, newest first. Unreadable files are skipped.
pub fn list_records(dir: &Path) -> Result<Vec<DeploymentRecord>, DeployError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Ok(record) = DeploymentRecord::read_from_file(&path) {
                records.push(record);
            }
        }
    }
    records.sort_by(|a, b| b.dispatched_at.cmp(&a.dispatched_at));
    Ok(records)
}

/// Number of recorded deployments of `service` in `environment`. Used to
/// carry the deploy counter across processes.
pub fn count_records(dir: &Path, service: &str, environment: &str) -> Result<u32, DeployError> {
    let count = list_records(dir)?
        .iter()
        .filter(|r| r.service == service && r.environment == environment)
        .count();
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Look a record up by full id or unique id prefix.
pub fn find_record(dir: &Path, id: &str) -> Result<Option<DeploymentRecord>, DeployError> {
    let exact = dir.join(format!("{}.json", id));
    if exact.exists() {
        return DeploymentRecord::read_from_file(&exact).map(Some);
    }

    let mut matches: Vec<_> = list_records(dir)?
        .into_iter()
        .filter(|r| r.id.starts_with(id))
        .collect();
    match matches.len() {
        1 => Ok(matches.pop()),
        0 => Ok(None),
        n => Err(DeployError::AmbiguousRecord {
            prefix: id.to_string(),
            matches: n,
        }),
    }
}
