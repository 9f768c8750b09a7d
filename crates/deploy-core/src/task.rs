use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue id the backend assigns when a job is invoked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// What a successful dispatch hands back: everything needed to poll later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub job_name: String,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Running,
    Finish,
    Error,
}

impl DeploymentStatus {
    /// `(true, _) -> Running`, `(false, true) -> Finish`, `(false, false) -> Error`.
    pub fn from_build(is_running: bool, is_good: bool) -> Self {
        match (is_running, is_good) {
            (true, _) => DeploymentStatus::Running,
            (false, true) => DeploymentStatus::Finish,
            (false, false) => DeploymentStatus::Error,
        }
    }

    /// Numeric code used by older callers.
    pub fn code(&self) -> i32 {
        match self {
            DeploymentStatus::Running => 1,
            DeploymentStatus::Finish => 2,
            DeploymentStatus::Error => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentStatus::Running)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStatus::Running => write!(f, "running"),
            DeploymentStatus::Finish => write!(f, "finish"),
            DeploymentStatus::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of a build, recomputed on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub job_name: String,
    pub task_id: TaskId,
    pub build_number: u64,
    pub status: DeploymentStatus,
    pub result: String,
    pub console_output: String,
    pub polled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_truth_table() {
        assert_eq!(DeploymentStatus::from_build(true, true), DeploymentStatus::Running);
        assert_eq!(DeploymentStatus::from_build(true, false), DeploymentStatus::Running);
        assert_eq!(DeploymentStatus::from_build(false, true), DeploymentStatus::Finish);
        assert_eq!(DeploymentStatus::from_build(false, false), DeploymentStatus::Error);
    }

    #[test]
    fn status_codes_and_terminality() {
        assert_eq!(DeploymentStatus::Running.code(), 1);
        assert_eq!(DeploymentStatus::Finish.code(), 2);
        assert_eq!(DeploymentStatus::Error.code(), 3);
        assert!(!DeploymentStatus::Running.is_terminal());
        assert!(DeploymentStatus::Finish.is_terminal());
        assert!(DeploymentStatus::Error.is_terminal());
        assert_eq!(DeploymentStatus::Finish.to_string(), "finish");
    }
}
