use crate::dispatch::Context;
use chrono::{Duration as ChronoDuration, Utc};
use deploy_core::error::DeployError;
use deploy_core::record::{find_record, records_dir, DeploymentRecord};
use deploy_core::{DeploymentResult, TaskId};
use std::path::Path;
use std::time::Duration;

/// Jenkins forgets queue items a few minutes after they leave the queue.
/// Past this age a missing build will never show up through the queue id.
const QUEUE_RETENTION_MINS: i64 = 5;

/// Polls to wait for a build when there is no record to age out by.
const MAX_PENDING_POLLS: u32 = 60;

pub enum Target {
    Record(String),
    Job(String, TaskId),
}

/// What one `status` invocation ended with.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Read from a record that had already finished; the backend was not asked.
    Stored,
    /// Backend reported a build (running or finished).
    Polled,
    /// No build for the task yet.
    Queued,
    /// No build and the queue item is past retention, or `--watch` gave up.
    Lost,
}

pub async fn run(ctx: &Context, target: Target, json: bool, watch: Option<u64>) -> anyhow::Result<()> {
    run_in(ctx, &records_dir(), target, json, watch).await?;
    Ok(())
}

pub async fn run_in(
    ctx: &Context,
    dir: &Path,
    target: Target,
    json: bool,
    watch: Option<u64>,
) -> anyhow::Result<Outcome> {
    let mut record = match &target {
        Target::Record(id) => Some(
            find_record(dir, id)?
                .ok_or_else(|| anyhow::anyhow!("No deployment record matching {}", id))?,
        ),
        Target::Job(..) => None,
    };
    let (job_name, task_id) = match (&target, &record) {
        (Target::Job(job, task), _) => (job.clone(), *task),
        (_, Some(r)) => (r.job_name.clone(), r.task_id),
        (Target::Record(id), None) => anyhow::bail!("No deployment record matching {}", id),
    };

    if let Some(r) = record.as_ref().filter(|r| r.is_terminal()) {
        if json {
            print_json(&job_name, task_id, Some(r), None)?;
        } else {
            print_status(&job_name, task_id, Some(r), None);
        }
        return Ok(Outcome::Stored);
    }

    let mut pending_polls = 0;
    loop {
        let result = match ctx.deployer.get_result(&job_name, task_id).await {
            Ok(result) => Some(result),
            Err(DeployError::BuildNotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        if let (Some(record), Some(result)) = (record.as_mut(), result.as_ref()) {
            record.apply(result);
            record.write_to_dir(dir)?;
        }

        let outcome = match &result {
            Some(_) => Outcome::Polled,
            None => {
                pending_polls += 1;
                let expired = match record.as_ref() {
                    Some(r) => queue_expired(r),
                    None => watch.is_some() && pending_polls >= MAX_PENDING_POLLS,
                };
                if expired {
                    Outcome::Lost
                } else {
                    Outcome::Queued
                }
            }
        };

        let finished = result.as_ref().is_some_and(|r| r.status.is_terminal());
        match watch {
            Some(secs) if !finished && outcome != Outcome::Lost => {
                if !json {
                    print_pending(&job_name, task_id, result.as_ref());
                }
                tokio::time::sleep(Duration::from_secs(secs.max(1))).await;
            }
            _ => {
                if json {
                    print_json(&job_name, task_id, record.as_ref(), result.as_ref())?;
                } else {
                    print_status(&job_name, task_id, record.as_ref(), result.as_ref());
                    if outcome == Outcome::Lost {
                        println!("  Note:     queue item expired; check the job page for build history");
                    }
                }
                return Ok(outcome);
            }
        }
    }
}

fn queue_expired(record: &DeploymentRecord) -> bool {
    Utc::now() - record.dispatched_at > ChronoDuration::minutes(QUEUE_RETENTION_MINS)
}

fn status_label(record: Option<&DeploymentRecord>, result: Option<&DeploymentResult>) -> String {
    match (result, record.and_then(|r| r.status)) {
        (Some(r), _) => r.status.to_string(),
        (None, Some(stored)) => stored.to_string(),
        (None, None) => "queued".into(),
    }
}

fn print_pending(job_name: &str, task_id: TaskId, result: Option<&DeploymentResult>) {
    match result {
        Some(r) => println!("{} task {}: {} (build #{})", job_name, task_id, r.status, r.build_number),
        None => println!("{} task {}: queued", job_name, task_id),
    }
}

fn print_json(
    job_name: &str,
    task_id: TaskId,
    record: Option<&DeploymentRecord>,
    result: Option<&DeploymentResult>,
) -> anyhow::Result<()> {
    let status_code = result
        .map(|r| r.status)
        .or_else(|| record.and_then(|r| r.status))
        .map(|s| s.code());
    let value = serde_json::json!({
        "record": record.map(|r| r.to_json()),
        "job_name": job_name,
        "task_id": task_id.0,
        "status": status_label(record, result),
        "status_code": status_code,
        "result": result,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_status(
    job_name: &str,
    task_id: TaskId,
    record: Option<&DeploymentRecord>,
    result: Option<&DeploymentResult>,
) {
    if let Some(r) = record {
        println!("Deployment: {}", r.id);
        println!("  Service:  {}", r.service);
        println!("  Node:     {}", r.node);
        println!("  Env:      {}", r.environment);
        println!("  Queued:   {}", r.dispatched_at);
    }
    println!("  Job:      {}", job_name);
    println!("  Task:     {}", task_id);

    let Some(result) = result else {
        match record.and_then(|r| r.status) {
            Some(stored) => {
                println!("  Status:   {}", stored);
                if let Some(res) = record.and_then(|r| r.result.as_deref()) {
                    println!("  Result:   {}", res);
                }
            }
            None => println!("  Status:   queued (no build yet)"),
        }
        return;
    };
    println!("  Build:    #{}", result.build_number);
    println!("  Status:   {}", result.status);
    if !result.result.is_empty() {
        println!("  Result:   {}", result.result);
    }
    println!("  Polled:   {}", result.polled_at);
    if result.status.is_terminal() && !result.console_output.is_empty() {
        println!();
        print!("{}", result.console_output);
    }
}
