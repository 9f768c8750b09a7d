use deploy_core::record::{list_records, records_dir};

pub fn run(json: bool, service_filter: Option<String>) -> anyhow::Result<()> {
    let mut records = list_records(&records_dir())?;
    if let Some(ref service) = service_filter {
        records.retain(|r| r.service == *service);
    }

    if json {
        let json_records: Vec<_> = records.iter().map(|r| r.to_json()).collect();
        println!("{}", serde_json::to_string_pretty(&json_records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No deployments found.");
        return Ok(());
    }
    println!(
        "{:<10} {:<16} {:<16} {:<10} {:<9} {}",
        "ID", "SERVICE", "NODE", "STATUS", "TASK", "DISPATCHED"
    );
    println!("{}", "-".repeat(90));
    for r in &records {
        println!(
            "{:<10} {:<16} {:<16} {:<10} {:<9} {}",
            &r.id[..8.min(r.id.len())],
            r.service,
            r.node,
            r.status.map(|s| s.to_string()).unwrap_or_else(|| "queued".into()),
            r.task_id,
            r.dispatched_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}
