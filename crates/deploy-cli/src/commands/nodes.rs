use crate::dispatch::Context;
use deploy_core::config::NodeOptions;

pub async fn list(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let registry = ctx.deployer.nodes();
    registry.refresh().await?;
    let nodes = registry.nodes();

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }

    if nodes.is_empty() {
        println!("No nodes in environment '{}'.", registry.environment());
        return Ok(());
    }
    println!("{:<20} {:<10} {:<8} {}", "NAME", "EXECUTORS", "STATE", "DESCRIPTION");
    println!("{}", "-".repeat(70));
    for node in &nodes {
        println!(
            "{:<20} {:<10} {:<8} {}",
            node.name,
            node.num_executors,
            if node.offline { "offline" } else { "online" },
            node.description,
        );
    }
    Ok(())
}

pub async fn add(ctx: &Context, ip: &str, remark: &str, options: &NodeOptions) -> anyhow::Result<()> {
    let node = ctx.deployer.nodes().create(ip, remark, options).await?;

    println!("Node created:");
    println!("  Name:        {}", node.name);
    println!("  Executors:   {}", node.num_executors);
    println!("  Description: {}", node.description);
    Ok(())
}

pub async fn remove(ctx: &Context, name: &str) -> anyhow::Result<()> {
    if ctx.deployer.nodes().delete(name).await? {
        println!("Node {} deleted.", name);
    } else {
        println!("Backend did not confirm deletion of node {}.", name);
    }
    Ok(())
}
