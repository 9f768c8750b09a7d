use crate::dispatch::Context;

pub fn list(ctx: &Context) -> anyhow::Result<()> {
    let names = ctx.deployer.service_names();
    if names.is_empty() {
        println!("No services configured.");
        return Ok(());
    }

    println!("{:<20} {:<8} {}", "SERVICE", "SCRIPT", "PARAMETERS");
    println!("{}", "-".repeat(70));
    for name in names {
        if let Some(service) = ctx.deployer.service(&name) {
            println!(
                "{:<20} {:<8} {}",
                name,
                format!("v{}", service.script().version()),
                service.script().parameter_names().collect::<Vec<_>>().join(","),
            );
        }
    }
    Ok(())
}

pub fn render(ctx: &Context, service: &str, node: &str) -> anyhow::Result<()> {
    println!("{}", ctx.deployer.render_job(service, node)?);
    Ok(())
}
