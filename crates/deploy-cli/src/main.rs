use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod dispatch;

#[derive(Parser)]
#[command(name = "deployctl")]
#[command(about = "Deploy services to Jenkins-managed nodes", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/deployctl/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the config file
    Config {
        /// Print the default config path only
        #[arg(long)]
        path: bool,

        /// Write a sample config to the default path
        #[arg(long)]
        init: bool,
    },

    /// List nodes of the configured environment
    Nodes {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Register a machine as an SSH-launched node
    NodeAdd {
        /// Node IP address (prefer private addresses)
        ip: String,

        /// Free text appended to the node description
        #[arg(short, long, default_value = "")]
        remark: String,

        #[arg(long)]
        executors: Option<u32>,

        #[arg(long)]
        credentials_id: Option<String>,

        #[arg(long)]
        jvm_options: Option<String>,

        #[arg(long)]
        remote_fs: Option<String>,

        #[arg(long)]
        ssh_port: Option<String>,
    },

    /// Delete a node
    NodeRm {
        /// Node name
        name: String,
    },

    /// List configured services
    Services {},

    /// Print the job definition a service gets on a node
    Render {
        service: String,
        node: String,
    },

    /// Queue a deployment of a service on a node
    Deploy {
        service: String,
        node: String,

        /// Override the package URL for this deployment
        #[arg(long)]
        pkg_url: Option<String>,
    },

    /// Show the result of a deployment
    Status {
        /// Deployment record ID (or unique prefix)
        #[arg(required_unless_present = "job")]
        id: Option<String>,

        /// Query a job directly instead of a record
        #[arg(long, requires = "task", conflicts_with = "id")]
        job: Option<String>,

        /// Queue task ID, used with --job
        #[arg(long, requires = "job")]
        task: Option<u64>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Poll every N seconds until the deployment finishes
        #[arg(short, long)]
        watch: Option<u64>,
    },

    /// List recorded deployments
    History {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Only show deployments of this service
        #[arg(short, long)]
        service: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    use Commands::*;

    match cli.command {
        Config { path, init } => {
            commands::config::run(config_path, path, init).await?;
        }
        Nodes { json } => {
            let ctx = dispatch::load(config_path)?;
            commands::nodes::list(&ctx, json).await?;
        }
        NodeAdd {
            ip,
            remark,
            executors,
            credentials_id,
            jvm_options,
            remote_fs,
            ssh_port,
        } => {
            let ctx = dispatch::load(config_path)?;
            let options = deploy_core::config::NodeOptions {
                num_executors: executors,
                jvm_options,
                remote_fs,
                ssh_port,
                credentials_id,
            };
            commands::nodes::add(&ctx, &ip, &remark, &options).await?;
        }
        NodeRm { name } => {
            let ctx = dispatch::load(config_path)?;
            commands::nodes::remove(&ctx, &name).await?;
        }
        Services {} => {
            let ctx = dispatch::load(config_path)?;
            commands::services::list(&ctx)?;
        }
        Render { service, node } => {
            let ctx = dispatch::load(config_path)?;
            commands::services::render(&ctx, &service, &node)?;
        }
        Deploy {
            service,
            node,
            pkg_url,
        } => {
            let mut config = dispatch::load_config(config_path)?;
            if let Some(url) = pkg_url {
                commands::deploy::override_package_url(&mut config, &service, url)?;
            }
            let ctx = dispatch::Context::new(config, config_path)?;
            commands::deploy::run(&ctx, &service, &node).await?;
        }
        Status {
            id,
            job,
            task,
            json,
            watch,
        } => {
            let ctx = dispatch::load(config_path)?;
            let target = match (id, job, task) {
                (_, Some(job), Some(task)) => commands::status::Target::Job(job, task.into()),
                (Some(id), _, _) => commands::status::Target::Record(id),
                _ => anyhow::bail!("give a record ID or --job with --task"),
            };
            commands::status::run(&ctx, target, json, watch).await?;
        }
        History { json, service } => {
            commands::history::run(json, service)?;
        }
    }

    Ok(())
}
