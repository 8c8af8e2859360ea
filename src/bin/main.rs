//! redis-broker CLI

use clap::{Parser, Subcommand};
use redis_broker::models::{active_plans, Instance};
use redis_broker::{Broker, BrokerConfig, Database, Error, Result, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use tabled::{Table, Tabled};

#[derive(Parser)]
#[command(name = "redis-broker")]
#[command(about = "Provisions shared, dedicated and HA Redis instances for a PaaS")]
#[command(version)]
struct Cli {
    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// List provisioned instances
    Instances,
    /// Show one instance and its endpoints
    Show {
        /// Instance name
        name: String,
    },
    /// List the plans offered to the platform
    Plans,
}

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Plan")]
    plan: String,
    #[tabled(rename = "Endpoints")]
    endpoints: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Instance> for InstanceRow {
    fn from(i: &Instance) -> Self {
        Self {
            name: i.name.clone(),
            plan: i.plan.to_string(),
            endpoints: i
                .endpoints
                .iter()
                .map(|e| e.address())
                .collect::<Vec<_>>()
                .join(", "),
            created: i.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Container")]
    container: String,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("redis_broker=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = BrokerConfig::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    match cli.command {
        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .map_err(|e| Error::Other(format!("invalid address {}:{}: {}", host, port, e)))?;

            println!("Starting API server on http://{}", addr);
            println!();
            println!("Endpoints:");
            println!("  POST   /resources                         Provision instance");
            println!("  DELETE /resources/:name                   Remove instance");
            println!("  POST   /resources/:name                   Bind");
            println!("  POST   /resources/:name/bind-app          Bind app");
            println!("  POST   /resources/:name/bind              Bind unit");
            println!("  DELETE /resources/:name/bind-app          Unbind app");
            println!("  DELETE /resources/:name/bind              Unbind unit");
            println!("  DELETE /resources/:name/hostname/:host    Unbind unit host");
            println!("  GET    /resources/:name/status            Instance status");
            println!("  GET    /resources/plans                   Plan catalog");
            println!();

            // Blocking HTTP clients are built off the async workers
            let broker = tokio::task::spawn_blocking(move || Broker::new(config))
                .await
                .map_err(|e| Error::Other(e.to_string()))??;

            let server = Server::new(broker, addr);
            server.run().await?;
        }
        Commands::Instances => {
            let db = Database::open(&config.database_path)?;
            let instances = db.list_instances()?;
            if instances.is_empty() {
                println!("No instances.");
            } else {
                let rows: Vec<InstanceRow> = instances.iter().map(InstanceRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        Commands::Show { name } => {
            let db = Database::open(&config.database_path)?;
            let instance = db
                .find_instance_by_name(&name)?
                .ok_or_else(|| Error::InstanceNotFound(name.clone()))?;

            println!("Instance: {}", instance.name);
            println!("Plan:     {} ({})", instance.plan, instance.plan.description());
            println!("Created:  {}", instance.created_at.to_rfc3339());
            println!();

            let rows: Vec<EndpointRow> = instance
                .endpoints
                .iter()
                .enumerate()
                .map(|(i, e)| EndpointRow {
                    role: match (instance.endpoints.len(), i) {
                        (1, _) => "standalone".to_string(),
                        (_, 0) => "master".to_string(),
                        _ => "replica".to_string(),
                    },
                    host: e.host.clone(),
                    port: e.port,
                    container: if e.container_id.is_empty() {
                        "-".to_string()
                    } else {
                        e.container_id.chars().take(12).collect()
                    },
                })
                .collect();
            println!("{}", Table::new(rows));
        }
        Commands::Plans => {
            let plans = active_plans(&config.active_plans);
            if plans.is_empty() {
                println!("No active plans. Set REDIS_API_PLANS to a JSON list of plan names.");
            } else {
                let rows: Vec<PlanRow> = plans
                    .into_iter()
                    .map(|p| PlanRow {
                        name: p.name,
                        description: p.description,
                    })
                    .collect();
                println!("{}", Table::new(rows));
            }
        }
    }

    Ok(())
}
