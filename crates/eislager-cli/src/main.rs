use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eislager_config::{resolve_config_path, AuditStoreConfig, GatewayConfig};
use eislager_core::{AuditRecord, GatewayError, RouteEntry};
use eislager_stores::read_tail;
use reqwest::blocking::Client;
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "eislager", version, about = "EisLager Pro gateway CLI")]
struct Cli {
    /// Gateway config file (.toml, .yaml or .yml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "EISLAGER_GATEWAY_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    gateway_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load and validate the gateway config.
    Check,
    /// Print the effective config, after defaults and env overrides, as JSON.
    Config,
    /// Print the configured route table.
    Routes,
    /// Show which upstream a request path would be forwarded to.
    Resolve {
        path: String,
    },
    /// Query a running gateway.
    Status,
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
}

#[derive(Debug, Subcommand)]
enum AuditCommand {
    /// Print the most recent records from the file audit store.
    Tail {
        #[arg(long, default_value_t = 20)]
        lines: usize,
        /// Audit file, defaults to the path in the config.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct HealthStatus {
    status: String,
    service: String,
    routes: usize,
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            let config = load_config(cli.config)?;
            println!(
                "config ok: {} routes, listen {}, audit {}",
                config.routes.len(),
                config.server.listen,
                if config.audit.enabled { "enabled" } else { "disabled" }
            );
        }
        Commands::Config => {
            let config = load_config(cli.config)?;
            println!("{}", serde_json::to_string_pretty(&config.to_json())?);
        }
        Commands::Routes => {
            let config = load_config(cli.config)?;
            for (index, entry) in config.routes.iter().enumerate() {
                println!("{}", format_route_row(index, entry));
            }
        }
        Commands::Resolve { path } => {
            let config = load_config(cli.config)?;
            let table = config.route_table()?;
            let (path, query) = split_query(&path);
            match table.resolve(path, query) {
                Ok(matched) => println!(
                    "{} -> {} (route #{} {})",
                    path, matched.upstream_url, matched.index, matched.entry.prefix
                ),
                Err(err @ GatewayError::RouteNotFound { .. }) => {
                    eprintln!("{err}");
                    return Ok(ExitCode::FAILURE);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Status => {
            let client = Client::new();
            let base = cli.gateway_url.trim_end_matches('/');
            let health: HealthStatus = client
                .get(format!("{base}/health"))
                .send()
                .with_context(|| format!("gateway at {base} is not reachable"))?
                .error_for_status()?
                .json()?;
            println!(
                "{}: {} ({} routes)",
                health.service, health.status, health.routes
            );

            let routes: Vec<RouteEntry> = client
                .get(format!("{base}/routes"))
                .send()?
                .error_for_status()?
                .json()?;
            for (index, entry) in routes.iter().enumerate() {
                println!("{}", format_route_row(index, entry));
            }
        }
        Commands::Audit { command } => match command {
            AuditCommand::Tail { lines, file } => {
                let path = match file {
                    Some(path) => path,
                    None => match load_config(cli.config)?.audit.store {
                        AuditStoreConfig::File { path } => path,
                        other => anyhow::bail!(
                            "audit store is {other:?}; pass --file or configure kind = \"file\""
                        ),
                    },
                };
                let records = read_tail(&path, lines)
                    .with_context(|| format!("reading audit file {}", path.display()))?;
                if records.is_empty() {
                    println!("No audit records in {}", path.display());
                }
                for record in &records {
                    println!("{}", format_record_row(record));
                }
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config(explicit: Option<PathBuf>) -> Result<GatewayConfig> {
    let path = resolve_config_path(explicit);
    let mut config =
        GatewayConfig::load_or_default(path.as_deref()).context("failed to load gateway config")?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn split_query(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    }
}

fn format_route_row(index: usize, entry: &RouteEntry) -> String {
    let mode = if entry.strip_prefix { "strip" } else { "keep" };
    format!("{index}\t{}\t{}\t{mode}", entry.prefix, entry.target)
}

fn format_record_row(record: &AuditRecord) -> String {
    format!(
        "{}\t{:?}\t{:?}\t{:?}\t{}\t{}\t{}",
        record.created_at_unix_ms,
        record.status,
        record.action_kind,
        record.resource_kind,
        record.resource_id.as_deref().unwrap_or("-"),
        record.actor_id.as_deref().unwrap_or("-"),
        record.endpoint
    )
}
