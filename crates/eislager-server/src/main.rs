use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use eislager_config::{resolve_config_path, GatewayConfig};
use eislager_server::{build_router, AppState, AuditInterceptor};
use eislager_stores::build_store;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "eislager-gateway", version, about = "EisLager Pro API gateway")]
struct Args {
    /// Gateway config file (.toml, .yaml or .yml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overrides the config file.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config_path = resolve_config_path(args.config);
    let mut config = GatewayConfig::load_or_default(config_path.as_deref())
        .context("failed to load gateway config")?;
    config.apply_env_overrides();
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    config.validate().context("invalid gateway config")?;

    let state = AppState::from_config(&config)?;
    for entry in state.routes.entries() {
        info!(
            prefix = %entry.prefix,
            target = %entry.target,
            strip_prefix = entry.strip_prefix,
            "route registered"
        );
    }

    let interceptor = if config.audit.enabled {
        let store = build_store(&config.audit.store).context("failed to build audit store")?;
        let interceptor = AuditInterceptor::from_config(store, &config.audit);
        info!(
            store = interceptor.store_name(),
            record_failures = config.audit.policy.record_failures,
            "audit interceptor enabled"
        );
        Some(interceptor)
    } else {
        info!("audit interceptor disabled");
        None
    };

    let app = build_router(state, interceptor);
    let addr = config.listen_addr()?;
    let config_source = config_path
        .as_ref()
        .map_or_else(|| "<defaults>".to_string(), |path| path.display().to_string());
    info!(%addr, config = %config_source, "starting eislager gateway");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("gateway server failed")?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
