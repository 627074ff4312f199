use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use clap::Parser;
use courier_agent::autostart::{current_executable, platform_autostart};
use courier_agent::DEFAULT_AGENT_PORT;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Local agent that executes requests for the Courier web app.
#[derive(Parser, Debug)]
#[command(name = "courier-agent", version, about)]
struct Args {
    /// Port to listen on (always bound to 127.0.0.1)
    #[arg(long, env = "COURIER_AGENT_PORT", default_value_t = DEFAULT_AGENT_PORT)]
    port: u16,

    /// Register the agent to start on login, then exit
    #[arg(long, conflicts_with = "uninstall")]
    install: bool,

    /// Remove the start-on-login registration, then exit
    #[arg(long)]
    uninstall: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    if args.install {
        let executable = current_executable()?;
        let autostart = platform_autostart()?;
        autostart
            .register(&executable)
            .context("failed to install agent")?;
        info!(location = %autostart.location(), executable = %executable.display(), "agent registered to start on login");
        return Ok(());
    }
    if args.uninstall {
        let autostart = platform_autostart()?;
        autostart.unregister().context("failed to uninstall agent")?;
        info!(location = %autostart.location(), "agent removed from start on login");
        return Ok(());
    }

    info!(version = env!("CARGO_PKG_VERSION"), port = args.port, "starting courier agent");
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    courier_agent::run(listener, courier_agent::app(), shutdown_signal())
        .await
        .context("agent error")?;
    info!("courier agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
