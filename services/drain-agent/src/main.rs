//! nodeevac drain agent
//!
//! Runs one drain invocation for a lifecycle hook trigger and exits. The
//! trigger is taken from the first argument, from `--event-file`, or from
//! stdin. Any failure exits non-zero.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nodeevac_agent::{config::Config, DrainPipeline};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "drain-node", version, about = "Drain a node ahead of scale-in")]
struct Cli {
    /// Trigger payload as JSON.
    #[arg(conflicts_with = "event_file")]
    event: Option<String>,

    /// Read the trigger payload from a file.
    #[arg(long, value_name = "PATH")]
    event_file: Option<PathBuf>,

    /// Log level (overrides NODEEVAC_LOG_LEVEL).
    #[arg(long, env = "NODEEVAC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Decode the trigger, log it and exit without calling anything.
    #[arg(long)]
    decode_only: bool,
}

async fn read_payload(cli: &Cli) -> Result<Vec<u8>> {
    if let Some(event) = &cli.event {
        return Ok(event.clone().into_bytes());
    }
    if let Some(path) = &cli.event_file {
        return tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read event from {:?}", path));
    }

    let mut payload = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut payload)
        .await
        .context("Failed to read event from stdin")?;
    Ok(payload)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    // Initialize tracing (prefer RUST_LOG, fallback to the configured level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let payload = read_payload(&cli).await?;

    if cli.decode_only {
        let event = nodeevac_events::decode_notification(&payload)?;
        info!(
            node_id = %event.node_id,
            transition = %event.transition,
            group = %event.group_name,
            hook = %event.hook_name,
            cluster = %event.cluster,
            channel = %event.resubmission_channel,
            "Decoded lifecycle event"
        );
        return Ok(());
    }

    info!(region = %config.region, ecs_endpoint = %config.ecs_endpoint, "Starting drain invocation");

    let pipeline = DrainPipeline::connect(&config)?;
    match pipeline.run(&payload).await {
        Ok(invocation) => {
            info!(?invocation, "Drain invocation finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Drain invocation failed");
            Err(e.into())
        }
    }
}
