//! Camwatch - camera dashboard stream synchronizer
//!
//! Keeps a roster of cameras in step with the ingestion service and polls
//! each live camera for frames at its own rate.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use camwatch_core::colored_logger::{init_component_logger, Component};
use camwatch_core::config::Config;
use camwatch_core::dashboard::Dashboard;

#[derive(Parser)]
#[command(name = "camwatch")]
#[command(about = "Camera dashboard stream synchronizer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard until Ctrl+C
    Run {
        /// Write each live camera's preview as PNG into this directory
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Reconcile once and print the roster
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Start a camera's stream
    Start {
        /// Camera id from the configured roster
        camera_id: String,
    },

    /// Stop a camera's stream
    Stop {
        /// Camera id from the configured roster
        camera_id: String,
    },

    /// Run the mock ingestion service
    Mock {
        /// Listen port (defaults to the configured mock port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let component = match cli.command {
        Commands::Mock { .. } => Component::Mock,
        _ => Component::Main,
    };
    init_component_logger(component, cli.verbose)?;

    let config = Config::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    match cli.command {
        Commands::Run { snapshot_dir } => runtime.block_on(cmd_run(config, snapshot_dir)),
        Commands::Status { json } => runtime.block_on(cmd_status(config, json)),
        Commands::Start { camera_id } => runtime.block_on(cmd_start(config, camera_id)),
        Commands::Stop { camera_id } => runtime.block_on(cmd_stop(config, camera_id)),
        Commands::Mock { port } => {
            let port = port.unwrap_or(config.mock.port);
            runtime.block_on(camwatch_mock::serve(port))
        }
    }
}

async fn cmd_run(config: Config, snapshot_dir: Option<PathBuf>) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;

    // Setup signal handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let s = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        s.store(true, Ordering::SeqCst);
    })?;

    dashboard.run(shutdown, snapshot_dir).await?;

    info!("dashboard stopped");
    Ok(())
}

async fn cmd_status(config: Config, json: bool) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;
    if let Err(e) = dashboard.reconcile().await {
        warn!("roster unavailable: {:#}", e);
    }
    // Status is a one-shot view, no frames are polled
    dashboard.shutdown();

    let records = dashboard.roster().snapshot();
    let metrics = dashboard.metrics();

    if json {
        let out = serde_json::json!({
            "cameras": records,
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{:<10} {:<22} {:<9} {:>4} {:>7}  error", "camera", "name", "status", "fps", "buffer");
    for record in &records {
        println!(
            "{:<10} {:<22} {:<9} {:>4} {:>7}  {}",
            record.id,
            record.name,
            record.status.to_string(),
            record.fps,
            record.buffer_depth,
            record.last_error.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!("health: {}", metrics.health);
    println!(
        "active: {}/{} ({} errored)",
        metrics.active_cameras, metrics.total_cameras, metrics.errored_cameras
    );
    println!(
        "buffer: {} frames total, {:.1} average",
        metrics.total_buffer, metrics.mean_buffer
    );

    Ok(())
}

async fn cmd_start(config: Config, camera_id: String) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;
    let started = dashboard.start_camera(&camera_id).await?;
    dashboard.shutdown();

    println!("{}: {}", started.camera_id, started.message);
    if let Some(capacity) = started.buffer_capacity_frames {
        println!("buffer capacity: {} frames", capacity);
    }
    Ok(())
}

async fn cmd_stop(config: Config, camera_id: String) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;
    let stopped = dashboard.stop_camera(&camera_id).await?;
    dashboard.shutdown();

    println!("{}: {}", stopped.camera_id, stopped.message);
    println!(
        "frames captured: {}, uptime: {}s",
        stopped.frames_captured, stopped.uptime_seconds
    );
    Ok(())
}
