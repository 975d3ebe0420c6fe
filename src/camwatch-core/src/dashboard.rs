//! Dashboard orchestration
//!
//! Wires the roster, reconciler, and poll scheduler together and runs them
//! until shutdown. User start/stop actions update the roster optimistically;
//! the next reconciliation confirms or corrects them.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use camwatch_client::{IngestClient, StartStreamRequest, StreamApi, StreamStarted, StreamStopped};
use camwatch_render::Surface;

use crate::config::Config;
use crate::metrics::RosterMetrics;
use crate::reconciler::RosterReconciler;
use crate::roster::{MergeReport, Roster, RosterHandle};
use crate::scheduler::PollScheduler;

/// How often the summary line is logged and snapshots are written
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Running dashboard state
pub struct Dashboard {
    config: Config,
    api: Arc<dyn StreamApi>,
    roster: RosterHandle,
    scheduler: PollScheduler,
    reconciler: RosterReconciler,
}

impl Dashboard {
    /// Build a dashboard talking to the configured endpoint
    pub fn from_config(config: Config) -> Result<Self> {
        let client = IngestClient::new(&config.api.endpoint, config.request_timeout())
            .context("Failed to create ingestion client")?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Build a dashboard over any [`StreamApi`]
    pub fn new(config: Config, api: Arc<dyn StreamApi>) -> Self {
        let roster = RosterHandle::new(Roster::new(
            &config.cameras,
            config.render.width,
            config.render.height,
        ));
        let scheduler = PollScheduler::new(api.clone(), roster.clone(), config.poll.max_in_flight);
        let reconciler = RosterReconciler::new(api.clone(), roster.clone(), config.default_fps());

        Self {
            config,
            api,
            roster,
            scheduler,
            reconciler,
        }
    }

    pub fn roster(&self) -> &RosterHandle {
        &self.roster
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> RosterMetrics {
        let roster = self.roster.read();
        RosterMetrics::project(roster.records(), roster.last_reconcile())
    }

    /// One reconciliation pass followed by a timer sync
    ///
    /// Timers are synced even when the fetch fails so that local start/stop
    /// actions still take effect.
    pub async fn reconcile(&self) -> Result<MergeReport> {
        let result = self.reconciler.reconcile_once().await;
        self.scheduler.sync();
        result
    }

    /// Start a camera's stream
    pub async fn start_camera(&self, camera_id: &str) -> Result<StreamStarted> {
        let record = self
            .roster
            .get(camera_id)
            .with_context(|| format!("unknown camera: {}", camera_id))?;

        self.roster.activate(camera_id)?;
        self.scheduler.sync();

        let request = StartStreamRequest {
            camera_id: record.id.clone(),
            rtsp_url: record.source_url.clone(),
            fps: record.fps,
        };
        let started = self
            .api
            .start_stream(&request)
            .await
            .with_context(|| format!("Failed to start stream for {}", camera_id))?;

        info!("stream started for {}: {}", camera_id, started.message);
        Ok(started)
    }

    /// Stop a camera's stream
    pub async fn stop_camera(&self, camera_id: &str) -> Result<StreamStopped> {
        self.roster.deactivate(camera_id)?;
        self.scheduler.sync();

        let stopped = self
            .api
            .stop_stream(camera_id)
            .await
            .with_context(|| format!("Failed to stop stream for {}", camera_id))?;

        info!(
            "stream stopped for {}: {} frames captured over {}s",
            camera_id, stopped.frames_captured, stopped.uptime_seconds
        );
        Ok(stopped)
    }

    /// Run until `shutdown` is set
    ///
    /// Reconciles at startup and then every configured interval; logs a
    /// summary whenever the roster changed since the last one.
    pub async fn run(&self, shutdown: Arc<AtomicBool>, snapshot_dir: Option<PathBuf>) -> Result<()> {
        info!(
            "dashboard watching {} camera(s) via {}",
            self.config.cameras.len(),
            self.config.api.endpoint
        );

        if let Some(dir) = &snapshot_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        }

        let mut reconcile_ticker = tokio::time::interval(self.config.reconcile_interval());
        reconcile_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status_ticker = tokio::time::interval(STATUS_INTERVAL);
        status_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_revision = None;

        loop {
            tokio::select! {
                _ = reconcile_ticker.tick() => {
                    // Failures are already logged by the reconciler
                    let _ = self.reconcile().await;
                }
                _ = status_ticker.tick() => {
                    let revision = self.roster.read().revision();
                    if last_revision != Some(revision) {
                        last_revision = Some(revision);
                        self.log_status();
                        if let Some(dir) = &snapshot_dir {
                            if let Err(e) = self.write_snapshots(dir).await {
                                warn!("failed to write snapshots: {:#}", e);
                            }
                        }
                    }
                }
                _ = wait_for_flag(&shutdown) => {
                    info!("🛑 Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Disarm all timers and clear displayed frames
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn log_status(&self) {
        let metrics = self.metrics();
        info!(
            "{} | {}/{} active, {} errored | {} frames | buffer {} total, {:.1} avg",
            metrics.health,
            metrics.active_cameras,
            metrics.total_cameras,
            metrics.errored_cameras,
            metrics.total_frames,
            metrics.total_buffer,
            metrics.mean_buffer
        );

        for record in self.roster.snapshot().iter().filter(|r| r.is_active()) {
            if let Some(err) = &record.last_error {
                debug!("{}: {}", record.id, err);
            }
        }
    }

    /// Write the surface of every active camera to `<dir>/<id>.png`
    async fn write_snapshots(&self, dir: &Path) -> Result<()> {
        let surfaces: Vec<(String, Surface)> = {
            let roster = self.roster.read();
            let surfaces = roster
                .records()
                .filter(|r| r.is_active())
                .filter_map(|r| roster.surface(&r.id).map(|s| (r.id.clone(), s.clone())))
                .collect();
            surfaces
        };

        let encoded = tokio::task::spawn_blocking(move || {
            surfaces
                .into_iter()
                .filter_map(|(id, surface)| match surface.to_png() {
                    Ok(png) => Some((id, png)),
                    Err(e) => {
                        error!("failed to encode surface for {}: {}", id, e);
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .context("Snapshot encoder task failed")?;

        for (id, png) in encoded {
            let path = dir.join(format!("{}.png", id));
            tokio::fs::write(&path, png)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        debug!("wrote snapshots to {}", dir.display());
        Ok(())
    }
}

async fn wait_for_flag(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
