//! Dashboard-level summary derived from the roster

use serde::Serialize;

use crate::roster::{CameraRecord, CameraStatus, ReconcileState};

/// Overall status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Online,
    Degraded,
    Offline,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Health::Online => "online",
            Health::Degraded => "degraded",
            Health::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Aggregate metrics over all camera records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterMetrics {
    pub total_cameras: usize,
    pub active_cameras: usize,
    pub errored_cameras: usize,
    pub total_frames: u64,
    pub total_buffer: u64,
    pub mean_buffer: f64,
    pub health: Health,
}

impl RosterMetrics {
    /// Project metrics from records and the latest reconcile outcome
    pub fn project<'a>(
        records: impl IntoIterator<Item = &'a CameraRecord>,
        last_reconcile: Option<ReconcileState>,
    ) -> Self {
        let mut total_cameras = 0;
        let mut active_cameras = 0;
        let mut errored_cameras = 0;
        let mut total_frames = 0u64;
        let mut total_buffer = 0u64;
        let mut active_buffer = 0u64;
        let mut faulted = false;

        for record in records {
            total_cameras += 1;
            total_frames += record.frames_received;
            total_buffer += record.buffer_depth;
            match record.status {
                CameraStatus::Active => {
                    active_cameras += 1;
                    active_buffer += record.buffer_depth;
                    faulted |= record.has_fault();
                }
                CameraStatus::Error => errored_cameras += 1,
                CameraStatus::Inactive => {}
            }
        }

        let mean_buffer = if active_cameras == 0 {
            0.0
        } else {
            active_buffer as f64 / active_cameras as f64
        };

        let roster_failed = last_reconcile.is_some_and(|r| !r.ok);
        let health = if active_cameras == 0 {
            Health::Offline
        } else if errored_cameras > 0 || faulted || roster_failed {
            Health::Degraded
        } else {
            Health::Online
        };

        Self {
            total_cameras,
            active_cameras,
            errored_cameras,
            total_frames,
            total_buffer,
            mean_buffer,
            health,
        }
    }
}
