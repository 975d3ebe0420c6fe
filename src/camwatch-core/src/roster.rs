//! Camera roster store
//!
//! The roster is the only shared mutable state in the dashboard. Records are
//! seeded once and never added or removed; all writes go through either
//! [`Roster::merge`] (server truth) or [`Roster::apply`] (poll results).
//!
//! Every record carries an activation epoch. Activating or deactivating a
//! camera bumps it, and each poll cycle captures it in a [`CycleToken`], so
//! a result from an earlier epoch can never land on the current one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::debug;

use camwatch_client::{PollFailure, StreamEntry};
use camwatch_render::{PreparedFrame, Surface};

use crate::config::CameraSeed;

pub type CameraId = String;

/// Error text shown while an active stream has not produced a frame
pub const WAITING_FOR_FRAMES: &str = "Waiting for frames...";

/// Frame rate assumed when neither the seed nor the server gives one
pub const DEFAULT_FPS: u32 = 25;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    #[error("unknown camera: {0}")]
    UnknownCamera(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    Active,
    Inactive,
    Error,
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CameraStatus::Active => "active",
            CameraStatus::Inactive => "inactive",
            CameraStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Per-camera state
#[derive(Debug, Clone, Serialize)]
pub struct CameraRecord {
    pub id: CameraId,
    pub name: String,
    pub status: CameraStatus,
    pub fps: u32,
    pub buffer_depth: u64,
    pub last_sequence: u64,
    /// Base64 payload of the last frame that decoded
    #[serde(skip)]
    pub last_frame: Option<Arc<str>>,
    pub last_error: Option<String>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub source_url: String,
    pub frames_received: u64,
    pub decode_failures: u64,
    /// Uptime the service last reported for this camera's stream
    pub stream_uptime: Option<u64>,
    #[serde(skip)]
    epoch: u64,
    #[serde(skip)]
    sequence_seen: bool,
    #[serde(skip)]
    issued_ticket: u64,
    #[serde(skip)]
    applied_ticket: u64,
}

impl CameraRecord {
    fn from_seed(seed: &CameraSeed) -> Self {
        Self {
            id: seed.id.clone(),
            name: seed.name.clone(),
            status: CameraStatus::Inactive,
            fps: seed.fps.filter(|f| *f > 0).unwrap_or(DEFAULT_FPS),
            buffer_depth: 0,
            last_sequence: 0,
            last_frame: None,
            last_error: None,
            last_frame_at: None,
            source_url: seed.rtsp_url.clone(),
            frames_received: 0,
            decode_failures: 0,
            stream_uptime: None,
            epoch: 0,
            sequence_seen: false,
            issued_ticket: 0,
            applied_ticket: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CameraStatus::Active
    }

    pub fn has_frame(&self) -> bool {
        self.last_frame.is_some()
    }

    /// Error text other than the transient "waiting" indicator
    pub fn has_fault(&self) -> bool {
        matches!(self.last_error.as_deref(), Some(e) if e != WAITING_FOR_FRAMES)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn accepts_sequence(&self, sequence: u64) -> bool {
        !self.sequence_seen || sequence > self.last_sequence
    }

    /// Drop displayed frame, error text, and sequence tracking
    fn clear_display(&mut self) {
        self.last_frame = None;
        self.last_error = None;
        self.last_sequence = 0;
        self.sequence_seen = false;
    }

    /// Move to `status`, starting a new epoch if this is a transition
    fn transition(&mut self, status: CameraStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.epoch += 1;
        self.stream_uptime = None;
        self.clear_display();
        true
    }

    /// The service restarted the stream behind our back: frame numbers
    /// start over, so forget the stored sequence and in-flight cycles.
    /// The last frame stays on screen until a new one lands.
    fn restart_sequence(&mut self) {
        self.epoch += 1;
        self.last_sequence = 0;
        self.sequence_seen = false;
    }

    /// Whether `uptime` went backwards since the last snapshot
    fn uptime_regressed(&self, uptime: Option<u64>) -> bool {
        matches!((self.stream_uptime, uptime), (Some(prev), Some(now)) if now < prev)
    }
}

/// Issued when a poll cycle starts; checked again before its result is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleToken {
    pub epoch: u64,
    pub ticket: u64,
}

/// What a finished poll cycle wants to write
#[derive(Debug)]
pub enum CycleOutcome {
    Waiting,
    Failed(PollFailure),
    Decoded {
        payload: Arc<str>,
        sequence: u64,
        frame: PreparedFrame,
    },
    Undecodable {
        sequence: u64,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Superseded or for a past epoch; nothing was written
    Stale,
}

/// Changes made by one roster merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub activated: Vec<CameraId>,
    pub deactivated: Vec<CameraId>,
    pub errored: Vec<CameraId>,
    pub reconfigured: Vec<CameraId>,
    /// Still active, but the service restarted the stream
    pub restarted: Vec<CameraId>,
    /// Ids the server reported that are not in the seed list
    pub unknown: Vec<String>,
}

impl MergeReport {
    pub fn has_transitions(&self) -> bool {
        !(self.activated.is_empty()
            && self.deactivated.is_empty()
            && self.errored.is_empty()
            && self.reconfigured.is_empty()
            && self.restarted.is_empty())
    }
}

/// Outcome of the most recent roster fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileState {
    pub at: DateTime<Utc>,
    pub ok: bool,
}

/// Camera records plus their preview surfaces
#[derive(Debug)]
pub struct Roster {
    records: BTreeMap<CameraId, CameraRecord>,
    surfaces: HashMap<CameraId, Surface>,
    surface_size: (u32, u32),
    last_reconcile: Option<ReconcileState>,
    revision: u64,
}

impl Roster {
    /// Seed the roster. Duplicate ids keep the first seed.
    pub fn new(seeds: &[CameraSeed], width: u32, height: u32) -> Self {
        let mut records = BTreeMap::new();
        let mut surfaces = HashMap::new();
        for seed in seeds {
            if records.contains_key(&seed.id) {
                continue;
            }
            records.insert(seed.id.clone(), CameraRecord::from_seed(seed));
            surfaces.insert(seed.id.clone(), Surface::new(width, height));
        }

        Self {
            records,
            surfaces,
            surface_size: (width, height),
            last_reconcile: None,
            revision: 0,
        }
    }

    pub fn get(&self, id: &str) -> Option<&CameraRecord> {
        self.records.get(id)
    }

    pub fn surface(&self, id: &str) -> Option<&Surface> {
        self.surfaces.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &CameraRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    pub fn last_reconcile(&self) -> Option<ReconcileState> {
        self.last_reconcile
    }

    /// Bumped on every write
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// `(id, fps)` of every camera that should be polled
    pub fn active_cameras(&self) -> Vec<(CameraId, u32)> {
        self.records
            .values()
            .filter(|r| r.is_active())
            .map(|r| (r.id.clone(), r.fps))
            .collect()
    }

    /// Mark a camera active (user start). Returns whether the status changed.
    pub fn activate(&mut self, id: &str) -> Result<bool, RosterError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RosterError::UnknownCamera(id.to_string()))?;
        let changed = record.transition(CameraStatus::Active);
        if changed {
            self.reset_surface(id);
            self.revision += 1;
        }
        Ok(changed)
    }

    /// Mark a camera inactive (user stop). Returns whether the status changed.
    pub fn deactivate(&mut self, id: &str) -> Result<bool, RosterError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RosterError::UnknownCamera(id.to_string()))?;
        let changed = record.transition(CameraStatus::Inactive);
        if changed {
            record.buffer_depth = 0;
            self.reset_surface(id);
            self.revision += 1;
        }
        Ok(changed)
    }

    /// Clear frame and error without changing status
    ///
    /// Starts a new epoch so results still in flight are discarded.
    pub fn clear_display(&mut self, id: &str) {
        if let Some(record) = self.records.get_mut(id) {
            record.epoch += 1;
            record.clear_display();
            self.reset_surface(id);
            self.revision += 1;
        }
    }

    /// Merge a server roster snapshot into the records
    ///
    /// Listed cameras become active (or error, if the server says so) and take
    /// buffer depth and fps from the snapshot. Unlisted cameras become
    /// inactive with zero buffer depth. Name and source URL are never touched.
    pub fn merge(&mut self, entries: &[StreamEntry], default_fps: u32) -> MergeReport {
        let mut report = MergeReport::default();
        let listed: HashMap<&str, &StreamEntry> =
            entries.iter().map(|e| (e.camera_id.as_str(), e)).collect();

        for entry in entries {
            if !self.records.contains_key(&entry.camera_id) {
                report.unknown.push(entry.camera_id.clone());
            }
        }

        let mut reset = Vec::new();
        for record in self.records.values_mut() {
            match listed.get(record.id.as_str()) {
                Some(entry) if entry.is_errored() => {
                    if record.transition(CameraStatus::Error) {
                        report.errored.push(record.id.clone());
                        reset.push(record.id.clone());
                    }
                    record.last_error = Some(
                        entry
                            .error
                            .clone()
                            .unwrap_or_else(|| "stream reported an error".to_string()),
                    );
                    record.buffer_depth = entry.buffer_frames;
                    record.fps = entry.fps.filter(|f| *f > 0).unwrap_or(default_fps);
                    record.stream_uptime = entry.uptime_seconds;
                }
                Some(entry) => {
                    let fps = entry.fps.filter(|f| *f > 0).unwrap_or(default_fps);
                    if record.transition(CameraStatus::Active) {
                        report.activated.push(record.id.clone());
                        reset.push(record.id.clone());
                    } else {
                        if record.fps != fps {
                            report.reconfigured.push(record.id.clone());
                        }
                        if record.uptime_regressed(entry.uptime_seconds) {
                            record.restart_sequence();
                            report.restarted.push(record.id.clone());
                        }
                    }
                    record.buffer_depth = entry.buffer_frames;
                    record.fps = fps;
                    record.stream_uptime = entry.uptime_seconds;
                }
                None => {
                    if record.transition(CameraStatus::Inactive) {
                        report.deactivated.push(record.id.clone());
                        reset.push(record.id.clone());
                    }
                    record.buffer_depth = 0;
                }
            }
        }

        for id in &reset {
            self.reset_surface(id);
        }
        if !report.unknown.is_empty() {
            debug!("roster lists unseeded cameras: {:?}", report.unknown);
        }

        self.revision += 1;
        report
    }

    /// Record whether the latest roster fetch succeeded
    pub fn record_reconcile(&mut self, ok: bool) {
        self.last_reconcile = Some(ReconcileState { at: Utc::now(), ok });
        self.revision += 1;
    }

    /// Start a poll cycle for an active camera
    pub fn begin_cycle(&mut self, id: &str) -> Option<CycleToken> {
        let record = self.records.get_mut(id)?;
        if !record.is_active() {
            return None;
        }
        record.issued_ticket += 1;
        Some(CycleToken {
            epoch: record.epoch,
            ticket: record.issued_ticket,
        })
    }

    /// Whether a result carrying `token` may still be applied
    pub fn is_current(&self, id: &str, token: CycleToken) -> bool {
        self.records.get(id).is_some_and(|r| {
            r.is_active() && r.epoch == token.epoch && token.ticket > r.applied_ticket
        })
    }

    /// Whether a frame with `sequence` would be applied; lets callers skip decoding
    pub fn accepts_frame(&self, id: &str, token: CycleToken, sequence: u64) -> bool {
        self.is_current(id, token)
            && self
                .records
                .get(id)
                .is_some_and(|r| r.accepts_sequence(sequence))
    }

    /// Apply a finished poll cycle
    ///
    /// Results from a past epoch, results older than one already applied, and
    /// frames whose sequence is not newer than the stored one are dropped.
    /// Failures and empty polls keep the last good frame on screen.
    pub fn apply(&mut self, id: &str, token: CycleToken, outcome: CycleOutcome) -> ApplyOutcome {
        if !self.is_current(id, token) {
            return ApplyOutcome::Stale;
        }
        let Some(record) = self.records.get_mut(id) else {
            return ApplyOutcome::Stale;
        };

        match outcome {
            CycleOutcome::Waiting => {
                record.last_error = Some(WAITING_FOR_FRAMES.to_string());
            }
            CycleOutcome::Failed(failure) => {
                record.last_error = Some(failure.to_string());
            }
            CycleOutcome::Decoded {
                payload,
                sequence,
                frame,
            } => {
                if !record.accepts_sequence(sequence) {
                    return ApplyOutcome::Stale;
                }
                record.last_sequence = sequence;
                record.sequence_seen = true;
                record.last_frame = Some(payload);
                record.last_frame_at = Some(Utc::now());
                record.last_error = None;
                record.frames_received += 1;
                if let Some(surface) = self.surfaces.get_mut(id) {
                    surface.paint(&frame, sequence);
                }
            }
            CycleOutcome::Undecodable { sequence, reason } => {
                if !record.accepts_sequence(sequence) {
                    return ApplyOutcome::Stale;
                }
                record.last_sequence = sequence;
                record.sequence_seen = true;
                record.decode_failures += 1;
                record.last_error = Some(format!("Failed to decode frame: {}", reason));
                if let Some(surface) = self.surfaces.get_mut(id) {
                    surface.paint_decode_failure(sequence);
                }
            }
        }

        record.applied_ticket = token.ticket;
        self.revision += 1;
        ApplyOutcome::Applied
    }

    fn reset_surface(&mut self, id: &str) {
        if let Some(surface) = self.surfaces.get_mut(id) {
            surface.clear();
        }
    }
}

/// Shared handle to the roster
///
/// Writers hold the lock only for in-memory updates, never across an await.
#[derive(Debug, Clone)]
pub struct RosterHandle {
    inner: Arc<RwLock<Roster>>,
}

impl RosterHandle {
    pub fn new(roster: Roster) -> Self {
        Self {
            inner: Arc::new(RwLock::new(roster)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Roster> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Roster> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Vec<CameraRecord> {
        self.read().records().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<CameraRecord> {
        self.read().get(id).cloned()
    }

    pub fn active_cameras(&self) -> Vec<(CameraId, u32)> {
        self.read().active_cameras()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.read().surface_size()
    }

    pub fn begin_cycle(&self, id: &str) -> Option<CycleToken> {
        self.write().begin_cycle(id)
    }

    pub fn accepts_frame(&self, id: &str, token: CycleToken, sequence: u64) -> bool {
        self.read().accepts_frame(id, token, sequence)
    }

    pub fn apply(&self, id: &str, token: CycleToken, outcome: CycleOutcome) -> ApplyOutcome {
        self.write().apply(id, token, outcome)
    }

    pub fn merge(&self, entries: &[StreamEntry], default_fps: u32) -> MergeReport {
        self.write().merge(entries, default_fps)
    }

    pub fn record_reconcile(&self, ok: bool) {
        self.write().record_reconcile(ok)
    }

    pub fn clear_display(&self, id: &str) {
        self.write().clear_display(id)
    }

    pub fn activate(&self, id: &str) -> Result<bool, RosterError> {
        self.write().activate(id)
    }

    pub fn deactivate(&self, id: &str) -> Result<bool, RosterError> {
        self.write().deactivate(id)
    }
}
