//! Per-camera poll scheduler
//!
//! Each active camera owns one timer task keyed by camera id. The timer
//! fires a fetch-and-apply cycle immediately and then every
//! `round(1000 / fps)` ms. Cycles run concurrently inside the timer task so
//! a slow fetch never delays the next tick; aborting the timer aborts them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use camwatch_client::{PollResult, StreamApi};

use crate::roster::{ApplyOutcome, CameraId, CycleOutcome, CycleToken, RosterHandle};

/// Shortest timer period; a zero period would panic the timer task
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Timer period for a camera running at `fps`
pub fn poll_interval(fps: u32) -> Duration {
    let fps = fps.max(1) as f64;
    Duration::from_millis((1000.0 / fps).round() as u64).max(MIN_POLL_INTERVAL)
}

/// Timers changed by one [`PollScheduler::sync`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub armed: Vec<CameraId>,
    pub disarmed: Vec<CameraId>,
    pub rearmed: Vec<CameraId>,
}

struct PollTimer {
    fps: u32,
    task: JoinHandle<()>,
}

/// Owns the poll timers for all cameras
pub struct PollScheduler {
    api: Arc<dyn StreamApi>,
    roster: RosterHandle,
    max_in_flight: usize,
    timers: Mutex<HashMap<CameraId, PollTimer>>,
}

impl PollScheduler {
    pub fn new(api: Arc<dyn StreamApi>, roster: RosterHandle, max_in_flight: usize) -> Self {
        Self {
            api,
            roster,
            max_in_flight: max_in_flight.max(1),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Bring timers in line with the roster
    ///
    /// Arms timers for newly active cameras, disarms timers for cameras that
    /// are no longer active, and re-arms on fps change. Must be called from
    /// within a tokio runtime.
    pub fn sync(&self) -> SyncReport {
        let desired: HashMap<CameraId, u32> = self.roster.active_cameras().into_iter().collect();
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = SyncReport::default();

        timers.retain(|id, timer| {
            if desired.contains_key(id) {
                return true;
            }
            timer.task.abort();
            report.disarmed.push(id.clone());
            false
        });

        for (id, fps) in desired {
            match timers.get(&id).map(|t| t.fps) {
                Some(armed_fps) if armed_fps == fps => {}
                Some(_) => {
                    if let Some(old) = timers.insert(id.clone(), self.arm(&id, fps)) {
                        old.task.abort();
                    }
                    report.rearmed.push(id);
                }
                None => {
                    timers.insert(id.clone(), self.arm(&id, fps));
                    report.armed.push(id);
                }
            }
        }

        for id in &report.disarmed {
            info!("camera {} idle, poll timer disarmed", id);
        }
        for id in &report.rearmed {
            info!("camera {} reconfigured, poll timer re-armed", id);
        }
        report
    }

    /// Disarm every timer and clear what the cameras display
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for (id, timer) in timers.drain() {
            timer.task.abort();
            self.roster.clear_display(&id);
        }
        info!("poll scheduler stopped");
    }

    /// Ids with an armed timer
    pub fn polling(&self) -> Vec<CameraId> {
        let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<CameraId> = timers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current timer period for a camera, if armed
    pub fn interval_of(&self, id: &str) -> Option<Duration> {
        let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.get(id).map(|t| poll_interval(t.fps))
    }

    fn arm(&self, id: &str, fps: u32) -> PollTimer {
        let period = poll_interval(fps);
        info!("camera {} polling every {:?} ({} fps)", id, period, fps);

        let task = tokio::spawn(run_timer(
            id.to_string(),
            period,
            self.max_in_flight,
            self.api.clone(),
            self.roster.clone(),
        ));
        PollTimer { fps, task }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, timer) in timers.drain() {
            timer.task.abort();
        }
    }
}

async fn run_timer(
    camera_id: CameraId,
    period: Duration,
    max_in_flight: usize,
    api: Arc<dyn StreamApi>,
    roster: RosterHandle,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        ticker.tick().await;

        while let Some(finished) = in_flight.try_join_next() {
            if let Err(e) = finished {
                if e.is_panic() {
                    warn!("poll cycle for {} panicked: {}", camera_id, e);
                }
            }
        }

        if in_flight.len() >= max_in_flight {
            debug!(
                "camera {} has {} cycles in flight, skipping tick",
                camera_id,
                in_flight.len()
            );
            continue;
        }

        let Some(token) = roster.begin_cycle(&camera_id) else {
            debug!("camera {} no longer active, skipping tick", camera_id);
            continue;
        };

        let api = api.clone();
        let roster = roster.clone();
        let id = camera_id.clone();
        in_flight.spawn(async move {
            run_cycle(&id, token, api.as_ref(), &roster).await;
        });
    }
}

/// One fetch-and-apply cycle
///
/// Fetches the latest frame, decodes it on a blocking thread if it could
/// still be applied, and hands the outcome to the roster, which drops it if
/// the camera moved on in the meantime.
pub async fn run_cycle(
    camera_id: &str,
    token: CycleToken,
    api: &dyn StreamApi,
    roster: &RosterHandle,
) -> ApplyOutcome {
    let outcome = match api.fetch_frame(camera_id).await {
        PollResult::Empty => CycleOutcome::Waiting,
        PollResult::Failure(failure) => {
            debug!("camera {} poll failed: {}", camera_id, failure);
            CycleOutcome::Failed(failure)
        }
        PollResult::Frame(frame) => {
            if !roster.accepts_frame(camera_id, token, frame.sequence) {
                debug!(
                    "camera {} dropping stale frame #{} before decode",
                    camera_id, frame.sequence
                );
                return ApplyOutcome::Stale;
            }

            let sequence = frame.sequence;
            let payload: Arc<str> = Arc::from(frame.data);
            let (width, height) = roster.surface_size();
            let to_decode = payload.clone();
            let decoded = tokio::task::spawn_blocking(move || {
                camwatch_render::prepare_frame(&to_decode, width, height)
            })
            .await;

            match decoded {
                Ok(Ok(prepared)) => CycleOutcome::Decoded {
                    payload,
                    sequence,
                    frame: prepared,
                },
                Ok(Err(e)) => {
                    debug!("camera {} frame #{} failed to decode: {}", camera_id, sequence, e);
                    CycleOutcome::Undecodable {
                        sequence,
                        reason: e.to_string(),
                    }
                }
                Err(e) => CycleOutcome::Undecodable {
                    sequence,
                    reason: format!("decoder task failed: {}", e),
                },
            }
        }
    };

    let applied = roster.apply(camera_id, token, outcome);
    if applied == ApplyOutcome::Stale {
        debug!("camera {} dropped stale result (ticket {})", camera_id, token.ticket);
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSeed;
    use crate::roster::{CameraStatus, Roster, WAITING_FOR_FRAMES};
    use crate::testing::{jpeg_base64, ScriptedApi};
    use camwatch_client::{FramePayload, PollFailure, StreamEntry};
    use camwatch_render::SurfaceContent;

    fn handle() -> RosterHandle {
        let seeds: Vec<CameraSeed> = ["cam-001", "cam-002"]
            .iter()
            .map(|id| CameraSeed {
                id: id.to_string(),
                name: id.to_string(),
                rtsp_url: format!("rtsp://{}/stream", id),
                fps: None,
            })
            .collect();
        RosterHandle::new(Roster::new(&seeds, 64, 36))
    }

    fn frame(sequence: u64) -> PollResult {
        PollResult::Frame(FramePayload {
            data: jpeg_base64(16, 9),
            sequence,
        })
    }

    #[test]
    fn test_poll_interval_rounds() {
        assert_eq!(poll_interval(1), Duration::from_millis(1000));
        assert_eq!(poll_interval(25), Duration::from_millis(40));
        assert_eq!(poll_interval(60), Duration::from_millis(17));
        assert_eq!(poll_interval(0), Duration::from_millis(1000));
    }

    #[test]
    fn test_poll_interval_never_zero() {
        assert_eq!(poll_interval(1000), Duration::from_millis(1));
        assert_eq!(poll_interval(3000), Duration::from_millis(1));
        assert_eq!(poll_interval(u32::MAX), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_very_high_fps_keeps_polling() {
        let roster = handle();
        roster.merge(&[StreamEntry::new("cam-001", 0, 3000)], 25);
        let api = Arc::new(ScriptedApi::new());
        let scheduler = PollScheduler::new(api.clone(), roster.clone(), 4);

        scheduler.sync();
        assert_eq!(scheduler.interval_of("cam-001"), Some(Duration::from_millis(1)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let fetched = api.fetch_count("cam-001");
        assert!(fetched > 1, "only {} fetches", fetched);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(api.fetch_count("cam-001") > fetched);
        assert_eq!(scheduler.polling(), vec!["cam-001".to_string()]);
    }

    #[tokio::test]
    async fn test_happy_path_cycle() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = ScriptedApi::new();
        api.push_frame("cam-001", frame(42));

        let token = roster.begin_cycle("cam-001").unwrap();
        let applied = run_cycle("cam-001", token, &api, &roster).await;
        assert_eq!(applied, ApplyOutcome::Applied);

        let record = roster.get("cam-001").unwrap();
        assert_eq!(record.last_sequence, 42);
        assert!(record.has_frame());
        assert!(record.last_error.is_none());
        assert_eq!(
            roster.read().surface("cam-001").unwrap().content(),
            SurfaceContent::Frame { sequence: 42 }
        );
    }

    #[tokio::test]
    async fn test_empty_sets_waiting_and_keeps_sequence() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = ScriptedApi::new();
        api.push_frame("cam-001", frame(3));
        api.push_frame("cam-001", PollResult::Empty);

        for _ in 0..2 {
            let token = roster.begin_cycle("cam-001").unwrap();
            run_cycle("cam-001", token, &api, &roster).await;
        }

        let record = roster.get("cam-001").unwrap();
        assert_eq!(record.last_error.as_deref(), Some(WAITING_FOR_FRAMES));
        assert_eq!(record.last_sequence, 3);
        assert!(record.has_frame());
    }

    #[tokio::test]
    async fn test_server_error_keeps_frame() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = ScriptedApi::new();
        api.push_frame("cam-001", frame(1));
        api.push_frame("cam-001", PollResult::Failure(PollFailure::Server(500)));

        for _ in 0..2 {
            let token = roster.begin_cycle("cam-001").unwrap();
            run_cycle("cam-001", token, &api, &roster).await;
        }

        let record = roster.get("cam-001").unwrap();
        assert!(record.last_error.as_deref().unwrap().contains("500"));
        assert!(record.has_frame());
    }

    #[tokio::test]
    async fn test_decode_failure_paints_placeholder() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = ScriptedApi::new();
        api.push_frame(
            "cam-001",
            PollResult::Frame(FramePayload {
                data: "!!!not-base64!!!".to_string(),
                sequence: 8,
            }),
        );

        let token = roster.begin_cycle("cam-001").unwrap();
        let applied = run_cycle("cam-001", token, &api, &roster).await;
        assert_eq!(applied, ApplyOutcome::Applied);

        let record = roster.get("cam-001").unwrap();
        assert_eq!(record.decode_failures, 1);
        assert!(record.last_error.is_some());
        assert_eq!(record.status, CameraStatus::Active);
        assert_eq!(
            roster.read().surface("cam-001").unwrap().content(),
            SurfaceContent::DecodeFailed { sequence: 8 }
        );
    }

    #[tokio::test]
    async fn test_stale_sequence_dropped_in_issue_order() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = ScriptedApi::new();
        api.push_frame("cam-001", frame(5));
        api.push_frame("cam-001", frame(3));

        let first = roster.begin_cycle("cam-001").unwrap();
        let second = roster.begin_cycle("cam-001").unwrap();
        assert_eq!(run_cycle("cam-001", first, &api, &roster).await, ApplyOutcome::Applied);
        assert_eq!(run_cycle("cam-001", second, &api, &roster).await, ApplyOutcome::Stale);
        assert_eq!(roster.get("cam-001").unwrap().last_sequence, 5);
    }

    #[tokio::test]
    async fn test_deactivation_mid_flight_discards_frame() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = Arc::new(ScriptedApi::new());
        let gate = api.gate("cam-001");
        api.push_frame("cam-001", frame(11));

        let token = roster.begin_cycle("cam-001").unwrap();
        let cycle = {
            let api = api.clone();
            let roster = roster.clone();
            tokio::spawn(async move { run_cycle("cam-001", token, api.as_ref(), &roster).await })
        };

        tokio::task::yield_now().await;
        roster.deactivate("cam-001").unwrap();
        gate.notify_one();

        assert_eq!(cycle.await.unwrap(), ApplyOutcome::Stale);
        let record = roster.get("cam-001").unwrap();
        assert_eq!(record.status, CameraStatus::Inactive);
        assert!(!record.has_frame());
        assert!(record.last_error.is_none());
        assert_eq!(
            roster.read().surface("cam-001").unwrap().content(),
            SurfaceContent::Blank
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_immediately_then_on_interval() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = Arc::new(ScriptedApi::new());
        let scheduler = PollScheduler::new(api.clone(), roster.clone(), 4);

        let report = scheduler.sync();
        assert_eq!(report.armed, vec!["cam-001".to_string()]);
        assert_eq!(scheduler.interval_of("cam-001"), Some(Duration::from_millis(40)));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.fetch_count("cam-001"), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(api.fetch_count("cam-001"), 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(api.fetch_count("cam-001"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_timer() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = Arc::new(ScriptedApi::new());
        api.set_fallback("cam-001", PollResult::Failure(PollFailure::Server(500)));
        let scheduler = PollScheduler::new(api.clone(), roster.clone(), 4);
        scheduler.sync();

        tokio::time::sleep(Duration::from_millis(401)).await;
        assert_eq!(api.fetch_count("cam-001"), 11);
        assert_eq!(roster.get("cam-001").unwrap().last_error.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_disarms_and_rearms() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        roster.activate("cam-002").unwrap();
        let api = Arc::new(ScriptedApi::new());
        let scheduler = PollScheduler::new(api.clone(), roster.clone(), 4);
        scheduler.sync();
        assert_eq!(scheduler.polling(), vec!["cam-001".to_string(), "cam-002".to_string()]);

        roster.deactivate("cam-002").unwrap();
        roster.merge(
            &[camwatch_client::StreamEntry::new("cam-001", 0, 60)],
            25,
        );
        let report = scheduler.sync();
        assert_eq!(report.disarmed, vec!["cam-002".to_string()]);
        assert_eq!(report.rearmed, vec!["cam-001".to_string()]);
        assert_eq!(scheduler.interval_of("cam-001"), Some(Duration::from_millis(17)));
        assert_eq!(scheduler.polling(), vec!["cam-001".to_string()]);

        // No further fetches for the disarmed camera
        let before = api.fetch_count("cam-002");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(api.fetch_count("cam-002"), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_bound_skips_ticks() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = Arc::new(ScriptedApi::new());
        // Never released: every fetch hangs
        let _gate = api.gate("cam-001");
        let scheduler = PollScheduler::new(api.clone(), roster.clone(), 2);
        scheduler.sync();

        tokio::time::sleep(Duration::from_millis(401)).await;
        assert_eq!(api.fetch_count("cam-001"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_display() {
        let roster = handle();
        roster.activate("cam-001").unwrap();
        let api = Arc::new(ScriptedApi::new());
        api.set_fallback("cam-001", frame(1));
        let scheduler = PollScheduler::new(api.clone(), roster.clone(), 4);
        scheduler.sync();

        // Let the first cycle (including its blocking decode) finish
        for _ in 0..50 {
            if roster.get("cam-001").unwrap().has_frame() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(roster.get("cam-001").unwrap().has_frame());

        scheduler.shutdown();
        assert!(scheduler.polling().is_empty());
        let record = roster.get("cam-001").unwrap();
        assert!(!record.has_frame());
        assert!(record.last_error.is_none());

        let count = api.fetch_count("cam-001");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(api.fetch_count("cam-001"), count);
    }
}
