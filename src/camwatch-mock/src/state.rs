//! Shared mock service state

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::synth;

/// Seconds of footage each stream keeps
pub const BUFFER_SECONDS: u64 = 60;
pub const DEFAULT_FPS: u32 = 25;
/// Highest capture rate a stream may request
pub const MAX_FPS: u32 = 1000;

/// Clamp a requested capture rate to `1..=MAX_FPS`
pub fn clamp_fps(fps: u32) -> u32 {
    fps.clamp(1, MAX_FPS)
}

/// Lifecycle of a simulated capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Starting,
    Active,
    Error,
}

/// One captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_number: u64,
    pub captured_at: DateTime<Utc>,
    pub jpeg: Arc<[u8]>,
}

/// Ring buffer plus capture status, shared with the capture task
#[derive(Debug)]
pub struct Feed {
    frames: VecDeque<Frame>,
    capacity: usize,
    pub status: FeedStatus,
    pub error: Option<String>,
}

impl Feed {
    fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            status: FeedStatus::Starting,
            error: None,
        }
    }

    fn push(&mut self, frame: Frame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn latest(&self) -> Option<&Frame> {
        self.frames.back()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A started stream. Dropping it stops the capture task.
#[derive(Debug)]
pub struct Stream {
    pub rtsp_url: String,
    pub fps: u32,
    pub started_at: Instant,
    pub feed: Arc<Mutex<Feed>>,
    task: JoinHandle<()>,
}

impl Stream {
    pub fn feed(&self) -> MutexGuard<'_, Feed> {
        lock(&self.feed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Outcome of stopping a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    pub frames_captured: usize,
    pub uptime_seconds: u64,
}

/// Shared state across all handlers
#[derive(Clone)]
pub struct MockState {
    streams: Arc<Mutex<HashMap<String, Stream>>>,
    frame_size: (u32, u32),
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    pub fn new() -> Self {
        Self::with_frame_size(synth::FRAME_WIDTH, synth::FRAME_HEIGHT)
    }

    /// State whose streams render frames of the given size
    pub fn with_frame_size(width: u32, height: u32) -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            frame_size: (width.max(1), height.max(1)),
        }
    }

    pub fn streams(&self) -> MutexGuard<'_, HashMap<String, Stream>> {
        lock(&self.streams)
    }

    /// Start simulated capture for `camera_id`. Must be called from within
    /// a tokio runtime.
    pub fn start(&self, camera_id: &str, rtsp_url: &str, fps: u32) -> Result<usize, ApiError> {
        let fps = clamp_fps(fps);
        let mut streams = self.streams();
        if streams.contains_key(camera_id) {
            return Err(ApiError::Conflict);
        }

        let capacity = (BUFFER_SECONDS * fps as u64) as usize;
        let feed = Arc::new(Mutex::new(Feed::new(capacity)));
        let task = tokio::spawn(capture(
            camera_id.to_string(),
            fps,
            self.frame_size,
            feed.clone(),
        ));

        streams.insert(
            camera_id.to_string(),
            Stream {
                rtsp_url: rtsp_url.to_string(),
                fps,
                started_at: Instant::now(),
                feed,
                task,
            },
        );
        info!("stream {} started from {} at {} fps", camera_id, rtsp_url, fps);
        Ok(capacity)
    }

    /// Stop capture for `camera_id` and drop its buffer
    pub fn stop(&self, camera_id: &str) -> Result<StopSummary, ApiError> {
        let stream = self
            .streams()
            .remove(camera_id)
            .ok_or_else(|| ApiError::NotFound(camera_id.to_string()))?;

        let summary = StopSummary {
            frames_captured: stream.feed().len(),
            uptime_seconds: stream.uptime_seconds(),
        };
        info!(
            "stream {} stopped after {}s ({} frames buffered)",
            camera_id, summary.uptime_seconds, summary.frames_captured
        );
        Ok(summary)
    }

    /// Register a stream whose capture never produces a frame
    #[cfg(test)]
    pub(crate) fn insert_idle(&self, camera_id: &str, fps: u32) {
        let capacity = (BUFFER_SECONDS * fps as u64) as usize;
        self.streams().insert(
            camera_id.to_string(),
            Stream {
                rtsp_url: format!("rtsp://test/{}", camera_id),
                fps,
                started_at: Instant::now(),
                feed: Arc::new(Mutex::new(Feed::new(capacity))),
                task: tokio::spawn(std::future::pending()),
            },
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render frames at `fps` into the feed until aborted
async fn capture(camera_id: String, fps: u32, size: (u32, u32), feed: Arc<Mutex<Feed>>) {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    lock(&feed).status = FeedStatus::Active;

    let mut frame_number = 0u64;
    loop {
        ticker.tick().await;

        let (width, height) = size;
        let rendered =
            tokio::task::spawn_blocking(move || synth::render_frame(frame_number, width, height))
                .await;

        let jpeg = match rendered {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("stream {} failed to render frame {}: {}", camera_id, frame_number, e);
                let mut feed = lock(&feed);
                feed.status = FeedStatus::Error;
                feed.error = Some(e.to_string());
                return;
            }
            Err(e) => {
                debug!("stream {} capture task ended: {}", camera_id, e);
                return;
            }
        };

        lock(&feed).push(Frame {
            frame_number,
            captured_at: Utc::now(),
            jpeg: jpeg.into(),
        });
        frame_number += 1;
    }
}
