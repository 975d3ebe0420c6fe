//! Wire types for the ingestion service contract
//!
//! Field names follow the service's JSON exactly. Optional fields default so
//! that older or trimmed-down services still deserialize.

use serde::{Deserialize, Serialize};

use crate::error::PollFailure;

/// Outcome of one fetch attempt against `action=stream`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Stream is up but has not produced a frame yet (HTTP 204 or no payload)
    Empty,
    /// Transport or server failure
    Failure(PollFailure),
    /// A frame is available
    Frame(FramePayload),
}

/// Base64 image payload plus its sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload {
    pub data: String,
    pub sequence: u64,
}

/// Body of a 200 response to `action=stream`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub frame_data: Option<String>,
    #[serde(default)]
    pub metadata: Option<FrameMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameMetadata {
    #[serde(default)]
    pub frame_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FrameResponse {
    /// Map a parsed body to a poll result
    ///
    /// A missing or empty `frame_data` is not an error, the stream just has
    /// nothing to show yet.
    pub fn into_poll_result(self) -> PollResult {
        match self.frame_data {
            Some(data) if !data.is_empty() => {
                let sequence = self
                    .metadata
                    .and_then(|m| m.frame_number)
                    .unwrap_or(0);
                PollResult::Frame(FramePayload { data, sequence })
            }
            _ => PollResult::Empty,
        }
    }
}

/// Body of `action=list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_streams: Option<usize>,
    #[serde(default)]
    pub streams: Vec<StreamEntry>,
}

/// One live stream as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub camera_id: String,
    #[serde(default)]
    pub buffer_frames: u64,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamEntry {
    pub fn new(camera_id: impl Into<String>, buffer_frames: u64, fps: u32) -> Self {
        Self {
            camera_id: camera_id.into(),
            buffer_frames,
            fps: Some(fps),
            status: None,
            rtsp_url: None,
            uptime_seconds: None,
            error: None,
        }
    }

    /// Service reported the capture loop as failed
    pub fn is_errored(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

/// Body of the start-stream POST
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartStreamRequest {
    pub camera_id: String,
    pub rtsp_url: String,
    pub fps: u32,
}

/// Success body of the start-stream POST
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStarted {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_capacity_frames: Option<u64>,
}

/// Success body of the stop-stream DELETE
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStopped {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub frames_captured: u64,
    #[serde(default)]
    pub uptime_seconds: u64,
}

/// `{ "error": "..." }` returned with every non-success status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
