//! Stream endpoint handlers
//!
//! One path serves every operation: `GET` with an `action` query for
//! polling, listing and status, `POST` to start and `DELETE` to stop.

use crate::{ApiError, MockState};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::{clamp_fps, FeedStatus, Stream, BUFFER_SECONDS, DEFAULT_FPS};

// ============================================================================
// Request types
// ============================================================================

/// Query parameters shared by GET and DELETE
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub camera_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// Body of a start request
#[derive(Debug, Deserialize)]
pub struct StartBody {
    #[serde(default)]
    pub camera_id: Option<String>,
    #[serde(default)]
    pub rtsp_url: Option<String>,
    #[serde(default)]
    pub fps: Option<u32>,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FrameMetadata {
    pub frame_number: u64,
    pub camera_id: String,
    pub fps: u32,
    pub source: String,
    pub format: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub camera_id: String,
    /// Capture time, seconds since the epoch
    pub timestamp: f64,
    pub frame_data: String,
    pub metadata: FrameMetadata,
    pub format: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StreamInfo {
    pub camera_id: String,
    pub status: FeedStatus,
    pub fps: u32,
    pub rtsp_url: String,
    pub buffer_frames: usize,
    pub buffer_duration_seconds: f64,
    pub uptime_seconds: u64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StreamListResponse {
    pub total_streams: usize,
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Serialize)]
pub struct StreamStatusResponse {
    #[serde(flatten)]
    pub info: StreamInfo,
    pub buffer_capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub message: &'static str,
    pub camera_id: String,
    pub rtsp_url: String,
    pub buffer_duration_seconds: u64,
    pub fps: u32,
    pub buffer_capacity_frames: usize,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub message: &'static str,
    pub camera_id: String,
    pub frames_captured: usize,
    pub uptime_seconds: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET ?action=list`, `GET ?camera_id=..&action=stream`, or the default
/// per-stream status
pub async fn get_stream(
    State(state): State<MockState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let action = query.action.as_deref().unwrap_or("status");

    if action == "list" {
        let streams = state.streams();
        let mut infos: Vec<StreamInfo> = streams
            .iter()
            .map(|(id, stream)| stream_info(id, stream))
            .collect();
        infos.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        return Ok(Json(StreamListResponse {
            total_streams: infos.len(),
            streams: infos,
        })
        .into_response());
    }

    let camera_id = required_camera_id(query.camera_id)?;
    let streams = state.streams();
    let stream = streams
        .get(&camera_id)
        .ok_or_else(|| ApiError::NotFound(camera_id.clone()))?;

    if action == "stream" {
        let feed = stream.feed();
        let Some(frame) = feed.latest() else {
            debug!("stream {} has no frames yet", camera_id);
            return Ok(StatusCode::NO_CONTENT.into_response());
        };

        let response = FrameResponse {
            camera_id: camera_id.clone(),
            timestamp: frame.captured_at.timestamp_millis() as f64 / 1000.0,
            frame_data: BASE64_ENGINE.encode(&frame.jpeg),
            metadata: FrameMetadata {
                frame_number: frame.frame_number,
                camera_id: camera_id.clone(),
                fps: stream.fps,
                source: stream.rtsp_url.clone(),
                format: "jpeg",
            },
            format: "base64",
        };
        return Ok(Json(response).into_response());
    }

    let buffer_capacity = stream.feed().capacity();
    Ok(Json(StreamStatusResponse {
        info: stream_info(&camera_id, stream),
        buffer_capacity,
    })
    .into_response())
}

/// `POST {camera_id, rtsp_url, fps}`
pub async fn start_stream(
    State(state): State<MockState>,
    body: Result<Json<StartBody>, JsonRejection>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let (camera_id, rtsp_url) = match (body.camera_id, body.rtsp_url) {
        (Some(id), Some(url)) if !id.is_empty() && !url.is_empty() => (id, url),
        _ => {
            return Err(ApiError::BadRequest(
                "camera_id and rtsp_url required".to_string(),
            ))
        }
    };
    let fps = clamp_fps(body.fps.unwrap_or(DEFAULT_FPS));

    let capacity = state.start(&camera_id, &rtsp_url, fps)?;

    Ok((
        StatusCode::CREATED,
        Json(StartResponse {
            message: "Stream started successfully",
            camera_id,
            rtsp_url,
            buffer_duration_seconds: BUFFER_SECONDS,
            fps,
            buffer_capacity_frames: capacity,
        }),
    ))
}

/// `DELETE ?camera_id=..`
pub async fn stop_stream(
    State(state): State<MockState>,
    Query(query): Query<StreamQuery>,
) -> Result<Json<StopResponse>, ApiError> {
    let camera_id = required_camera_id(query.camera_id)?;
    let summary = state.stop(&camera_id)?;

    Ok(Json(StopResponse {
        message: "Stream stopped successfully",
        camera_id,
        frames_captured: summary.frames_captured,
        uptime_seconds: summary.uptime_seconds,
    }))
}

fn required_camera_id(camera_id: Option<String>) -> Result<String, ApiError> {
    camera_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("camera_id parameter required".to_string()))
}

fn stream_info(camera_id: &str, stream: &Stream) -> StreamInfo {
    let feed = stream.feed();
    StreamInfo {
        camera_id: camera_id.to_string(),
        status: feed.status,
        fps: stream.fps,
        rtsp_url: stream.rtsp_url.clone(),
        buffer_frames: feed.len(),
        buffer_duration_seconds: feed.len() as f64 / stream.fps as f64,
        uptime_seconds: stream.uptime_seconds(),
        error: feed.error.clone(),
    }
}
