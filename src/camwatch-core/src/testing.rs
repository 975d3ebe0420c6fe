//! Scripted ingestion service for unit tests

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use camwatch_client::{
    ClientError, PollResult, StartStreamRequest, StreamApi, StreamEntry, StreamStarted,
    StreamStopped,
};

pub(crate) fn jpeg_base64(width: u32, height: u32) -> String {
    let img = RgbImage::from_pixel(width, height, Rgb([90, 160, 220]));
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 85)
        .encode_image(&img)
        .unwrap();
    BASE64_ENGINE.encode(bytes)
}

/// Returns queued results per camera, then a per-camera fallback, then `Empty`
#[derive(Default)]
pub(crate) struct ScriptedApi {
    frames: Mutex<HashMap<String, VecDeque<PollResult>>>,
    fallback: Mutex<HashMap<String, PollResult>>,
    fetches: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    roster: Mutex<Option<Vec<StreamEntry>>>,
    control_error: Mutex<Option<(u16, String)>>,
    started: Mutex<Vec<StartStreamRequest>>,
    stopped: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_frame(&self, camera_id: &str, result: PollResult) {
        self.frames
            .lock()
            .unwrap()
            .entry(camera_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub(crate) fn set_fallback(&self, camera_id: &str, result: PollResult) {
        self.fallback
            .lock()
            .unwrap()
            .insert(camera_id.to_string(), result);
    }

    /// Make every fetch for `camera_id` wait for a notification
    pub(crate) fn gate(&self, camera_id: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .unwrap()
            .entry(camera_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub(crate) fn fetch_count(&self, camera_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(camera_id)
            .copied()
            .unwrap_or(0)
    }

    /// `None` makes the list call fail
    pub(crate) fn set_roster(&self, entries: Option<Vec<StreamEntry>>) {
        *self.roster.lock().unwrap() = entries;
    }

    pub(crate) fn fail_control(&self, status: u16, message: &str) {
        *self.control_error.lock().unwrap() = Some((status, message.to_string()));
    }

    pub(crate) fn started(&self) -> Vec<StartStreamRequest> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    fn control_result(&self) -> Result<(), ClientError> {
        match self.control_error.lock().unwrap().clone() {
            Some((status, message)) => Err(ClientError::Api { status, message }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StreamApi for ScriptedApi {
    async fn fetch_frame(&self, camera_id: &str) -> PollResult {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(camera_id.to_string())
            .or_default() += 1;

        let gate = self.gates.lock().unwrap().get(camera_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let queued = self
            .frames
            .lock()
            .unwrap()
            .get_mut(camera_id)
            .and_then(|q| q.pop_front());
        queued
            .or_else(|| self.fallback.lock().unwrap().get(camera_id).cloned())
            .unwrap_or(PollResult::Empty)
    }

    async fn list_streams(&self) -> Result<Vec<StreamEntry>, ClientError> {
        self.roster
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::InvalidBody("roster unavailable".to_string()))
    }

    async fn start_stream(&self, request: &StartStreamRequest) -> Result<StreamStarted, ClientError> {
        self.control_result()?;
        self.started.lock().unwrap().push(request.clone());
        Ok(StreamStarted {
            message: "Stream started successfully".to_string(),
            camera_id: request.camera_id.clone(),
            buffer_capacity_frames: Some(60 * request.fps as u64),
        })
    }

    async fn stop_stream(&self, camera_id: &str) -> Result<StreamStopped, ClientError> {
        self.control_result()?;
        self.stopped.lock().unwrap().push(camera_id.to_string());
        Ok(StreamStopped {
            message: "Stream stopped successfully".to_string(),
            camera_id: camera_id.to_string(),
            ..Default::default()
        })
    }
}
