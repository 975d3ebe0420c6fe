//! reqwest-backed implementation of the ingestion service contract

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, PollFailure};
use crate::types::{
    ErrorBody, FrameResponse, PollResult, StartStreamRequest, StreamEntry, StreamList,
    StreamStarted, StreamStopped,
};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// The four operations the dashboard needs from the ingestion service
#[async_trait]
pub trait StreamApi: Send + Sync {
    /// `GET ?camera_id={id}&action=stream`. Never fails: every outcome,
    /// including transport errors, is folded into the returned result.
    async fn fetch_frame(&self, camera_id: &str) -> PollResult;

    /// `GET ?action=list`
    async fn list_streams(&self) -> Result<Vec<StreamEntry>, ClientError>;

    /// `POST` with `{camera_id, rtsp_url, fps}`
    async fn start_stream(&self, request: &StartStreamRequest) -> Result<StreamStarted, ClientError>;

    /// `DELETE ?camera_id={id}`
    async fn stop_stream(&self, camera_id: &str) -> Result<StreamStopped, ClientError>;
}

/// HTTP client for a single ingestion endpoint
#[derive(Debug, Clone)]
pub struct IngestClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl IngestClient {
    /// Create a client for `endpoint` with the given request timeout
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl StreamApi for IngestClient {
    async fn fetch_frame(&self, camera_id: &str) -> PollResult {
        let response = match self
            .http
            .get(self.endpoint.clone())
            .query(&[("camera_id", camera_id), ("action", "stream")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return PollResult::Failure(PollFailure::from_transport(&e)),
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT || !status.is_success() {
            return interpret_frame_response(status, &[]);
        }

        match response.bytes().await {
            Ok(body) => interpret_frame_response(status, &body),
            Err(e) => PollResult::Failure(PollFailure::from_transport(&e)),
        }
    }

    async fn list_streams(&self) -> Result<Vec<StreamEntry>, ClientError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[("action", "list")])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let list: StreamList = serde_json::from_slice(&body)
            .map_err(|e| ClientError::InvalidBody(e.to_string()))?;
        debug!("roster lists {} live stream(s)", list.streams.len());
        Ok(list.streams)
    }

    async fn start_stream(&self, request: &StartStreamRequest) -> Result<StreamStarted, ClientError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }

    async fn stop_stream(&self, camera_id: &str) -> Result<StreamStopped, ClientError> {
        let response = self
            .http
            .delete(self.endpoint.clone())
            .query(&[("camera_id", camera_id)])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }
}

/// Interpret a stream response status and body
///
/// 204 is "no frame yet", any other non-2xx status is a failure carrying the
/// code, and a 2xx body is parsed as a frame response.
pub fn interpret_frame_response(status: StatusCode, body: &[u8]) -> PollResult {
    if status == StatusCode::NO_CONTENT {
        return PollResult::Empty;
    }
    if !status.is_success() {
        return PollResult::Failure(PollFailure::Server(status.as_u16()));
    }

    match serde_json::from_slice::<FrameResponse>(body) {
        Ok(frame) => frame.into_poll_result(),
        Err(e) => PollResult::Failure(PollFailure::InvalidBody(e.to_string())),
    }
}

/// Build an API error from a non-success response, preferring the `{error}` body
fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                text
            }
        });

    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}
