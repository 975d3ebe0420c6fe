//! camwatch-client - Ingestion service client
//!
//! Talks to the external camera ingestion service: frame polling, the live
//! stream roster, and stream start/stop. Callers depend on the [`StreamApi`]
//! trait so the service can be swapped for a fake in tests.

mod client;
mod error;
mod types;

pub use client::{interpret_frame_response, IngestClient, StreamApi, DEFAULT_TIMEOUT};
pub use error::{ClientError, PollFailure};
pub use types::{
    ErrorBody, FrameMetadata, FramePayload, FrameResponse, PollResult, StartStreamRequest,
    StreamEntry, StreamList, StreamStarted, StreamStopped,
};
