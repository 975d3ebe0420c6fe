//! Camwatch Mock Ingestion Service
//!
//! Serves the stream control and frame polling endpoint the dashboard
//! talks to, backed by synthetic JPEG frames instead of real cameras.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod synth;

pub use error::ApiError;
pub use server::{router, serve, serve_listener, STREAM_PATH};
pub use state::MockState;
