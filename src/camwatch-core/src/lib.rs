//! Camwatch Core Library
//!
//! Client-side stream synchronization: camera roster, per-camera poll
//! timers, roster reconciliation, and dashboard orchestration.

pub mod colored_logger;
pub mod config;
pub mod dashboard;
pub mod metrics;
pub mod reconciler;
pub mod roster;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;
