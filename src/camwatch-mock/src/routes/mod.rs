//! HTTP route handlers

pub mod stream;

pub use stream::*;
