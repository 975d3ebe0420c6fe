//! camwatch-render - Frame decoding and preview painting
//!
//! Turns base64 image payloads into pixels on a fixed-size [`Surface`],
//! scaled with "contain" semantics. Decoding never panics: a bad payload
//! becomes a placeholder paint.

mod decode;
mod error;
mod surface;

pub use decode::{decode_payload, fit_contain, prepare_frame, Placement, PreparedFrame};
pub use error::{RenderError, Result};
pub use surface::{Surface, SurfaceContent, DEFAULT_HEIGHT, DEFAULT_WIDTH};
