//! Base64 payload decoding and contain-fit scaling
//!
//! Everything here is CPU-bound and synchronous. Callers on an async runtime
//! run [`prepare_frame`] on a blocking thread.

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::error::{RenderError, Result};

/// Where a scaled image lands on the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A decoded frame already scaled for a surface of known size
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub image: RgbaImage,
    pub placement: Placement,
    pub source_width: u32,
    pub source_height: u32,
}

/// Decode a base64 payload into an image
///
/// Accepts either a bare base64 string or a `data:image/...;base64,` URL.
pub fn decode_payload(payload: &str) -> Result<DynamicImage> {
    let encoded = payload
        .split_once(";base64,")
        .map(|(_, data)| data)
        .unwrap_or(payload)
        .trim();

    if encoded.is_empty() {
        return Err(RenderError::EmptyPayload);
    }

    let bytes = BASE64_ENGINE.decode(encoded)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(image)
}

/// Largest rectangle with the source aspect ratio that fits the target, centered
pub fn fit_contain(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Placement {
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Placement {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
    }

    let scale = f64::min(
        dst_width as f64 / src_width as f64,
        dst_height as f64 / src_height as f64,
    );

    let width = ((src_width as f64 * scale).round() as u32).clamp(1, dst_width);
    let height = ((src_height as f64 * scale).round() as u32).clamp(1, dst_height);

    Placement {
        x: (dst_width - width) / 2,
        y: (dst_height - height) / 2,
        width,
        height,
    }
}

/// Decode `payload` and scale it to fit a `width`x`height` surface
pub fn prepare_frame(payload: &str, width: u32, height: u32) -> Result<PreparedFrame> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidSurface { width, height });
    }

    let decoded = decode_payload(payload)?;
    let (source_width, source_height) = (decoded.width(), decoded.height());
    let placement = fit_contain(source_width, source_height, width, height);

    let rgba = decoded.to_rgba8();
    let image = if placement.width == source_width && placement.height == source_height {
        rgba
    } else {
        image::imageops::resize(&rgba, placement.width, placement.height, FilterType::Triangle)
    };

    debug!(
        "prepared {}x{} frame at {}x{}+{}+{}",
        source_width, source_height, placement.width, placement.height, placement.x, placement.y
    );

    Ok(PreparedFrame {
        image,
        placement,
        source_width,
        source_height,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    /// Solid-color JPEG encoded as base64
    pub(crate) fn jpeg_base64(width: u32, height: u32, color: [u8; 3]) -> String {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 90)
            .encode_image(&img)
            .unwrap();
        BASE64_ENGINE.encode(bytes)
    }

    #[test]
    fn test_fit_same_aspect_fills() {
        let p = fit_contain(1280, 720, 640, 360);
        assert_eq!(p, Placement { x: 0, y: 0, width: 640, height: 360 });
    }

    #[test]
    fn test_fit_square_is_pillarboxed() {
        let p = fit_contain(100, 100, 640, 360);
        assert_eq!(p, Placement { x: 140, y: 0, width: 360, height: 360 });
    }

    #[test]
    fn test_fit_wide_is_letterboxed() {
        let p = fit_contain(1000, 250, 640, 360);
        assert_eq!(p, Placement { x: 0, y: 100, width: 640, height: 160 });
    }

    #[test]
    fn test_fit_degenerate() {
        let p = fit_contain(0, 10, 640, 360);
        assert_eq!(p.width, 0);
        assert_eq!(p.height, 0);
    }

    #[test]
    fn test_decode_valid_jpeg() {
        let payload = jpeg_base64(32, 16, [200, 10, 10]);
        let img = decode_payload(&payload).unwrap();
        assert_eq!((img.width(), img.height()), (32, 16));
    }

    #[test]
    fn test_decode_data_url() {
        let payload = format!("data:image/jpeg;base64,{}", jpeg_base64(8, 8, [0, 0, 0]));
        assert!(decode_payload(&payload).is_ok());
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = decode_payload("not base64 at all!!").unwrap_err();
        assert!(matches!(err, RenderError::Base64(_)));
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        let payload = BASE64_ENGINE.encode(b"FRAME_7_CAM_cam-001_NO_PIL_AVAILABLE");
        let err = decode_payload(&payload).unwrap_err();
        assert!(matches!(err, RenderError::Image(_)));
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert!(matches!(decode_payload("  "), Err(RenderError::EmptyPayload)));
    }

    #[test]
    fn test_prepare_scales_to_placement() {
        let payload = jpeg_base64(64, 64, [10, 200, 10]);
        let frame = prepare_frame(&payload, 640, 360).unwrap();
        assert_eq!(frame.placement, Placement { x: 140, y: 0, width: 360, height: 360 });
        assert_eq!(frame.image.dimensions(), (360, 360));
        assert_eq!((frame.source_width, frame.source_height), (64, 64));
    }

    #[test]
    fn test_prepare_rejects_zero_surface() {
        let payload = jpeg_base64(8, 8, [0, 0, 0]);
        assert!(matches!(
            prepare_frame(&payload, 0, 360),
            Err(RenderError::InvalidSurface { .. })
        ));
    }
}
