//! Synthetic camera frames

use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, Rgb, RgbImage};

pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 360;
const JPEG_QUALITY: u8 = 85;

const BACKGROUND: Rgb<u8> = Rgb([20, 30, 40]);
const HEADER: Rgb<u8> = Rgb([34, 139, 34]);
const FOOTER: Rgb<u8> = Rgb([70, 130, 180]);
const BAR_HEIGHT: u32 = 30;
const STRIPE_PITCH: u32 = 40;
const STRIPE_WIDTH: u32 = 20;
const STRIPE_MARGIN: u32 = 50;

/// Render frame `frame_number` as JPEG bytes
///
/// Header and footer bars frame a row of stripes that drift two pixels per
/// frame, so consecutive frames are visibly different.
pub fn render_frame(frame_number: u64, width: u32, height: u32) -> ImageResult<Vec<u8>> {
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    fill_rect(&mut img, 0, 0, width, BAR_HEIGHT.min(height), HEADER);
    fill_rect(
        &mut img,
        0,
        height.saturating_sub(BAR_HEIGHT),
        width,
        BAR_HEIGHT.min(height),
        FOOTER,
    );

    let stripe_height = height.saturating_sub(2 * STRIPE_MARGIN);
    let shift = (frame_number.wrapping_mul(2) % width.max(1) as u64) as u32;
    for i in (0..width).step_by(STRIPE_PITCH as usize) {
        let x = (i + shift) % width;
        let shade = (128.0 + 127.0 * (i as f32 / width as f32)) as u8;
        let color = Rgb([shade, 50, 200u8.saturating_sub(shade)]);
        fill_rect(&mut img, x, STRIPE_MARGIN, STRIPE_WIDTH, stripe_height, color);
    }

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&img)?;
    Ok(bytes)
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = x.saturating_add(w).min(img.width());
    let y_end = y.saturating_add(h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_frame_is_decodable_jpeg() {
        let bytes = render_frame(0, 160, 120).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (160, 120));
    }

    #[test]
    fn test_frames_drift() {
        let a = render_frame(0, 160, 120).unwrap();
        let b = render_frame(5, 160, 120).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tiny_frame_does_not_panic() {
        assert!(render_frame(3, 8, 8).is_ok());
    }
}
