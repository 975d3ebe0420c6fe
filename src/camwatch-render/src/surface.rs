//! Fixed-size preview surface

use image::{Rgba, RgbaImage};

use crate::decode::PreparedFrame;

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 360;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const PLACEHOLDER_BACKGROUND: Rgba<u8> = Rgba([0x1a, 0x1a, 0x1a, 255]);
const PLACEHOLDER_INDICATOR: Rgba<u8> = Rgba([0xef, 0x44, 0x44, 255]);

/// What the surface currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceContent {
    Blank,
    Frame { sequence: u64 },
    DecodeFailed { sequence: u64 },
}

/// Drawing target for one camera preview
///
/// Dimensions are fixed at construction. Every paint replaces the whole
/// buffer, so no pixels survive from an earlier frame.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: RgbaImage,
    content: SurfaceContent,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND),
            content: SurfaceContent::Blank,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn content(&self) -> SurfaceContent {
        self.content
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Reset to the blank background
    pub fn clear(&mut self) {
        fill(&mut self.pixels, BACKGROUND);
        self.content = SurfaceContent::Blank;
    }

    /// Clear, then draw `frame` at its contain-fit placement
    pub fn paint(&mut self, frame: &PreparedFrame, sequence: u64) {
        fill(&mut self.pixels, BACKGROUND);
        image::imageops::overlay(
            &mut self.pixels,
            &frame.image,
            frame.placement.x as i64,
            frame.placement.y as i64,
        );
        self.content = SurfaceContent::Frame { sequence };
    }

    /// Replace the contents with the "decode failed" placeholder
    ///
    /// Solid dark background with a red crossed box in the middle.
    pub fn paint_decode_failure(&mut self, sequence: u64) {
        fill(&mut self.pixels, PLACEHOLDER_BACKGROUND);

        let (w, h) = self.pixels.dimensions();
        let side = (w.min(h) / 3).max(3);
        let left = (w - side.min(w)) / 2;
        let top = (h - side.min(h)) / 2;
        let thickness = (side / 24).max(1);

        for d in 0..side {
            for t in 0..thickness {
                // Box outline
                self.put(left + d, top + t);
                self.put(left + d, top + side - 1 - t);
                self.put(left + t, top + d);
                self.put(left + side - 1 - t, top + d);
                // Cross
                self.put(left + d, top + (d + t).min(side - 1));
                self.put(left + d, top + (side - 1 - d).saturating_sub(t));
            }
        }

        self.content = SurfaceContent::DecodeFailed { sequence };
    }

    /// Encode the current contents as PNG
    pub fn to_png(&self) -> image::ImageResult<Vec<u8>> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        self.pixels.write_to(&mut bytes, image::ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    fn put(&mut self, x: u32, y: u32) {
        if x < self.pixels.width() && y < self.pixels.height() {
            self.pixels.put_pixel(x, y, PLACEHOLDER_INDICATOR);
        }
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

fn fill(pixels: &mut RgbaImage, color: Rgba<u8>) {
    for p in pixels.pixels_mut() {
        *p = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::prepare_frame;
    use crate::decode::tests::jpeg_base64;

    fn close(a: Rgba<u8>, b: [u8; 3]) -> bool {
        a.0.iter()
            .zip(b.iter())
            .all(|(x, y)| (*x as i16 - *y as i16).abs() <= 12)
    }

    #[test]
    fn test_new_surface_is_blank() {
        let surface = Surface::default();
        assert_eq!((surface.width(), surface.height()), (640, 360));
        assert_eq!(surface.content(), SurfaceContent::Blank);
        assert_eq!(*surface.pixels().get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn test_paint_contain_letterboxes() {
        let mut surface = Surface::default();
        let frame = prepare_frame(&jpeg_base64(64, 64, [250, 250, 250]), 640, 360).unwrap();
        surface.paint(&frame, 7);

        assert_eq!(surface.content(), SurfaceContent::Frame { sequence: 7 });
        // Pillarbox bars stay background
        assert_eq!(*surface.pixels().get_pixel(10, 180), BACKGROUND);
        assert_eq!(*surface.pixels().get_pixel(630, 180), BACKGROUND);
        // Center shows the image
        assert!(close(*surface.pixels().get_pixel(320, 180), [250, 250, 250]));
    }

    #[test]
    fn test_paint_leaves_no_ghost_of_previous_frame() {
        let mut surface = Surface::default();
        let full = prepare_frame(&jpeg_base64(160, 90, [240, 20, 20]), 640, 360).unwrap();
        surface.paint(&full, 1);
        assert!(close(*surface.pixels().get_pixel(10, 180), [240, 20, 20]));

        let square = prepare_frame(&jpeg_base64(50, 50, [20, 20, 240]), 640, 360).unwrap();
        surface.paint(&square, 2);

        // Area outside the new image is cleared, not the old red
        assert_eq!(*surface.pixels().get_pixel(10, 180), BACKGROUND);
        assert!(close(*surface.pixels().get_pixel(320, 180), [20, 20, 240]));
    }

    #[test]
    fn test_decode_failure_placeholder() {
        let mut surface = Surface::default();
        let full = prepare_frame(&jpeg_base64(160, 90, [240, 240, 240]), 640, 360).unwrap();
        surface.paint(&full, 1);

        surface.paint_decode_failure(2);
        assert_eq!(surface.content(), SurfaceContent::DecodeFailed { sequence: 2 });
        assert_eq!(*surface.pixels().get_pixel(0, 0), PLACEHOLDER_BACKGROUND);

        let indicator = surface
            .pixels()
            .pixels()
            .filter(|p| **p == PLACEHOLDER_INDICATOR)
            .count();
        assert!(indicator > 0, "placeholder should draw an indicator");
        assert!(surface.pixels().pixels().all(|p| *p == PLACEHOLDER_BACKGROUND || *p == PLACEHOLDER_INDICATOR));
    }

    #[test]
    fn test_clear_resets_content() {
        let mut surface = Surface::new(32, 18);
        surface.paint_decode_failure(4);
        surface.clear();
        assert_eq!(surface.content(), SurfaceContent::Blank);
        assert!(surface.pixels().pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn test_to_png_roundtrips_dimensions() {
        let surface = Surface::new(32, 18);
        let png = surface.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 18));
    }
}
