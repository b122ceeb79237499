//! CPU-side presentation of a finished frame onto the caller's image.

use image::{imageops, RgbaImage};

use crate::config::GlowConfig;

/// Largest glow radius honoured, in pixels. Larger values are clamped.
pub const MAX_GLOW_RADIUS: f32 = 64.0;

/// A blurred, faded copy of `frame` with `pad` pixels of margin on every side.
#[derive(Debug, Clone)]
pub struct GlowLayer {
    pub image: RgbaImage,
    pub pad: u32,
}

/// Build the outer glow drawn beneath `frame`.
pub fn glow_layer(frame: &RgbaImage, glow: &GlowConfig) -> GlowLayer {
    // NaN falls through `max` as 0.0
    let radius = glow.radius.max(0.0).min(MAX_GLOW_RADIUS);
    let pad = (radius * 2.0).ceil() as u32;

    let margin = pad.saturating_mul(2);
    let mut padded = RgbaImage::new(
        frame.width().saturating_add(margin),
        frame.height().saturating_add(margin),
    );
    imageops::overlay(&mut padded, frame, pad as i64, pad as i64);

    let mut image = if radius > 0.0 {
        imageops::blur(&padded, radius * 0.5)
    } else {
        padded
    };

    let opacity = glow.opacity.clamp(0.0, 1.0);
    for pixel in image.pixels_mut() {
        pixel.0[3] = (pixel.0[3] as f32 * opacity).round() as u8;
    }
    GlowLayer { image, pad }
}

/// Draw `frame` onto `surface` at (`x`, `y`), with its glow beneath when enabled.
///
/// Offsets may be negative or run past the surface; the overlap is clipped.
pub fn present(surface: &mut RgbaImage, frame: &RgbaImage, x: i64, y: i64, glow: &GlowConfig) {
    if glow.enabled && glow.opacity > 0.0 {
        let layer = glow_layer(frame, glow);
        let pad = layer.pad as i64;
        imageops::overlay(surface, &layer.image, x - pad, y - pad);
    }
    imageops::overlay(surface, frame, x, y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn glow(radius: f32, opacity: f32) -> GlowConfig {
        GlowConfig {
            enabled: true,
            radius,
            opacity,
        }
    }

    #[test]
    fn test_glow_layer_is_padded_and_faded() {
        let frame = RgbaImage::from_pixel(10, 6, Rgba([255, 255, 255, 255]));
        let layer = glow_layer(&frame, &glow(4.0, 0.5));
        assert_eq!(layer.pad, 8);
        assert_eq!(layer.image.dimensions(), (26, 22));
        assert!(layer.image.pixels().all(|p| p.0[3] <= 128));
        // blur spreads into the margin
        assert!(layer.image.get_pixel(7, 11).0[3] > 0);
    }

    #[test]
    fn test_glow_radius_is_clamped() {
        let frame = RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 255]));
        let layer = glow_layer(&frame, &glow(3.0e9, 0.5));
        let pad = (MAX_GLOW_RADIUS * 2.0) as u32;
        assert_eq!(layer.pad, pad);
        assert_eq!(layer.image.dimensions(), (16 + pad * 2, 16 + pad * 2));

        for radius in [f32::INFINITY, f32::NAN, -5.0] {
            let layer = glow_layer(&frame, &glow(radius, 0.5));
            assert!(layer.pad <= pad);
        }
    }

    #[test]
    fn test_present_without_glow_copies_frame() {
        let mut surface = RgbaImage::new(8, 8);
        let frame = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        present(&mut surface, &frame, 3, 4, &GlowConfig::default());
        assert_eq!(surface.get_pixel(3, 4), &Rgba([10, 20, 30, 255]));
        assert_eq!(surface.get_pixel(4, 5), &Rgba([10, 20, 30, 255]));
        assert_eq!(surface.get_pixel(2, 4).0[3], 0);
    }

    #[test]
    fn test_present_clips_negative_offsets() {
        let mut surface = RgbaImage::new(4, 4);
        let frame = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        present(&mut surface, &frame, -2, -2, &glow(2.0, 0.35));
        assert_eq!(surface.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(surface.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
    }
}
