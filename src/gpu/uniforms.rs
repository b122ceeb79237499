//! GPU memory layouts shared with the WGSL programs.

use bytemuck::{Pod, Zeroable};

use crate::config::PipelineConfig;
use crate::projector::Segment;

fn flag(enabled: bool) -> f32 {
    if enabled {
        1.0
    } else {
        0.0
    }
}

/// Per-frame uniform block, read by every program.
///
/// Every field is a `vec4<f32>` on the WGSL side, so the Rust layout needs no
/// padding. Booleans are stored as `0.0` / `1.0`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    /// width, height, 1/width, 1/height
    pub resolution: [f32; 4],
    /// time, hue offset, unused, unused
    pub clock: [f32; 4],
    /// min hue, max hue, saturation, lightness
    pub visual: [f32; 4],
    /// max alpha, line width, unused, unused
    pub visual_ext: [f32; 4],
    /// enabled, saturation boost, lightness boost, alpha boost
    pub blink: [f32; 4],
    /// enabled, speed, frequency, amplitude
    pub energy: [f32; 4],
    /// threshold, intensity, frequency, unused
    pub spark: [f32; 4],
    /// enabled, density, unused, unused
    pub fog: [f32; 4],
    /// rgb, unused
    pub fog_color: [f32; 4],
    /// enabled, strength, frequency, speed
    pub iridescence: [f32; 4],
    /// enabled, intensity, noise scale, vignette
    pub background: [f32; 4],
    /// rgb, alpha
    pub background_base: [f32; 4],
    /// rgb, unused
    pub background_noise: [f32; 4],
    /// layer A velocity, layer B velocity
    pub background_drift: [f32; 4],
    /// threshold, strength, radius, unused
    pub bloom: [f32; 4],
    /// enabled, strength, unused, unused
    pub aberration: [f32; 4],
    /// enabled, exposure, vignette, warmth
    pub grading: [f32; 4],
    /// grain, unused, unused, unused
    pub grading_ext: [f32; 4],
}

impl FrameUniforms {
    /// Pack a config snapshot for a `width` x `height` frame.
    pub fn from_config(config: &PipelineConfig, width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        let visual = &config.visual;
        let blink = &config.blink;
        let energy = &config.energy_flow;
        let fog = &config.depth_fog;
        let iridescence = &config.iridescence;
        let background = &config.background;
        let bloom = &config.bloom;
        let aberration = &config.chromatic_aberration;
        let grading = &config.color_grading;

        Self {
            resolution: [w, h, 1.0 / w, 1.0 / h],
            clock: [0.0; 4],
            visual: [visual.min_hue, visual.max_hue, visual.saturation, visual.lightness],
            visual_ext: [visual.max_alpha, visual.line_width, 0.0, 0.0],
            blink: [
                flag(blink.enabled),
                blink.saturation_boost,
                blink.lightness_boost,
                blink.alpha_boost,
            ],
            energy: [flag(energy.enabled), energy.speed, energy.frequency, energy.amplitude],
            spark: [energy.spark_threshold, energy.spark_intensity, energy.spark_frequency, 0.0],
            fog: [flag(fog.enabled), fog.density, 0.0, 0.0],
            fog_color: [fog.color[0], fog.color[1], fog.color[2], 0.0],
            iridescence: [
                flag(iridescence.enabled),
                iridescence.strength,
                iridescence.frequency,
                iridescence.speed,
            ],
            background: [
                flag(background.enabled),
                background.intensity,
                background.noise_scale,
                background.vignette,
            ],
            background_base: [
                background.base_color[0],
                background.base_color[1],
                background.base_color[2],
                background.alpha,
            ],
            background_noise: [
                background.noise_color[0],
                background.noise_color[1],
                background.noise_color[2],
                0.0,
            ],
            background_drift: [
                background.drift_a[0],
                background.drift_a[1],
                background.drift_b[0],
                background.drift_b[1],
            ],
            bloom: [bloom.threshold, bloom.strength, bloom.radius, 0.0],
            aberration: [flag(aberration.enabled), aberration.strength, 0.0, 0.0],
            grading: [flag(grading.enabled), grading.exposure, grading.vignette, grading.warmth],
            grading_ext: [grading.grain, 0.0, 0.0, 0.0],
        }
    }

    pub fn set_time(&mut self, time: f32) {
        self.clock[0] = time;
    }

    pub fn set_hue_offset(&mut self, hue_offset: f32) {
        self.clock[1] = hue_offset;
    }
}

/// One segment as uploaded to the line instance buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LineInstance {
    pub start: [f32; 2],
    pub end: [f32; 2],
    /// speed_norm, age, blink, seg_idx
    pub attrs: [f32; 4],
    pub depth: [f32; 2],
}

impl From<&Segment> for LineInstance {
    fn from(s: &Segment) -> Self {
        Self {
            start: [s.x1, s.y1],
            end: [s.x2, s.y2],
            attrs: [s.speed_norm, s.age, s.blink, s.seg_idx],
            depth: [s.depth1, s.depth2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_uniforms_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 18 * 16);
    }

    #[test]
    fn test_line_instance_stride() {
        assert_eq!(std::mem::size_of::<LineInstance>(), 40);
    }

    #[test]
    fn test_flags_and_resolution() {
        let mut config = PipelineConfig::default();
        config.depth_fog.enabled = true;
        config.color_grading.enabled = false;
        let u = FrameUniforms::from_config(&config, 200, 100);
        assert_eq!(u.resolution, [200.0, 100.0, 0.005, 0.01]);
        assert_eq!(u.fog[0], 1.0);
        assert_eq!(u.grading[0], 0.0);
    }

    #[test]
    fn test_segment_packing() {
        let segment = Segment {
            x1: 1.0,
            y1: 2.0,
            x2: 3.0,
            y2: 4.0,
            speed_norm: 0.5,
            age: 0.25,
            blink: 1.0,
            seg_idx: 0.75,
            depth1: 0.1,
            depth2: 0.2,
        };
        let line = LineInstance::from(&segment);
        assert_eq!(line.start, [1.0, 2.0]);
        assert_eq!(line.end, [3.0, 4.0]);
        assert_eq!(line.attrs, [0.5, 0.25, 1.0, 0.75]);
        assert_eq!(line.depth, [0.1, 0.2]);
    }
}
