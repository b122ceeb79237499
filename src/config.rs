//! Pipeline configuration.
//!
//! Every visual effect has its own plain struct with public fields and a
//! `Default`. The compositor holds the live [`PipelineConfig`] and exposes one
//! closure setter per group, so a caller only touches the fields it cares
//! about:
//!
//! ```ignore
//! compositor
//!     .set_bloom(|b| {
//!         b.strength = 1.8;
//!         b.passes = 4;
//!     })
//!     .set_visual(|v| v.max_hue = 300.0);
//! ```
//!
//! Nothing here is validated. Out-of-range values change how the frame looks
//! but never stop the pipeline.

/// Line colour and opacity.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualConfig {
    /// Hue (degrees) used for the slowest segments.
    pub min_hue: f32,
    /// Hue (degrees) used for segments at or above `max_speed`.
    pub max_hue: f32,
    /// HSL saturation (0.0-1.0).
    pub saturation: f32,
    /// HSL lightness (0.0-1.0).
    pub lightness: f32,
    /// Alpha of the newest segment; older segments fade towards zero.
    pub max_alpha: f32,
    /// Line width in pixels.
    pub line_width: f32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            min_hue: 190.0,
            max_hue: 330.0,
            saturation: 0.85,
            lightness: 0.55,
            max_alpha: 0.8,
            line_width: 1.5,
        }
    }
}

/// Bright-pass, blur and composite settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomConfig {
    pub enabled: bool,
    /// Luminance above which a pixel contributes to the glow.
    pub threshold: f32,
    /// Multiplier applied to the blurred glow when it is added back.
    pub strength: f32,
    /// Blur tap spacing in half-resolution texels.
    pub radius: f32,
    /// Horizontal + vertical blur iterations.
    pub passes: u32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.35,
            strength: 1.2,
            radius: 1.0,
            passes: 3,
        }
    }
}

/// Animated noise backdrop drawn before the lines.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundConfig {
    pub enabled: bool,
    /// Base colour (RGB, 0.0-1.0).
    pub base_color: [f32; 3],
    /// Colour added in proportion to the noise value.
    pub noise_color: [f32; 3],
    /// Opacity of the backdrop over the cleared target.
    pub alpha: f32,
    /// Overall noise contribution.
    pub intensity: f32,
    /// Noise frequency across the screen height.
    pub noise_scale: f32,
    /// Scroll velocity of the first noise layer (uv per second).
    pub drift_a: [f32; 2],
    /// Scroll velocity of the second noise layer.
    pub drift_b: [f32; 2],
    /// Radial darkening towards the corners (0.0 = none).
    pub vignette: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_color: [0.008, 0.008, 0.025],
            noise_color: [0.05, 0.03, 0.11],
            alpha: 1.0,
            intensity: 0.6,
            noise_scale: 3.0,
            drift_a: [0.012, 0.004],
            drift_b: [-0.006, 0.011],
            vignette: 0.8,
        }
    }
}

/// Per-particle flicker.
///
/// The timing fields drive [`Trajectory::update_blink`](crate::Trajectory::update_blink);
/// the boost fields are read by the line shader.
#[derive(Debug, Clone, PartialEq)]
pub struct BlinkConfig {
    pub enabled: bool,
    /// Probability of starting a blink per 1/60 s reference tick.
    pub chance: f32,
    /// Shortest blink in seconds.
    pub min_duration: f32,
    /// Longest blink in seconds.
    pub max_duration: f32,
    /// Saturation added at full blink intensity.
    pub saturation_boost: f32,
    /// Lightness added at full blink intensity.
    pub lightness_boost: f32,
    /// Relative alpha boost at full blink intensity.
    pub alpha_boost: f32,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chance: 0.002,
            min_duration: 0.15,
            max_duration: 0.6,
            saturation_boost: 0.2,
            lightness_boost: 0.3,
            alpha_boost: 0.8,
        }
    }
}

/// Travelling brightness waves and sparks along each trail.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyFlowConfig {
    pub enabled: bool,
    /// Wave travel speed (radians per second).
    pub speed: f32,
    /// Wave count along a trail.
    pub frequency: f32,
    /// Brightness modulation depth.
    pub amplitude: f32,
    /// Sine level above which a spark fires (close to 1.0 keeps them sparse).
    pub spark_threshold: f32,
    /// Extra brightness of a spark at its peak.
    pub spark_intensity: f32,
    /// Spatial frequency of the spark sine.
    pub spark_frequency: f32,
}

impl Default for EnergyFlowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speed: 2.0,
            frequency: 12.0,
            amplitude: 0.35,
            spark_threshold: 0.985,
            spark_intensity: 1.5,
            spark_frequency: 60.0,
        }
    }
}

/// Fades distant segments towards a fog colour.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFogConfig {
    pub enabled: bool,
    pub density: f32,
    pub color: [f32; 3],
}

impl Default for DepthFogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            density: 0.8,
            color: [0.02, 0.02, 0.05],
        }
    }
}

/// Hue shimmer that varies along the trail and with depth.
#[derive(Debug, Clone, PartialEq)]
pub struct IridescenceConfig {
    pub enabled: bool,
    /// Maximum hue shift in degrees.
    pub strength: f32,
    pub frequency: f32,
    pub speed: f32,
}

impl Default for IridescenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 25.0,
            frequency: 6.0,
            speed: 0.5,
        }
    }
}

/// Radial per-channel sample offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromaticAberrationConfig {
    pub enabled: bool,
    /// Offset of the red and blue channels in uv units at the screen edge.
    pub strength: f32,
}

impl Default for ChromaticAberrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 0.004,
        }
    }
}

/// Filmic grade applied as the last GPU pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGradingConfig {
    pub enabled: bool,
    pub exposure: f32,
    pub vignette: f32,
    /// Positive values push towards orange, negative towards blue.
    pub warmth: f32,
    /// Film grain amplitude.
    pub grain: f32,
}

impl Default for ColorGradingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exposure: 1.0,
            vignette: 0.4,
            warmth: 0.1,
            grain: 0.03,
        }
    }
}

/// CPU-side outer glow drawn beneath the frame in
/// [`GpuCompositor::composite_onto`](crate::GpuCompositor::composite_onto).
#[derive(Debug, Clone, PartialEq)]
pub struct GlowConfig {
    pub enabled: bool,
    /// Gaussian sigma in pixels.
    pub radius: f32,
    /// Opacity of the blurred copy.
    pub opacity: f32,
}

impl Default for GlowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 8.0,
            opacity: 0.35,
        }
    }
}

/// Complete compositor configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub visual: VisualConfig,
    pub bloom: BloomConfig,
    pub background: BackgroundConfig,
    pub blink: BlinkConfig,
    pub energy_flow: EnergyFlowConfig,
    pub depth_fog: DepthFogConfig,
    pub iridescence: IridescenceConfig,
    pub chromatic_aberration: ChromaticAberrationConfig,
    pub color_grading: ColorGradingConfig,
    pub glow: GlowConfig,
}

impl PipelineConfig {
    /// Create a config with every group at its defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any full-screen stage runs after the composite.
    pub fn post_processing_enabled(&self) -> bool {
        self.chromatic_aberration.enabled || self.color_grading.enabled
    }

    /// Turn off every optional stage, leaving background and lines.
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.bloom.enabled = false;
        config.chromatic_aberration.enabled = false;
        config.color_grading.enabled = false;
        config.glow.enabled = false;
        config
    }
}
