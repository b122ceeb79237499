//! The per-frame pass graph.
//!
//! Passes are planned as plain data from the frame's config snapshot and then
//! handed to a [`RenderBackend`](super::RenderBackend) in order. Keeping the
//! plan separate from the encoding is what lets the ordering rules be tested
//! without a GPU.

use crate::config::PipelineConfig;

/// Upper bound on horizontal+vertical blur iterations per frame.
pub const MAX_BLUR_PASSES: u32 = 16;

/// Off-screen render targets owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Background and lines, full resolution.
    Scene,
    /// Bright-pass output and vertical blur output, half resolution.
    BloomA,
    /// Horizontal blur output, half resolution.
    BloomB,
    /// Scene + bloom when a post-process stage follows, full resolution.
    Composite,
    /// Finished frame read by `composite_onto`, full resolution.
    Present,
}

impl Target {
    pub const ALL: [Target; 5] = [
        Target::Scene,
        Target::BloomA,
        Target::BloomB,
        Target::Composite,
        Target::Present,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Target::Scene => "Scene Target",
            Target::BloomA => "Bloom Target A",
            Target::BloomB => "Bloom Target B",
            Target::Composite => "Composite Target",
            Target::Present => "Present Target",
        }
    }

    pub fn is_half_resolution(self) -> bool {
        matches!(self, Target::BloomA | Target::BloomB)
    }

    /// Size of this target for a `width` x `height` output.
    pub fn size_for(self, width: u32, height: u32) -> (u32, u32) {
        if self.is_half_resolution() {
            ((width / 2).max(1), (height / 2).max(1))
        } else {
            (width, height)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

/// One GPU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Clear a target to transparent black.
    Clear(Target),
    /// Noise backdrop into the scene.
    Background,
    /// Additive line draw into the scene.
    Lines { count: u32 },
    /// Luminance threshold from the scene into `BloomA`.
    BrightExtract,
    Blur {
        direction: BlurDirection,
        source: Target,
        dest: Target,
    },
    /// Scene + `BloomA` * strength into `dest`.
    Composite { dest: Target },
    /// Chromatic aberration and colour grading from `source` into `Present`.
    PostProcess { source: Target },
    /// Texture copy.
    Blit { source: Target, dest: Target },
}

impl Pass {
    /// Whether the pass issues a draw call (clears and blits do not).
    pub fn is_draw(&self) -> bool {
        !matches!(self, Pass::Clear(_) | Pass::Blit { .. })
    }
}

/// Passes issued by `begin_frame`.
pub fn plan_begin_frame(config: &PipelineConfig) -> Vec<Pass> {
    let mut passes = vec![Pass::Clear(Target::Scene)];
    if config.background.enabled {
        passes.push(Pass::Background);
    }
    passes
}

/// Passes issued by `end_frame`, after the lines are in the scene.
pub fn plan_end_frame(config: &PipelineConfig) -> Vec<Pass> {
    let post = config.post_processing_enabled();

    if !config.bloom.enabled {
        return if post {
            vec![Pass::PostProcess {
                source: Target::Scene,
            }]
        } else {
            vec![Pass::Blit {
                source: Target::Scene,
                dest: Target::Present,
            }]
        };
    }

    let iterations = config.bloom.passes.min(MAX_BLUR_PASSES) as usize;
    let mut passes = Vec::with_capacity(3 + iterations * 2);
    passes.push(Pass::BrightExtract);
    for _ in 0..iterations {
        passes.push(Pass::Blur {
            direction: BlurDirection::Horizontal,
            source: Target::BloomA,
            dest: Target::BloomB,
        });
        passes.push(Pass::Blur {
            direction: BlurDirection::Vertical,
            source: Target::BloomB,
            dest: Target::BloomA,
        });
    }

    if post {
        passes.push(Pass::Composite {
            dest: Target::Composite,
        });
        passes.push(Pass::PostProcess {
            source: Target::Composite,
        });
    } else {
        passes.push(Pass::Composite {
            dest: Target::Present,
        });
    }
    passes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_frame_is_a_single_blit() {
        let config = PipelineConfig::minimal();
        assert_eq!(
            plan_end_frame(&config),
            vec![Pass::Blit {
                source: Target::Scene,
                dest: Target::Present
            }]
        );
    }

    #[test]
    fn test_bloom_alternates_horizontal_then_vertical() {
        let mut config = PipelineConfig::minimal();
        config.bloom.enabled = true;
        config.bloom.passes = 4;
        let passes = plan_end_frame(&config);

        assert_eq!(passes.first(), Some(&Pass::BrightExtract));
        assert_eq!(
            passes.last(),
            Some(&Pass::Composite {
                dest: Target::Present
            })
        );
        let blurs: Vec<BlurDirection> = passes
            .iter()
            .filter_map(|p| match p {
                Pass::Blur { direction, .. } => Some(*direction),
                _ => None,
            })
            .collect();
        assert_eq!(blurs.len(), 8);
        for pair in blurs.chunks(2) {
            assert_eq!(pair, [BlurDirection::Horizontal, BlurDirection::Vertical]);
        }
    }

    #[test]
    fn test_blur_iterations_are_capped() {
        let mut config = PipelineConfig::minimal();
        config.bloom.enabled = true;
        config.bloom.passes = u32::MAX;
        let passes = plan_end_frame(&config);

        let blurs = passes
            .iter()
            .filter(|p| matches!(p, Pass::Blur { .. }))
            .count();
        assert_eq!(blurs, MAX_BLUR_PASSES as usize * 2);
        assert_eq!(passes.len(), MAX_BLUR_PASSES as usize * 2 + 2);
    }

    #[test]
    fn test_post_processing_routes_through_composite_target() {
        let mut config = PipelineConfig::default();
        config.color_grading.enabled = true;
        let passes = plan_end_frame(&config);
        let n = passes.len();
        assert_eq!(
            passes[n - 2],
            Pass::Composite {
                dest: Target::Composite
            }
        );
        assert_eq!(
            passes[n - 1],
            Pass::PostProcess {
                source: Target::Composite
            }
        );
    }

    #[test]
    fn test_post_without_bloom_reads_scene() {
        let mut config = PipelineConfig::minimal();
        config.chromatic_aberration.enabled = true;
        assert_eq!(
            plan_end_frame(&config),
            vec![Pass::PostProcess {
                source: Target::Scene
            }]
        );
    }

    #[test]
    fn test_begin_frame_skips_disabled_background() {
        let mut config = PipelineConfig::default();
        assert_eq!(plan_begin_frame(&config).len(), 2);
        config.background.enabled = false;
        assert_eq!(plan_begin_frame(&config), vec![Pass::Clear(Target::Scene)]);
    }

    #[test]
    fn test_bloom_targets_are_half_size() {
        assert_eq!(Target::BloomA.size_for(801, 600), (400, 300));
        assert_eq!(Target::Scene.size_for(801, 600), (801, 600));
        assert_eq!(Target::BloomB.size_for(1, 1), (1, 1));
    }
}
