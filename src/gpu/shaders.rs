//! WGSL programs used by the compositor.
//!
//! The program set is closed: every [`ProgramKind`] maps to exactly one WGSL
//! module. Sources are validated with naga before wgpu sees them, so a broken
//! program shows up as a readable [`GpuError::ShaderCompile`] instead of a
//! device error.

use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::GpuError;

/// The fixed set of programs compiled at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Lines,
    Background,
    BrightExtract,
    Blur,
    Composite,
    PostProcess,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 6] = [
        ProgramKind::Lines,
        ProgramKind::Background,
        ProgramKind::BrightExtract,
        ProgramKind::Blur,
        ProgramKind::Composite,
        ProgramKind::PostProcess,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Lines => "lines",
            ProgramKind::Background => "background",
            ProgramKind::BrightExtract => "bright-extract",
            ProgramKind::Blur => "blur",
            ProgramKind::Composite => "composite",
            ProgramKind::PostProcess => "post-process",
        }
    }

    /// Fragment entry points; each one becomes its own pipeline.
    pub fn fragment_entries(self) -> &'static [&'static str] {
        match self {
            ProgramKind::Blur => &["fs_horizontal", "fs_vertical"],
            _ => &["fs_main"],
        }
    }

    /// Number of sampled textures after the uniform block.
    pub fn texture_inputs(self) -> u32 {
        match self {
            ProgramKind::Lines | ProgramKind::Background => 0,
            ProgramKind::BrightExtract | ProgramKind::Blur | ProgramKind::PostProcess => 1,
            ProgramKind::Composite => 2,
        }
    }

    /// Full WGSL source.
    pub fn source(self) -> String {
        let body = match self {
            ProgramKind::Lines => LINES,
            ProgramKind::Background => BACKGROUND,
            ProgramKind::BrightExtract => BRIGHT_EXTRACT,
            ProgramKind::Blur => BLUR,
            ProgramKind::Composite => COMPOSITE,
            ProgramKind::PostProcess => POST_PROCESS,
        };
        let fullscreen = if self == ProgramKind::Lines { "" } else { FULLSCREEN };
        let sampling = match self.texture_inputs() {
            0 => "",
            _ => SOURCE_BINDINGS,
        };
        format!("{FRAME_UNIFORMS}{sampling}{fullscreen}{body}")
    }

    /// Parse and validate [`source`](Self::source) with naga.
    pub fn validate(self) -> Result<naga::Module, GpuError> {
        validate_wgsl(self, &self.source())
    }
}

/// Parse and validate WGSL written for `program`.
pub fn validate_wgsl(program: ProgramKind, source: &str) -> Result<naga::Module, GpuError> {
    let module = wgsl::parse_str(source).map_err(|err| GpuError::ShaderCompile {
        program,
        message: err.emit_to_string(source),
    })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|err| GpuError::ShaderCompile {
            program,
            message: format!("{}", err),
        })?;

    Ok(module)
}

const FRAME_UNIFORMS: &str = r#"
struct Frame {
    resolution: vec4<f32>,
    clock: vec4<f32>,
    visual: vec4<f32>,
    visual_ext: vec4<f32>,
    blink: vec4<f32>,
    energy: vec4<f32>,
    spark: vec4<f32>,
    fog: vec4<f32>,
    fog_color: vec4<f32>,
    iridescence: vec4<f32>,
    background: vec4<f32>,
    background_base: vec4<f32>,
    background_noise: vec4<f32>,
    background_drift: vec4<f32>,
    bloom: vec4<f32>,
    aberration: vec4<f32>,
    grading: vec4<f32>,
    grading_ext: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Frame;
"#;

const SOURCE_BINDINGS: &str = r#"
@group(0) @binding(1)
var source_texture: texture_2d<f32>;
@group(0) @binding(2)
var source_sampler: sampler;
"#;

const FULLSCREEN: &str = r#"
struct FullscreenOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> FullscreenOut {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    var uvs = array<vec2<f32>, 3>(
        vec2<f32>(0.0, 1.0),
        vec2<f32>(2.0, 1.0),
        vec2<f32>(0.0, -1.0),
    );

    var out: FullscreenOut;
    out.clip_position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    out.uv = uvs[vertex_index];
    return out;
}
"#;

const BACKGROUND: &str = r#"
fn hash21(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(127.1, 311.7))) * 43758.5453);
}

fn value_noise(p: vec2<f32>) -> f32 {
    let cell = floor(p);
    let f = fract(p);
    let u = f * f * (vec2<f32>(3.0) - 2.0 * f);
    let a = hash21(cell);
    let b = hash21(cell + vec2<f32>(1.0, 0.0));
    let c = hash21(cell + vec2<f32>(0.0, 1.0));
    let d = hash21(cell + vec2<f32>(1.0, 1.0));
    return mix(mix(a, b, u.x), mix(c, d, u.x), u.y);
}

fn fbm(origin: vec2<f32>) -> f32 {
    var p = origin;
    var value = 0.0;
    var amplitude = 0.5;
    for (var octave = 0; octave < 5; octave++) {
        value += amplitude * value_noise(p);
        p = p * 2.03 + vec2<f32>(1.7, 9.2);
        amplitude *= 0.5;
    }
    return value;
}

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let aspect = uniforms.resolution.x * uniforms.resolution.w;
    let scale = uniforms.background.z;
    let t = uniforms.clock.x;
    let p = vec2<f32>(in.uv.x * aspect, in.uv.y) * scale;

    // Two layers drifting independently
    let layer_a = fbm(p + uniforms.background_drift.xy * t * scale);
    let layer_b = fbm(p * 1.7 + uniforms.background_drift.zw * t * scale);
    let noise = (layer_a * 0.6 + layer_b * 0.4) * uniforms.background.y;

    let centered = in.uv - vec2<f32>(0.5);
    let vignette = 1.0 - smoothstep(0.2, 0.85, length(centered)) * uniforms.background.w;
    let rgb = (uniforms.background_base.rgb + uniforms.background_noise.rgb * noise) * vignette;
    return vec4<f32>(rgb, uniforms.background_base.a);
}
"#;

const LINES: &str = r#"
const TAU: f32 = 6.2831853;

struct SegmentInput {
    @location(0) start: vec2<f32>,
    @location(1) end: vec2<f32>,
    @location(2) attrs: vec4<f32>,
    @location(3) depth: vec2<f32>,
};

struct LineOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) edge: f32,
};

fn hsl_to_rgb(hue_degrees: f32, s: f32, l: f32) -> vec3<f32> {
    let h = fract(hue_degrees / 360.0);
    let n = vec3<f32>(0.0, 8.0, 4.0) + vec3<f32>(h * 12.0);
    let k = n - 12.0 * floor(n / 12.0);
    let a = s * min(l, 1.0 - l);
    let ramp = clamp(min(k - vec3<f32>(3.0), vec3<f32>(9.0) - k), vec3<f32>(-1.0), vec3<f32>(1.0));
    return vec3<f32>(l) - a * ramp;
}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    segment: SegmentInput,
) -> LineOutput {
    // x: 0 at start, 1 at end; y: side of the line
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[vertex_index];

    let delta = segment.end - segment.start;
    let len = max(length(delta), 0.0001);
    let dir = delta / len;
    let normal = vec2<f32>(-dir.y, dir.x);
    let half_width = max(uniforms.visual_ext.y, 0.5) * 0.5 + 0.5;
    let screen = mix(segment.start, segment.end, vec2<f32>(corner.x)) + normal * (corner.y * half_width);
    let ndc = vec2<f32>(
        screen.x * uniforms.resolution.z * 2.0 - 1.0,
        1.0 - screen.y * uniforms.resolution.w * 2.0,
    );

    let speed_norm = segment.attrs.x;
    let age = segment.attrs.y;
    let blink = segment.attrs.z * uniforms.blink.x;
    let seg_idx = segment.attrs.w;
    let depth = mix(segment.depth.x, segment.depth.y, corner.x);
    let t = uniforms.clock.x;

    var hue = mix(uniforms.visual.x, uniforms.visual.y, speed_norm) + uniforms.clock.y;
    if uniforms.iridescence.x > 0.5 {
        hue += sin(seg_idx * uniforms.iridescence.z + depth * TAU + t * uniforms.iridescence.w) * uniforms.iridescence.y;
    }
    let saturation = clamp(uniforms.visual.z + blink * uniforms.blink.y, 0.0, 1.0);
    let lightness = clamp(uniforms.visual.w + blink * uniforms.blink.z, 0.0, 1.0);
    var rgb = hsl_to_rgb(hue, saturation, lightness);

    var brightness = 1.0;
    if uniforms.energy.x > 0.5 {
        let phase = seg_idx * uniforms.energy.z - t * uniforms.energy.y;
        let flow = sin(phase) * 0.5
            + sin(phase * 2.3 + 1.7) * 0.3
            + sin(phase * 0.6 - t * 0.9) * 0.2;
        brightness += flow * uniforms.energy.w;

        let spark = sin(seg_idx * uniforms.spark.z + t * 7.0 + segment.start.x * 0.05);
        let threshold = uniforms.spark.x;
        if spark > threshold {
            brightness += uniforms.spark.y * (spark - threshold) / max(1.0 - threshold, 0.0001);
        }
    }
    rgb *= max(brightness, 0.0);

    var alpha = uniforms.visual_ext.x * (1.0 - age) * (1.0 + blink * uniforms.blink.w);
    if uniforms.fog.x > 0.5 {
        let fog_amount = clamp(depth * uniforms.fog.y, 0.0, 1.0);
        rgb = mix(rgb, uniforms.fog_color.rgb, vec3<f32>(fog_amount));
        alpha *= 1.0 - fog_amount * 0.5;
    }
    alpha = clamp(alpha, 0.0, 1.0);

    var out: LineOutput;
    out.clip_position = vec4<f32>(ndc, 0.0, 1.0);
    out.color = vec4<f32>(rgb * alpha, alpha);
    out.edge = corner.y;
    return out;
}

@fragment
fn fs_main(in: LineOutput) -> @location(0) vec4<f32> {
    let falloff = 1.0 - smoothstep(0.4, 1.0, abs(in.edge));
    return in.color * falloff;
}
"#;

const BRIGHT_EXTRACT: &str = r#"
@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let color = textureSampleLevel(source_texture, source_sampler, in.uv, 0.0).rgb;
    let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    let threshold = uniforms.bloom.x;
    let weight = smoothstep(threshold, threshold + 0.1, luminance);
    return vec4<f32>(color * weight, 1.0);
}
"#;

const BLUR: &str = r#"
fn gaussian(uv: vec2<f32>, direction: vec2<f32>) -> vec4<f32> {
    var weights = array<f32, 5>(0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);
    let texel = vec2<f32>(1.0) / vec2<f32>(textureDimensions(source_texture));
    let spacing = direction * texel * uniforms.bloom.z;

    var color = textureSampleLevel(source_texture, source_sampler, uv, 0.0).rgb * weights[0];
    for (var i = 1; i < 5; i++) {
        let offset = spacing * f32(i);
        color += textureSampleLevel(source_texture, source_sampler, uv + offset, 0.0).rgb * weights[i];
        color += textureSampleLevel(source_texture, source_sampler, uv - offset, 0.0).rgb * weights[i];
    }
    return vec4<f32>(color, 1.0);
}

@fragment
fn fs_horizontal(in: FullscreenOut) -> @location(0) vec4<f32> {
    return gaussian(in.uv, vec2<f32>(1.0, 0.0));
}

@fragment
fn fs_vertical(in: FullscreenOut) -> @location(0) vec4<f32> {
    return gaussian(in.uv, vec2<f32>(0.0, 1.0));
}
"#;

const COMPOSITE: &str = r#"
@group(0) @binding(3)
var bloom_texture: texture_2d<f32>;

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let scene = textureSampleLevel(source_texture, source_sampler, in.uv, 0.0).rgb;
    let bloom = textureSampleLevel(bloom_texture, source_sampler, in.uv, 0.0).rgb;
    return vec4<f32>(min(scene + bloom * uniforms.bloom.y, vec3<f32>(1.0)), 1.0);
}
"#;

const POST_PROCESS: &str = r#"
fn grain_hash(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

fn filmic(x: vec3<f32>) -> vec3<f32> {
    let numerator = x * (2.51 * x + vec3<f32>(0.03));
    let denominator = x * (2.43 * x + vec3<f32>(0.59)) + vec3<f32>(0.14);
    return clamp(numerator / denominator, vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
    let centered = in.uv - vec2<f32>(0.5);
    let dist = length(centered);

    var color: vec3<f32>;
    if uniforms.aberration.x > 0.5 {
        // Red pushed out, blue pulled in; no shift at the centre
        let amount = uniforms.aberration.y * smoothstep(0.0, 0.75, dist);
        let shift = centered / max(dist, 0.0001) * amount;
        color = vec3<f32>(
            textureSampleLevel(source_texture, source_sampler, in.uv + shift, 0.0).r,
            textureSampleLevel(source_texture, source_sampler, in.uv, 0.0).g,
            textureSampleLevel(source_texture, source_sampler, in.uv - shift, 0.0).b,
        );
    } else {
        color = textureSampleLevel(source_texture, source_sampler, in.uv, 0.0).rgb;
    }

    if uniforms.grading.x > 0.5 {
        color = filmic(color * uniforms.grading.y);
        let warmth = uniforms.grading.w;
        color += vec3<f32>(warmth * 0.08, warmth * 0.02, -warmth * 0.08);
        color *= 1.0 - smoothstep(0.35, 0.85, dist) * uniforms.grading.z;
        let grain = grain_hash(in.uv * uniforms.resolution.xy + vec2<f32>(uniforms.clock.x * 61.0)) - 0.5;
        color += vec3<f32>(grain * uniforms.grading_ext.x);
    }

    return vec4<f32>(clamp(color, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_program_validates() {
        for kind in ProgramKind::ALL {
            if let Err(e) = kind.validate() {
                panic!("{}", e);
            }
        }
    }

    #[test]
    fn test_entry_points_exist() {
        for kind in ProgramKind::ALL {
            let module = kind.validate().unwrap();
            let names: Vec<&str> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
            assert!(names.contains(&"vs_main"), "{} has no vs_main", kind.label());
            for entry in kind.fragment_entries() {
                assert!(names.contains(entry), "{} has no {}", kind.label(), entry);
            }
        }
    }

    #[test]
    fn test_broken_source_reports_program() {
        let err = validate_wgsl(ProgramKind::Composite, "fn broken( {").unwrap_err();
        match err {
            GpuError::ShaderCompile { program, .. } => assert_eq!(program, ProgramKind::Composite),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_sampling_programs_declare_source_texture() {
        for kind in ProgramKind::ALL {
            let declares = kind.source().contains("var source_texture");
            assert_eq!(declares, kind.texture_inputs() > 0, "{}", kind.label());
        }
    }
}
