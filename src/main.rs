//! Headless demo: renders a Lorenz attractor and writes the last frame to a PNG.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use glowtrail::image::{Rgba, RgbaImage};
use glowtrail::{
    AxisMapping, GpuCompositor, ParamVariation, Projector, Segment, Step, Stepper, SystemSpec,
    TrailSystem, TrajectoryConfig, Vec2, Vec3,
};

#[derive(Parser, Debug)]
#[command(about = "Render glowing Lorenz attractor trails to a PNG", version)]
struct Args {
    /// Output image
    #[arg(long, default_value = "glowtrail.png")]
    output: PathBuf,

    #[arg(long, default_value_t = 960)]
    width: u32,

    #[arg(long, default_value_t = 640)]
    height: u32,

    /// Simulated frames before the capture
    #[arg(long, default_value_t = 240)]
    frames: u32,

    #[arg(long, default_value_t = 600)]
    particles: usize,

    #[arg(long, default_value_t = 40)]
    trail_length: usize,

    /// Axis mapping from system space to display space, e.g. "x,-z,y"
    #[arg(long, default_value = "x,z,y")]
    axes: AxisMapping,

    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Disable bloom
    #[arg(long)]
    no_bloom: bool,

    /// Skip the GPU and draw with the CPU fallback
    #[arg(long)]
    cpu: bool,
}

struct Lorenz {
    sigma: f32,
    rho: f32,
    beta: f32,
}

impl Stepper for Lorenz {
    fn step(&self, p: Vec3, dt: f32) -> Step {
        let v = Vec3::new(
            self.sigma * (p.y - p.x),
            p.x * (self.rho - p.z) - p.y,
            p.x * p.y - self.beta * p.z,
        );
        Step::new(p + v * dt, v.length())
    }

    fn params(&self) -> Vec<f32> {
        vec![self.sigma, self.rho, self.beta]
    }

    fn with_params(&self, params: &[f32]) -> Option<Arc<dyn Stepper>> {
        match *params {
            [sigma, rho, beta] => Some(Arc::new(Lorenz { sigma, rho, beta })),
            _ => None,
        }
    }
}

/// Plot segment endpoints when no GPU is available.
fn draw_cpu(canvas: &mut RgbaImage, segments: &[Segment]) {
    for pixel in canvas.pixels_mut() {
        *pixel = Rgba([8, 8, 20, 255]);
    }
    let (w, h) = canvas.dimensions();
    for s in segments {
        let (x, y) = (s.x1.round(), s.y1.round());
        if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
            continue;
        }
        let fade = 1.0 - s.age;
        let r = (120.0 + 135.0 * s.speed_norm) * fade;
        let b = (255.0 - 80.0 * s.speed_norm) * fade;
        let pixel = canvas.get_pixel_mut(x as u32, y as u32);
        pixel.0[0] = pixel.0[0].saturating_add(r as u8 / 3);
        pixel.0[1] = pixel.0[1].saturating_add((60.0 * fade) as u8 / 3);
        pixel.0[2] = pixel.0[2].saturating_add(b as u8 / 3);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init();

    ensure!(args.width > 0 && args.height > 0, "image size must be non-zero");

    let max_segments = args.particles * args.trail_length.saturating_sub(1);
    let lorenz: Arc<dyn Stepper> = Arc::new(Lorenz {
        sigma: 10.0,
        rho: 28.0,
        beta: 8.0 / 3.0,
    });
    let config = TrajectoryConfig {
        center_offset: Vec3::new(0.0, 0.0, 25.0),
        spawn_range: 10.0,
        spawn_offset: Vec3::new(0.0, 0.0, 25.0),
        axis_mapping: args.axes,
        respawn_chance: 0.002,
        warmup_steps: 200,
        max_distance: 80.0,
        dt: 0.005,
        trail_length: args.trail_length,
    };
    let spec = SystemSpec::new(lorenz, args.particles)
        .with_config(config)
        .with_variation(ParamVariation::new(vec![0.6, 1.5, 0.1]));
    let mut system = TrailSystem::new(spec, args.seed);
    system.view_mut().zoom = args.height as f32 / 70.0;
    system.view_mut().camera.perspective = 400.0;

    let mut compositor = if args.cpu {
        None
    } else {
        let mut compositor = GpuCompositor::new(args.width, args.height, max_segments);
        if let Some(reason) = compositor.failure() {
            log::warn!("Falling back to CPU rendering: {}", reason);
            None
        } else {
            compositor.set_bloom(|b| b.enabled = !args.no_bloom);
            Some(compositor)
        }
    };

    let mut projector = Projector::new(max_segments, 120.0);
    let mut canvas = RgbaImage::new(args.width, args.height);
    let center = Vec2::new(args.width as f32 / 2.0, args.height as f32 / 2.0);
    let dt = 1.0 / 60.0;
    let blink = compositor
        .as_ref()
        .map(|c| c.config().blink.clone())
        .unwrap_or_default();

    for frame in 0..args.frames {
        system.update(dt, 1.0, &blink);
        system.view_mut().camera.yaw += 0.004;
        if frame + 1 < args.frames {
            continue;
        }

        let view = system.view().clone();
        let segments =
            projector.collect_segments(system.trajectories(), &view.camera, view.zoom, center);
        match compositor.as_mut() {
            Some(compositor) => {
                compositor.begin_frame(view.time);
                let count = compositor.update_lines(segments);
                compositor.render_lines(count, view.time, view.time * 10.0);
                compositor.end_frame();
                compositor.composite_onto(&mut canvas, 0, 0);
            }
            None => draw_cpu(&mut canvas, segments),
        }
    }

    canvas
        .save(&args.output)
        .with_context(|| format!("writing PNG to {}", args.output.display()))?;
    println!(
        "Rendered {} particles for {} frames to {}",
        system.len(),
        args.frames,
        args.output.display()
    );

    if let Some(mut compositor) = compositor {
        compositor.destroy();
    }
    Ok(())
}
