use std::path::PathBuf;

use anyhow::{Context, Result};
use glam::{Affine3A, Vec3};

use lavender_engine::asset::AssetLoader;
use lavender_engine::camera::{ArcballCamera, Camera};
use lavender_engine::config::EngineConfig;
use lavender_engine::core::{App, AppControl, FrameCtx};
use lavender_engine::device::{GpuDevice, GpuInit, GraphicsContext};
use lavender_engine::logging::{init_logging, LoggingConfig};
use lavender_engine::render::{FillMode, FrameOutcome};
use lavender_engine::scene::{Material, Polytope};
use lavender_engine::window::{Runtime, RuntimeConfig};
use lavender_engine::Engine;

/// Radians per second the icosahedron turns about +Y.
const SPIN_RATE: f32 = 0.4;

/// Ticks between window title refreshes.
const TITLE_INTERVAL: u64 = 30;

/// Command line: `lavender-viewer [--wireframe] [model.obj]`.
#[derive(Debug, Default)]
struct Args {
    model_path: Option<PathBuf>,
    wireframe: bool,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = std::ffi::OsString>) -> Self {
        let mut parsed = Self::default();
        for arg in args {
            if arg == "--wireframe" {
                parsed.wireframe = true;
            } else {
                parsed.model_path = Some(PathBuf::from(arg));
            }
        }
        parsed
    }
}

struct Viewer {
    config: EngineConfig,
    args: Args,
    engine: Option<Engine>,
    spinning: usize,
}

impl Viewer {
    fn new(config: EngineConfig, args: Args) -> Self {
        Self {
            config,
            args,
            engine: None,
            spinning: 0,
        }
    }
}

impl App for Viewer {
    fn on_start(&mut self, gpu: &GraphicsContext<'_>) -> Result<()> {
        let size = gpu.size();
        let mut camera = ArcballCamera::new(Vec3::ZERO, 4.0);
        camera.resize_viewport(size.width, size.height);

        let mut engine = Engine::new(gpu, self.config.clone(), Box::new(camera))
            .context("failed to set up the frame pipeline")?;

        let lavender = Material::with_base_color(Vec3::new(0.71, 0.49, 0.86));
        let icosahedron = Polytope::Icosahedron
            .mesh(gpu, Some(lavender))
            .context("failed to upload the icosahedron")?;
        self.spinning = engine.add_renderable(gpu, icosahedron)?;

        if self.args.wireframe {
            if gpu.supports_line_fill() {
                engine.set_fill_mode(gpu, FillMode::Lines)?;
            } else {
                log::warn!("wireframe requested but the adapter cannot rasterize lines");
            }
        }

        if let Some(path) = &self.args.model_path {
            let model = AssetLoader::new()
                .load_model(gpu, path)
                .with_context(|| format!("failed to load '{}'", path.display()))?;
            let model = model.with_transform(Affine3A::from_translation(Vec3::new(2.5, 0.0, 0.0)));
            engine.add_renderable(gpu, model)?;
        }

        log::info!("scene ready: {} renderables", engine.scene().len());
        self.engine = Some(engine);
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        if let Some(engine) = &mut self.engine {
            engine.resize(width, height);
        }
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        let Some(engine) = self.engine.as_mut() else {
            return AppControl::Exit;
        };

        if let Some(renderable) = engine.scene_mut().get_mut(self.spinning) {
            let transform = renderable.transform_mut();
            *transform = Affine3A::from_rotation_y(SPIN_RATE * ctx.time.dt) * *transform;
        }

        match engine.tick(&mut *ctx.gpu, &ctx.input, ctx.time.dt) {
            Ok(FrameOutcome::Submitted { frame_number, .. }) => {
                if frame_number % TITLE_INTERVAL == 0 {
                    ctx.window
                        .set_title(&format!("lavender  {:.0} fps", ctx.time.fps));
                }
            }
            Ok(FrameOutcome::Skipped) => {}
            Err(err) => {
                log::error!("frame failed: {err}");
                ctx.runtime.exit();
            }
        }
        AppControl::Continue
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let viewer = Viewer::new(EngineConfig::default(), Args::parse(std::env::args_os().skip(1)));

    let config = RuntimeConfig {
        title: "lavender".to_string(),
        ..RuntimeConfig::default()
    };
    Runtime::run(config, GpuInit::default(), viewer)
}
