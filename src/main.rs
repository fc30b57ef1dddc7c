#[cfg(not(target_arch = "wasm32"))]
fn main() {
    shade_illuminate::init_logging(shade_illuminate::LoggingConfig::default());
    if let Err(err) = native::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::any::Any;
    use std::env;
    use std::fmt;
    use std::panic::{self, AssertUnwindSafe};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::{anyhow, bail, Context, Result};
    use log::{error, info};
    use pollster::block_on;
    use winit::application::ApplicationHandler;
    use winit::dpi::PhysicalSize;
    use winit::event::{ElementState, KeyEvent, WindowEvent};
    use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
    use winit::keyboard::{KeyCode, PhysicalKey};
    use winit::window::{Window, WindowId};

    use shade_illuminate::render::texture::TextureState;
    use shade_illuminate::render::FileImageFetcher;
    use shade_illuminate::{
        Application, BuiltinGeometry, HeadlessBackend, LogReporter, SceneDescription,
        ShaderSources, ShaderVariant, ShadingAlgorithm, Surface, ViewerConfig, WgpuBackend,
    };

    const FRAME_INTERVAL: Duration = Duration::from_millis(16);

    pub fn run() -> Result<()> {
        let options = CliOptions::parse(env::args().skip(1))?;
        let xml = std::fs::read_to_string(&options.scene)
            .with_context(|| format!("failed to read scene {}", options.scene.display()))?;
        let description = SceneDescription::from_xml(&xml)
            .with_context(|| format!("failed to parse scene {}", options.scene.display()))?;
        let sources = match &options.shader_dir {
            Some(dir) => ShaderSources::from_dir(dir)
                .with_context(|| format!("failed to load shaders from {}", dir.display()))?,
            None => ShaderSources::embedded(),
        };

        println!(
            "Loaded scene with {} models ({} lights)",
            description.models.len(),
            description.light.point_lights.len()
        );
        for model in &description.models {
            match &model.texture {
                Some(texture) => println!(
                    " - {} ({}, {}) at {}",
                    model.kind,
                    model.shader.name(),
                    texture.url,
                    model.center
                ),
                None => println!(" - {} ({}) at {}", model.kind, model.shader.name(), model.center),
            }
        }

        if options.summary_only {
            return run_summary(&options, &description, &sources);
        }
        match run_interactive(&options, &description, &sources) {
            Ok(()) => Ok(()),
            Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
                eprintln!("{err}. Falling back to --summary-only mode.");
                run_summary(&options, &description, &sources)
            }
            Err(err) => Err(err),
        }
    }

    /// Renders the scene once per shading algorithm without a window and
    /// prints what would have been drawn.
    fn run_summary(
        options: &CliOptions,
        description: &SceneDescription,
        sources: &ShaderSources,
    ) -> Result<()> {
        let config = options.viewer_config();
        let mut app = Application::initialize(
            HeadlessBackend::new(config.width, config.height),
            config,
            sources,
            &BuiltinGeometry::default(),
            &LogReporter,
        )?;
        let linked = ShaderVariant::ALL
            .iter()
            .filter(|variant| app.registry().is_ready(**variant))
            .count();
        println!("Built {linked}/{} shader programs", ShaderVariant::ALL.len());

        let fetcher = FileImageFetcher::blocking(options.asset_dir());
        app.load_scene(description, &fetcher)?;
        app.process_texture_loads()?;

        let mut ready = 0;
        let mut failed = 0;
        for model in &app.scene().models {
            if let Surface::Texture(texture) = &model.surface {
                match app.textures().state(texture.id) {
                    Some(TextureState::Ready) => ready += 1,
                    Some(TextureState::Failed) => failed += 1,
                    _ => {}
                }
            }
        }
        println!("Textures: {ready} ready, {failed} failed");

        for algorithm in [ShadingAlgorithm::Gouraud, ShadingAlgorithm::Phong] {
            app.set_shading_algorithm(algorithm)?;
            let draws = app
                .backend()
                .last_frame()
                .map(|frame| frame.draws.len())
                .unwrap_or_default();
            println!("Rendered {draws} draws with {algorithm} shading");
        }
        Ok(())
    }

    fn run_interactive(
        options: &CliOptions,
        description: &SceneDescription,
        sources: &ShaderSources,
    ) -> Result<()> {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
        panic::set_hook(default_hook);
        let event_loop = event_loop
            .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
            .map_err(|err| WindowInitError::from_error("event loop", err))?;

        let mut viewer = Viewer {
            config: options.viewer_config(),
            description,
            sources,
            fetcher: FileImageFetcher::new(options.asset_dir()),
            window: None,
            app: None,
            failure: None,
        };
        event_loop
            .run_app(&mut viewer)
            .context("event loop terminated with error")?;

        match viewer.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    struct Viewer<'a> {
        config: ViewerConfig,
        description: &'a SceneDescription,
        sources: &'a ShaderSources,
        fetcher: FileImageFetcher,
        window: Option<Arc<Window>>,
        app: Option<Application<WgpuBackend>>,
        failure: Option<anyhow::Error>,
    }

    impl Viewer<'_> {
        fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
            let attributes = Window::default_attributes()
                .with_title("Shade Illuminate")
                .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
            let window = Arc::new(
                event_loop
                    .create_window(attributes)
                    .map_err(|err| WindowInitError::from_error("window", err))?,
            );
            let size = window.inner_size();
            self.config.width = size.width.max(1);
            self.config.height = size.height.max(1);

            let backend = block_on(WgpuBackend::new(
                Arc::clone(&window),
                self.config.width,
                self.config.height,
            ))?;
            let mut app = Application::initialize(
                backend,
                self.config,
                self.sources,
                &BuiltinGeometry::default(),
                &LogReporter,
            )?;
            app.load_scene(self.description, &self.fetcher)?;
            info!("press G for Gouraud shading, P for Phong shading");

            window.request_redraw();
            self.window = Some(window);
            self.app = Some(app);
            Ok(())
        }

        fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
            error!("{err:#}");
            self.failure = Some(err);
            event_loop.exit();
        }
    }

    impl ApplicationHandler for Viewer<'_> {
        fn resumed(&mut self, event_loop: &ActiveEventLoop) {
            if self.app.is_some() {
                return;
            }
            if let Err(err) = self.start(event_loop) {
                self.fail(event_loop, err);
            }
        }

        fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
            let Some(app) = self.app.as_mut() else {
                return;
            };
            if app.textures().pending() == 0 {
                event_loop.set_control_flow(ControlFlow::Wait);
                return;
            }
            if let Err(err) = app.process_texture_loads() {
                error!("failed to render after texture load: {err}");
            }
            event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + FRAME_INTERVAL));
        }

        fn window_event(
            &mut self,
            event_loop: &ActiveEventLoop,
            window_id: WindowId,
            event: WindowEvent,
        ) {
            if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
                return;
            }
            let Some(app) = self.app.as_mut() else {
                return;
            };
            let result = match event {
                WindowEvent::CloseRequested => {
                    event_loop.exit();
                    Ok(())
                }
                WindowEvent::Resized(size) => app.resize(size.width, size.height),
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(code),
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                    ..
                } => match code {
                    KeyCode::KeyG => app.set_shading_algorithm(ShadingAlgorithm::Gouraud),
                    KeyCode::KeyP => app.set_shading_algorithm(ShadingAlgorithm::Phong),
                    KeyCode::Escape => {
                        event_loop.exit();
                        Ok(())
                    }
                    _ => Ok(()),
                },
                WindowEvent::RedrawRequested => app.render(),
                _ => Ok(()),
            };
            if let Err(err) = result {
                if err.is_recoverable() {
                    error!("{err}");
                } else {
                    self.fail(event_loop, err.into());
                }
            }
        }
    }

    #[derive(Debug)]
    struct WindowInitError {
        message: String,
    }

    impl WindowInitError {
        fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {}", panic_message(panic)),
            }
        }

        fn from_error(stage: &str, err: impl fmt::Display) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {err}"),
            }
        }
    }

    impl fmt::Display for WindowInitError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl std::error::Error for WindowInitError {}

    fn panic_message(panic: Box<dyn Any + Send>) -> String {
        match panic.downcast::<String>() {
            Ok(msg) => *msg,
            Err(panic) => match panic.downcast::<&'static str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "unknown panic".into(),
            },
        }
    }

    const USAGE: &str = "Usage: shade-illuminate <scene.xml> [--algorithm gouraud|phong] \
                         [--shaders DIR] [--size WxH] [--summary-only]";

    #[derive(Debug)]
    struct CliOptions {
        scene: PathBuf,
        algorithm: ShadingAlgorithm,
        shader_dir: Option<PathBuf>,
        size: (u32, u32),
        summary_only: bool,
    }

    impl CliOptions {
        fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
            let Some(scene) = args.next() else {
                bail!("{USAGE}");
            };
            let mut options = Self {
                scene: PathBuf::from(scene),
                algorithm: ShadingAlgorithm::default(),
                shader_dir: None,
                size: (800, 600),
                summary_only: false,
            };
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--summary-only" => options.summary_only = true,
                    "--algorithm" => {
                        options.algorithm = next_value(&mut args, "--algorithm")?.parse()?;
                    }
                    "--shaders" => {
                        options.shader_dir = Some(PathBuf::from(next_value(&mut args, "--shaders")?));
                    }
                    "--size" => options.size = parse_size(&next_value(&mut args, "--size")?)?,
                    other => bail!("Unknown argument: {other}. {USAGE}"),
                }
            }
            Ok(options)
        }

        fn viewer_config(&self) -> ViewerConfig {
            ViewerConfig {
                width: self.size.0,
                height: self.size.1,
                algorithm: self.algorithm,
                ..ViewerConfig::default()
            }
        }

        /// Texture URLs resolve relative to the scene file.
        fn asset_dir(&self) -> PathBuf {
            self.scene
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        }
    }

    fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
        args.next().ok_or_else(|| anyhow!("{flag} expects a value"))
    }

    fn parse_size(value: &str) -> Result<(u32, u32)> {
        let (width, height) = value
            .split_once('x')
            .ok_or_else(|| anyhow!("invalid size `{value}`, expected WIDTHxHEIGHT"))?;
        let width: u32 = width.parse().with_context(|| format!("invalid width `{width}`"))?;
        let height: u32 = height.parse().with_context(|| format!("invalid height `{height}`"))?;
        if width == 0 || height == 0 {
            bail!("size must be non-zero");
        }
        Ok((width, height))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn parse(args: &[&str]) -> Result<CliOptions> {
            CliOptions::parse(args.iter().map(|arg| arg.to_string()))
        }

        #[test]
        fn parses_all_flags() {
            let options = parse(&[
                "scenes/demo.xml",
                "--algorithm",
                "phong",
                "--size",
                "1024x768",
                "--shaders",
                "shaders",
                "--summary-only",
            ])
            .unwrap();
            assert_eq!(options.algorithm, ShadingAlgorithm::Phong);
            assert_eq!(options.size, (1024, 768));
            assert_eq!(options.shader_dir, Some(PathBuf::from("shaders")));
            assert!(options.summary_only);
            assert_eq!(options.asset_dir(), PathBuf::from("scenes"));
        }

        #[test]
        fn rejects_bad_input() {
            assert!(parse(&[]).is_err());
            assert!(parse(&["a.xml", "--size", "0x10"]).is_err());
            assert!(parse(&["a.xml", "--algorithm", "flat"]).is_err());
            assert!(parse(&["a.xml", "--algorithm"]).is_err());
            assert!(parse(&["a.xml", "--verbose"]).is_err());
        }
    }
}
