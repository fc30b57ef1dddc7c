use glam::Mat4;
use log::{debug, error, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::geometry::GeometryProvider;
use crate::render::{
    projection_matrix, FrameMatrices, FrameRenderer, ImageFetcher, LoadQueue, RenderBackend,
    RenderError, ShaderRegistry, ShaderSources, ShadingAlgorithm, TextureManager, VertexArrays,
    DEFAULT_CLEAR_COLOR, MAX_POINT_LIGHTS,
};
use crate::scene::{Model, Scene, SceneDescription, Surface, TextureRef};

/// User-visible error channel.
pub trait ErrorReporter {
    fn alert(&self, message: &str);
}

/// Reports at error level through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn alert(&self, message: &str) {
        error!("{message}");
    }
}

/// Keeps every alert for later inspection.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn alert(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Viewport and projection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub width: u32,
    pub height: u32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub clear_color: [f32; 4],
    pub algorithm: ShadingAlgorithm,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fov_degrees: 45.0,
            near: 1.0,
            far: 50.0,
            clear_color: DEFAULT_CLEAR_COLOR,
            algorithm: ShadingAlgorithm::Gouraud,
        }
    }
}

impl ViewerConfig {
    pub fn projection(&self) -> Mat4 {
        projection_matrix(self.fov_degrees, self.width, self.height, self.near, self.far)
    }
}

/// Owns the backend and everything drawn with it, and re-renders whenever
/// the scene, the shading algorithm or a texture changes.
pub struct Application<B: RenderBackend> {
    backend: B,
    config: ViewerConfig,
    registry: ShaderRegistry,
    arrays: VertexArrays,
    textures: TextureManager,
    renderer: FrameRenderer,
    matrices: FrameMatrices,
    scene: Scene,
    algorithm: ShadingAlgorithm,
}

impl<B: RenderBackend> Application<B> {
    /// Builds every shader program, uploads the primitive vertex arrays and
    /// renders the first (empty) frame.
    ///
    /// Shader failures are reported through `reporter` and do not abort
    /// initialization; the affected variants simply draw nothing.
    pub fn initialize(
        mut backend: B,
        config: ViewerConfig,
        sources: &ShaderSources,
        geometry: &dyn GeometryProvider,
        reporter: &dyn ErrorReporter,
    ) -> Result<Self, RenderError> {
        let mut registry = ShaderRegistry::new();
        registry.build_all(&mut backend, sources, reporter);
        let arrays = VertexArrays::upload(&mut backend, geometry)?;

        let scene = Scene::default();
        let matrices = FrameMatrices::new(config.projection(), &scene.camera);
        let mut app = Self {
            backend,
            config,
            registry,
            arrays,
            textures: TextureManager::new(),
            renderer: FrameRenderer::new(config.clear_color),
            matrices,
            scene,
            algorithm: config.algorithm,
        };
        app.render()?;
        info!("renderer initialized ({}x{})", config.width, config.height);
        Ok(app)
    }

    /// Replaces the scene wholesale and re-renders. An invalid scene is
    /// rejected and the current one stays in place.
    pub fn update_scene(&mut self, scene: Scene) -> Result<(), RenderError> {
        validate_scene(&scene)?;
        self.matrices.set_camera(&scene.camera);
        self.scene = scene;
        self.render()
    }

    /// Resolves a scene description's textures to handles, starting a fetch
    /// for each new URL, then installs the scene.
    pub fn load_scene(
        &mut self,
        description: &SceneDescription,
        fetcher: &dyn ImageFetcher,
    ) -> Result<(), RenderError> {
        let mut scene = Scene {
            camera: description.camera,
            light: description.light.clone(),
            models: Vec::with_capacity(description.models.len()),
        };
        validate_scene(&scene)?;

        for model in &description.models {
            let surface = match &model.texture {
                Some(texture) if model.shader == crate::scene::ShaderKind::Texture => {
                    let id = self
                        .textures
                        .begin_load(&mut self.backend, &texture.url, fetcher)?;
                    Surface::Texture(TextureRef {
                        scale: texture.scale,
                        id,
                    })
                }
                _ => Surface::Color,
            };
            scene.models.push(Model {
                kind: model.kind,
                surface,
                center: model.center,
                size: model.size,
                material: model.material,
            });
        }
        self.update_scene(scene)
    }

    pub fn set_shading_algorithm(&mut self, algorithm: ShadingAlgorithm) -> Result<(), RenderError> {
        debug!("switching shading algorithm to {algorithm}");
        self.algorithm = algorithm;
        self.render()
    }

    /// Applies finished texture loads and re-renders if any texture changed.
    pub fn process_texture_loads(&mut self) -> Result<usize, RenderError> {
        let applied = self.textures.apply_completed(&mut self.backend);
        if applied > 0 {
            self.render()?;
        }
        Ok(applied)
    }

    pub fn render(&mut self) -> Result<(), RenderError> {
        self.renderer.render(
            &mut self.backend,
            &self.scene,
            &self.matrices,
            self.algorithm,
            &self.registry,
            &self.arrays,
        )
    }

    /// Resizes the render target and recomputes the projection for the new
    /// aspect ratio.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.config.width = width;
        self.config.height = height;
        self.backend.resize(width, height);
        self.matrices.projection = self.config.projection();
        self.render()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn algorithm(&self) -> ShadingAlgorithm {
        self.algorithm
    }

    pub fn matrices(&self) -> &FrameMatrices {
        &self.matrices
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ShaderRegistry {
        &self.registry
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    /// Queue that image fetchers deliver into.
    pub fn texture_queue(&self) -> LoadQueue {
        self.textures.queue()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn validate_scene(scene: &Scene) -> Result<(), RenderError> {
    let count = scene.light.point_lights.len();
    if count > MAX_POINT_LIGHTS {
        return Err(RenderError::TooManyLights { count });
    }
    if scene.camera.is_degenerate() {
        return Err(RenderError::DegenerateCamera);
    }
    Ok(())
}
