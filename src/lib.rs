//! Real-time Gouraud and Phong illumination viewer.
//!
//! Scenes of planes, cubes and spheres are lit by up to ten point lights and
//! drawn with one of five shader programs. Rendering goes through the
//! [`render::RenderBackend`] seam: wgpu on the desktop and WebGL2 in the
//! browser, or a recording headless backend for tests and tooling.

pub mod app;
pub mod geometry;
pub mod logging;
pub mod render;
pub mod scene;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{Application, CollectingReporter, ErrorReporter, LogReporter, ViewerConfig};
pub use geometry::{BuiltinGeometry, GeometryProvider, MeshData, Vertex};
pub use logging::{init_logging, LoggingConfig};
pub use render::{
    Frame, HeadlessBackend, RenderBackend, RenderError, ShaderSources, ShaderVariant,
    ShadingAlgorithm, TextureId, WgpuBackend,
};
pub use scene::{
    Camera, LightSet, Material, Model, PointLight, PrimitiveKind, Scene, SceneDescription,
    ShaderKind, Surface, TextureRef,
};
