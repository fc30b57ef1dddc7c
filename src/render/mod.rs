pub mod backend;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod headless;
pub mod shaders;
pub mod texture;
pub mod uniforms;

pub use backend::{DrawCall, Frame, RenderBackend, TextureBinding, TEXTURE_UNIT};
pub use error::RenderError;
pub use frame::{
    model_matrix, projection_matrix, view_matrix, FrameMatrices, FrameRenderer, VertexArrays,
    DEFAULT_CLEAR_COLOR, LIGHT_MARKER_SCALE,
};
pub use gpu::WgpuBackend;
pub use headless::HeadlessBackend;
pub use shaders::{
    ProgramOutcome, ProgramRecipe, ProgramStatus, ShaderRegistry, ShaderSources, ShaderStage,
    ShaderVariant, ShadingAlgorithm, VertexAttribute,
};
pub use texture::{
    FileImageFetcher, ImageFetcher, LoadQueue, TextureId, TextureLoad, TextureManager,
    TextureState, PLACEHOLDER_PIXEL,
};
pub use uniforms::{EmissiveUniforms, LitUniforms, UniformBlock, UniformTable, MAX_POINT_LIGHTS};
