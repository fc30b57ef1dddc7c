use thiserror::Error;

use super::shaders::{ShaderStage, ShaderVariant};
use super::uniforms::MAX_POINT_LIGHTS;

/// Failures raised by the rendering layer.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The GPU context could not be created. Fatal.
    #[error("unable to initialize the GPU context: {0}")]
    ContextCreation(String),
    /// A resource needed by initialization could not be fetched.
    #[error("failed to fetch {name}: {reason}")]
    ResourceFetch { name: String, reason: String },
    #[error("an error occurred compiling the {variant} {stage} shader: {log}")]
    ShaderCompile {
        variant: ShaderVariant,
        stage: ShaderStage,
        log: String,
    },
    #[error("an error occurred linking the {variant} shader program: {log}")]
    ShaderLink { variant: ShaderVariant, log: String },
    #[error(
        "scene has {count} point lights but shaders support at most {max}",
        max = MAX_POINT_LIGHTS
    )]
    TooManyLights { count: usize },
    #[error("camera direction and up vectors are parallel")]
    DegenerateCamera,
    #[error("texture {0} is not known to the texture manager")]
    UnknownTexture(u32),
    #[error("texture #{texture} is {width}x{height}, larger than the {max} texel limit")]
    TextureTooLarge {
        texture: u32,
        width: u32,
        height: u32,
        max: u32,
    },
    #[error("failed to upload texture #{texture}: {log}")]
    TextureUpload { texture: u32, log: String },
    #[error("{variant} draw carries {actual} uniform bytes, expected {expected}")]
    UniformSize {
        variant: ShaderVariant,
        expected: usize,
        actual: usize,
    },
    #[error("surface error: {0}")]
    Surface(String),
}

impl RenderError {
    /// Errors that are surfaced to the user but do not stop rendering.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RenderError::ContextCreation(_) | RenderError::ResourceFetch { .. }
        )
    }
}
