use image::RgbaImage;

use super::error::RenderError;
use super::shaders::{ProgramRecipe, ShaderStage, ShaderVariant};
use super::texture::TextureId;
use super::uniforms::UniformBlock;
use crate::geometry::MeshData;
use crate::scene::PrimitiveKind;

/// Texture unit the lit texture variants sample from.
pub const TEXTURE_UNIT: u32 = 0;

/// A texture bound for one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub unit: u32,
    pub texture: TextureId,
}

/// One indexed triangle draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub variant: ShaderVariant,
    pub primitive: PrimitiveKind,
    pub index_count: u32,
    pub uniforms: UniformBlock,
    pub texture: Option<TextureBinding>,
}

/// Everything submitted to the GPU for one frame, in draw order.
///
/// Two equal frames produce identical framebuffers on the same backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub clear_color: [f32; 4],
    pub draws: Vec<DrawCall>,
}

impl Frame {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self {
            clear_color,
            draws: Vec::new(),
        }
    }

    pub fn draws_with(&self, variant: ShaderVariant) -> impl Iterator<Item = &DrawCall> {
        self.draws.iter().filter(move |draw| draw.variant == variant)
    }
}

/// The GPU context the renderer drives.
///
/// All calls happen on one logical thread. Objects created through the
/// backend live as long as the backend does.
pub trait RenderBackend {
    /// Compiles one stage of `variant`. The source is retained for linking
    /// even when compilation reports errors.
    fn compile_stage(
        &mut self,
        variant: ShaderVariant,
        stage: ShaderStage,
        source: &str,
    ) -> Result<(), RenderError>;

    /// Links the previously compiled stages of `variant` with the recipe's
    /// attribute bindings and uniform layout.
    fn link_program(
        &mut self,
        variant: ShaderVariant,
        recipe: &ProgramRecipe,
    ) -> Result<(), RenderError>;

    fn has_program(&self, variant: ShaderVariant) -> bool;

    /// Uploads the vertex array for one primitive kind.
    fn upload_mesh(&mut self, kind: PrimitiveKind, mesh: &MeshData) -> Result<(), RenderError>;

    /// Allocates `texture` with a single level.
    fn create_texture(&mut self, texture: TextureId, level0: &RgbaImage)
        -> Result<(), RenderError>;

    /// Replaces the contents of `texture` with a full mip chain.
    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_chain: &[RgbaImage],
    ) -> Result<(), RenderError>;

    fn resize(&mut self, width: u32, height: u32);

    fn submit(&mut self, frame: &Frame) -> Result<(), RenderError>;
}
