use std::collections::{BTreeMap, BTreeSet, HashMap};

use image::RgbaImage;

use super::backend::{Frame, RenderBackend};
use super::error::RenderError;
use super::shaders::{ProgramRecipe, ShaderStage, ShaderVariant};
use super::texture::{check_texture_size, TextureId};
use crate::geometry::MeshData;
use crate::scene::PrimitiveKind;

/// Backend that records everything it is asked to do instead of drawing.
///
/// Used by the tests and by the binary's summary mode. Shader stages are
/// checked only for their entry point; failures can also be injected per
/// stage or per program. Texture sizes are limited like a WebGL2 device.
#[derive(Debug)]
pub struct HeadlessBackend {
    width: u32,
    height: u32,
    max_texture_dimension: u32,
    sources: HashMap<(ShaderVariant, ShaderStage), String>,
    programs: BTreeMap<ShaderVariant, ProgramRecipe>,
    meshes: HashMap<PrimitiveKind, MeshData>,
    textures: BTreeMap<TextureId, Vec<RgbaImage>>,
    frames: Vec<Frame>,
    fail_compile: BTreeSet<(ShaderVariant, ShaderStage)>,
    fail_link: BTreeSet<ShaderVariant>,
}

impl HeadlessBackend {
    /// Texture limit of `wgpu::Limits::downlevel_webgl2_defaults`.
    pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 2048;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            max_texture_dimension: Self::DEFAULT_MAX_TEXTURE_DIMENSION,
            sources: HashMap::new(),
            programs: BTreeMap::new(),
            meshes: HashMap::new(),
            textures: BTreeMap::new(),
            frames: Vec::new(),
            fail_compile: BTreeSet::new(),
            fail_link: BTreeSet::new(),
        }
    }

    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = max;
        self
    }

    /// Makes the next compile of `stage` for `variant` fail.
    pub fn fail_compile(&mut self, variant: ShaderVariant, stage: ShaderStage) {
        self.fail_compile.insert((variant, stage));
    }

    /// Makes linking `variant` fail.
    pub fn fail_link(&mut self, variant: ShaderVariant) {
        self.fail_link.insert(variant);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Mip chain currently stored for `texture`, base level first.
    pub fn texture(&self, texture: TextureId) -> Option<&[RgbaImage]> {
        self.textures.get(&texture).map(Vec::as_slice)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl RenderBackend for HeadlessBackend {
    fn compile_stage(
        &mut self,
        variant: ShaderVariant,
        stage: ShaderStage,
        source: &str,
    ) -> Result<(), RenderError> {
        if self.fail_compile.remove(&(variant, stage)) {
            self.sources.remove(&(variant, stage));
            return Err(RenderError::ShaderCompile {
                variant,
                stage,
                log: "injected compile failure".to_string(),
            });
        }
        self.sources.insert((variant, stage), source.to_string());
        let entry = format!("fn {}", stage.entry_point());
        if !source.contains(&entry) {
            return Err(RenderError::ShaderCompile {
                variant,
                stage,
                log: format!("entry point `{}` not found", stage.entry_point()),
            });
        }
        Ok(())
    }

    fn link_program(
        &mut self,
        variant: ShaderVariant,
        recipe: &ProgramRecipe,
    ) -> Result<(), RenderError> {
        self.programs.remove(&variant);
        if self.fail_link.remove(&variant) {
            return Err(RenderError::ShaderLink {
                variant,
                log: "injected link failure".to_string(),
            });
        }
        for stage in ShaderStage::ALL {
            let linked = self
                .sources
                .get(&(variant, stage))
                .is_some_and(|source| source.contains(&format!("fn {}", stage.entry_point())));
            if !linked {
                return Err(RenderError::ShaderLink {
                    variant,
                    log: format!("{stage} stage is missing or invalid"),
                });
            }
        }
        self.programs.insert(variant, *recipe);
        Ok(())
    }

    fn has_program(&self, variant: ShaderVariant) -> bool {
        self.programs.contains_key(&variant)
    }

    fn upload_mesh(&mut self, kind: PrimitiveKind, mesh: &MeshData) -> Result<(), RenderError> {
        self.meshes.insert(kind, mesh.clone());
        Ok(())
    }

    fn create_texture(
        &mut self,
        texture: TextureId,
        level0: &RgbaImage,
    ) -> Result<(), RenderError> {
        check_texture_size(texture, level0.dimensions(), self.max_texture_dimension)?;
        self.textures.insert(texture, vec![level0.clone()]);
        Ok(())
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_chain: &[RgbaImage],
    ) -> Result<(), RenderError> {
        if let Some(base) = mip_chain.first() {
            check_texture_size(texture, base.dimensions(), self.max_texture_dimension)?;
        }
        let levels = self
            .textures
            .get_mut(&texture)
            .ok_or(RenderError::UnknownTexture(texture.0))?;
        *levels = mip_chain.to_vec();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn submit(&mut self, frame: &Frame) -> Result<(), RenderError> {
        for draw in &frame.draws {
            if !self.programs.contains_key(&draw.variant) {
                return Err(RenderError::ShaderLink {
                    variant: draw.variant,
                    log: "draw issued against a program that is not linked".to_string(),
                });
            }
            if !self.meshes.contains_key(&draw.primitive) {
                return Err(RenderError::Surface(format!(
                    "no vertex array uploaded for {}",
                    draw.primitive
                )));
            }
            let expected = draw.variant.recipe().uniforms.block_size();
            let actual = draw.uniforms.as_bytes().len();
            if actual != expected {
                return Err(RenderError::UniformSize {
                    variant: draw.variant,
                    expected,
                    actual,
                });
            }
            if let Some(binding) = draw.texture {
                if !self.textures.contains_key(&binding.texture) {
                    return Err(RenderError::UnknownTexture(binding.texture.0));
                }
            }
        }
        self.frames.push(frame.clone());
        Ok(())
    }
}
