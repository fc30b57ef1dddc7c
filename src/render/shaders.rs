//! Shader variants, their build recipes and the program registry.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::backend::RenderBackend;
use super::error::RenderError;
use super::uniforms::UniformTable;
use crate::app::ErrorReporter;
use crate::scene::ShaderKind;

/// Lighting evaluation strategy selected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadingAlgorithm {
    /// Per-vertex lighting interpolated across each triangle.
    #[default]
    Gouraud,
    /// Per-fragment lighting with interpolated normals.
    Phong,
}

impl ShadingAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            ShadingAlgorithm::Gouraud => "gouraud",
            ShadingAlgorithm::Phong => "phong",
        }
    }
}

impl fmt::Display for ShadingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShadingAlgorithm {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "gouraud" => Ok(ShadingAlgorithm::Gouraud),
            "phong" => Ok(ShadingAlgorithm::Phong),
            other => Err(anyhow::anyhow!(
                "unknown shading algorithm `{other}`; expected gouraud or phong"
            )),
        }
    }
}

/// The five GPU programs the renderer draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderVariant {
    GouraudColor,
    GouraudTexture,
    PhongColor,
    PhongTexture,
    Emissive,
}

impl ShaderVariant {
    pub const ALL: [ShaderVariant; 5] = [
        ShaderVariant::GouraudColor,
        ShaderVariant::GouraudTexture,
        ShaderVariant::PhongColor,
        ShaderVariant::PhongTexture,
        ShaderVariant::Emissive,
    ];

    /// Program used to draw a model with the given surface under `algorithm`.
    pub fn lit(algorithm: ShadingAlgorithm, shader: ShaderKind) -> Self {
        match (algorithm, shader) {
            (ShadingAlgorithm::Gouraud, ShaderKind::Color) => ShaderVariant::GouraudColor,
            (ShadingAlgorithm::Gouraud, ShaderKind::Texture) => ShaderVariant::GouraudTexture,
            (ShadingAlgorithm::Phong, ShaderKind::Color) => ShaderVariant::PhongColor,
            (ShadingAlgorithm::Phong, ShaderKind::Texture) => ShaderVariant::PhongTexture,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderVariant::GouraudColor => "gouraud_color",
            ShaderVariant::GouraudTexture => "gouraud_texture",
            ShaderVariant::PhongColor => "phong_color",
            ShaderVariant::PhongTexture => "phong_texture",
            ShaderVariant::Emissive => "emissive",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn recipe(self) -> ProgramRecipe {
        match self {
            ShaderVariant::GouraudColor | ShaderVariant::PhongColor => ProgramRecipe {
                attributes: &[VertexAttribute::Position, VertexAttribute::Normal],
                uniforms: UniformTable::Color,
            },
            ShaderVariant::GouraudTexture | ShaderVariant::PhongTexture => ProgramRecipe {
                attributes: &[
                    VertexAttribute::Position,
                    VertexAttribute::Normal,
                    VertexAttribute::Texcoord,
                ],
                uniforms: UniformTable::Texture,
            },
            ShaderVariant::Emissive => ProgramRecipe {
                attributes: &[VertexAttribute::Position],
                uniforms: UniformTable::Emissive,
            },
        }
    }
}

impl fmt::Display for ShaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Location of the single colour output of every fragment stage.
pub const FRAGMENT_OUTPUT_LOCATION: u32 = 0;

/// Vertex inputs. Locations are shared by every variant so one vertex layout
/// serves all programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Normal,
    Texcoord,
}

impl VertexAttribute {
    pub fn location(self) -> u32 {
        match self {
            VertexAttribute::Position => 0,
            VertexAttribute::Normal => 1,
            VertexAttribute::Texcoord => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VertexAttribute::Position => "vertex_position",
            VertexAttribute::Normal => "vertex_normal",
            VertexAttribute::Texcoord => "vertex_texcoord",
        }
    }

    /// Byte offset inside an interleaved [`crate::geometry::Vertex`].
    pub fn offset(self) -> u64 {
        let offset = match self {
            VertexAttribute::Position => std::mem::offset_of!(crate::geometry::Vertex, position),
            VertexAttribute::Normal => std::mem::offset_of!(crate::geometry::Vertex, normal),
            VertexAttribute::Texcoord => std::mem::offset_of!(crate::geometry::Vertex, texcoord),
        };
        offset as u64
    }

    pub fn components(self) -> u32 {
        match self {
            VertexAttribute::Position | VertexAttribute::Normal => 3,
            VertexAttribute::Texcoord => 2,
        }
    }
}

/// What differs between the variants at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramRecipe {
    pub attributes: &'static [VertexAttribute],
    pub uniforms: UniformTable,
}

impl ProgramRecipe {
    pub fn is_textured(&self) -> bool {
        !self.uniforms.samplers().is_empty()
    }
}

/// Vertex and fragment source text for every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    // Indexed by `ShaderVariant::index`, then vertex/fragment.
    stages: [[String; 2]; 5],
}

macro_rules! embedded_stage {
    ($name:literal) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/", $name, ".wgsl"))
    };
}

impl ShaderSources {
    /// The ten source files in fetch order.
    pub fn files() -> impl Iterator<Item = (ShaderVariant, ShaderStage)> {
        ShaderVariant::ALL
            .into_iter()
            .flat_map(|variant| ShaderStage::ALL.into_iter().map(move |stage| (variant, stage)))
    }

    /// Logical resource name, e.g. `phong_texture.frag.wgsl`.
    pub fn file_name(variant: ShaderVariant, stage: ShaderStage) -> String {
        format!("{}.{}.wgsl", variant.name(), stage.extension())
    }

    /// Sources compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            stages: [
                [
                    embedded_stage!("gouraud_color.vert").to_string(),
                    embedded_stage!("gouraud_color.frag").to_string(),
                ],
                [
                    embedded_stage!("gouraud_texture.vert").to_string(),
                    embedded_stage!("gouraud_texture.frag").to_string(),
                ],
                [
                    embedded_stage!("phong_color.vert").to_string(),
                    embedded_stage!("phong_color.frag").to_string(),
                ],
                [
                    embedded_stage!("phong_texture.vert").to_string(),
                    embedded_stage!("phong_texture.frag").to_string(),
                ],
                [
                    embedded_stage!("emissive.vert").to_string(),
                    embedded_stage!("emissive.frag").to_string(),
                ],
            ],
        }
    }

    /// Assembles the sources from fetch results given in [`ShaderSources::files`]
    /// order. The first failure aborts the whole set.
    pub fn try_collect<I>(fetched: I) -> Result<Self, RenderError>
    where
        I: IntoIterator<Item = Result<String, RenderError>>,
    {
        let mut stages: [[String; 2]; 5] = Default::default();
        let mut fetched = fetched.into_iter();
        for (variant, stage) in Self::files() {
            let source = fetched.next().ok_or_else(|| RenderError::ResourceFetch {
                name: Self::file_name(variant, stage),
                reason: "no source supplied".to_string(),
            })??;
            stages[variant.index()][stage as usize] = source;
        }
        Ok(Self { stages })
    }

    /// Reads every source from `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, RenderError> {
        let dir = dir.as_ref();
        Self::try_collect(Self::files().map(|(variant, stage)| {
            let name = Self::file_name(variant, stage);
            std::fs::read_to_string(dir.join(&name)).map_err(|err| RenderError::ResourceFetch {
                name,
                reason: err.to_string(),
            })
        }))
    }

    pub fn get(&self, variant: ShaderVariant, stage: ShaderStage) -> &str {
        &self.stages[variant.index()][stage as usize]
    }
}

/// State of a variant's program after the build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStatus {
    Linked,
    /// Compilation or linking reported errors; the variant draws nothing.
    Failed,
}

/// Everything reported while building one program.
#[derive(Debug)]
pub struct ProgramOutcome {
    pub variant: ShaderVariant,
    pub errors: Vec<RenderError>,
}

impl ProgramOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Tracks which shader programs were built and how.
///
/// Programs themselves live in the backend; the registry keeps the
/// host-side view so the frame renderer never issues draws against a
/// variant that failed to link.
#[derive(Debug, Clone, Default)]
pub struct ShaderRegistry {
    status: [Option<ProgramStatus>; 5],
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles both stages and links them with the variant's attribute bindings.
    ///
    /// A failed compile does not stop the link attempt; the errors are
    /// returned for reporting and the variant is marked failed.
    pub fn compile_and_link<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        variant: ShaderVariant,
        vertex_source: &str,
        fragment_source: &str,
    ) -> ProgramOutcome {
        let mut errors = Vec::new();
        for (stage, source) in [
            (ShaderStage::Vertex, vertex_source),
            (ShaderStage::Fragment, fragment_source),
        ] {
            if let Err(err) = backend.compile_stage(variant, stage, source) {
                errors.push(err);
            }
        }

        let recipe = variant.recipe();
        match backend.link_program(variant, &recipe) {
            Ok(()) if backend.has_program(variant) => debug!("linked {variant} program"),
            Ok(()) => errors.push(RenderError::ShaderLink {
                variant,
                log: "backend reported success but holds no program".to_string(),
            }),
            Err(err) => errors.push(err),
        }

        let status = if errors.is_empty() {
            ProgramStatus::Linked
        } else {
            ProgramStatus::Failed
        };
        self.status[variant.index()] = Some(status);
        ProgramOutcome { variant, errors }
    }

    /// Builds all five variants, reporting every failure through `reporter`.
    /// Returns the number of programs that linked cleanly.
    pub fn build_all<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        sources: &ShaderSources,
        reporter: &dyn ErrorReporter,
    ) -> usize {
        let mut linked = 0;
        for variant in ShaderVariant::ALL {
            let outcome = self.compile_and_link(
                backend,
                variant,
                sources.get(variant, ShaderStage::Vertex),
                sources.get(variant, ShaderStage::Fragment),
            );
            if outcome.is_ok() {
                linked += 1;
            }
            for err in &outcome.errors {
                reporter.alert(&err.to_string());
            }
        }
        info!("built {linked}/{} shader programs", ShaderVariant::ALL.len());
        linked
    }

    pub fn status(&self, variant: ShaderVariant) -> Option<ProgramStatus> {
        self.status[variant.index()]
    }

    pub fn is_ready(&self, variant: ShaderVariant) -> bool {
        self.status(variant) == Some(ProgramStatus::Linked)
    }
}
