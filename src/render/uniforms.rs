//! Host-side mirrors of the WGSL uniform blocks.
//!
//! Field names and byte offsets here are the contract with the shader text
//! under `shaders/`: every lit variant declares a `Uniforms` struct whose
//! layout matches [`LitUniforms`], and the emissive variant matches
//! [`EmissiveUniforms`].

use std::mem::offset_of;

use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Capacity of the fixed-size light arrays in every lit shader variant.
pub const MAX_POINT_LIGHTS: usize = 10;

/// Uniform block shared by the gouraud and phong variants.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LitUniforms {
    pub projection_matrix: [[f32; 4]; 4],
    pub view_matrix: [[f32; 4]; 4],
    pub model_matrix: [[f32; 4]; 4],
    pub light_ambient: [f32; 3],
    pub nums_light: i32,
    pub camera_position: [f32; 3],
    pub material_shininess: f32,
    pub material_color: [f32; 3],
    _pad0: f32,
    pub material_specular: [f32; 3],
    _pad1: f32,
    /// Left zeroed for colour variants.
    pub texture_scale: [f32; 2],
    _pad2: [f32; 2],
    pub light_position: [[f32; 4]; MAX_POINT_LIGHTS],
    pub light_color: [[f32; 4]; MAX_POINT_LIGHTS],
}

impl LitUniforms {
    pub fn new(projection: Mat4, view: Mat4, model: Mat4) -> Self {
        Self {
            projection_matrix: projection.to_cols_array_2d(),
            view_matrix: view.to_cols_array_2d(),
            model_matrix: model.to_cols_array_2d(),
            ..Self::zeroed()
        }
    }

    pub fn set_material(&mut self, color: Vec3, specular: Vec3, shininess: f32) {
        self.material_color = color.to_array();
        self.material_specular = specular.to_array();
        self.material_shininess = shininess;
    }

    pub fn set_camera_position(&mut self, position: Vec3) {
        self.camera_position = position.to_array();
    }

    pub fn set_texture_scale(&mut self, scale: Vec2) {
        self.texture_scale = scale.to_array();
    }

    /// Writes the ambient term and the active lights. Slots past the active
    /// count stay zeroed and are ignored by the shaders through `nums_light`.
    ///
    /// Callers validate the light count beforehand; extra lights are not written.
    pub fn set_lights(&mut self, ambient: Vec3, lights: impl ExactSizeIterator<Item = (Vec3, Vec3)>) {
        self.light_ambient = ambient.to_array();
        self.nums_light = lights.len() as i32;
        for (slot, (position, color)) in lights.take(MAX_POINT_LIGHTS).enumerate() {
            self.light_position[slot] = position.extend(1.0).to_array();
            self.light_color[slot] = color.extend(1.0).to_array();
        }
    }
}

/// Uniform block of the emissive light-marker variant.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct EmissiveUniforms {
    pub projection_matrix: [[f32; 4]; 4],
    pub view_matrix: [[f32; 4]; 4],
    pub model_matrix: [[f32; 4]; 4],
    pub material_color: [f32; 3],
    _pad0: f32,
}

impl EmissiveUniforms {
    pub fn new(projection: Mat4, view: Mat4, model: Mat4, color: Vec3) -> Self {
        Self {
            projection_matrix: projection.to_cols_array_2d(),
            view_matrix: view.to_cols_array_2d(),
            model_matrix: model.to_cols_array_2d(),
            material_color: color.to_array(),
            _pad0: 0.0,
        }
    }
}

/// Packed uniform data for one draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformBlock {
    Lit(LitUniforms),
    Emissive(EmissiveUniforms),
}

impl UniformBlock {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformBlock::Lit(block) => bytes_of(block),
            UniformBlock::Emissive(block) => bytes_of(block),
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        let cols = match self {
            UniformBlock::Lit(block) => &block.model_matrix,
            UniformBlock::Emissive(block) => &block.model_matrix,
        };
        Mat4::from_cols_array_2d(cols)
    }
}

/// One named entry of a uniform table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformField {
    pub name: &'static str,
    pub offset: usize,
    /// Number of array elements; 1 for plain values.
    pub len: usize,
}

const fn scalar(name: &'static str, offset: usize) -> UniformField {
    UniformField {
        name,
        offset,
        len: 1,
    }
}

const LIGHT_FIELDS: [UniformField; 2] = [
    UniformField {
        name: "light_position",
        offset: offset_of!(LitUniforms, light_position),
        len: MAX_POINT_LIGHTS,
    },
    UniformField {
        name: "light_color",
        offset: offset_of!(LitUniforms, light_color),
        len: MAX_POINT_LIGHTS,
    },
];

// Colour variants use the first eleven entries; texture variants add `texture_scale`.
const LIT_FIELDS: [UniformField; 12] = [
    scalar("projection_matrix", offset_of!(LitUniforms, projection_matrix)),
    scalar("view_matrix", offset_of!(LitUniforms, view_matrix)),
    scalar("model_matrix", offset_of!(LitUniforms, model_matrix)),
    scalar("light_ambient", offset_of!(LitUniforms, light_ambient)),
    scalar("nums_light", offset_of!(LitUniforms, nums_light)),
    scalar("camera_position", offset_of!(LitUniforms, camera_position)),
    scalar("material_shininess", offset_of!(LitUniforms, material_shininess)),
    scalar("material_color", offset_of!(LitUniforms, material_color)),
    scalar("material_specular", offset_of!(LitUniforms, material_specular)),
    LIGHT_FIELDS[0],
    LIGHT_FIELDS[1],
    scalar("texture_scale", offset_of!(LitUniforms, texture_scale)),
];

const EMISSIVE_FIELDS: [UniformField; 4] = [
    scalar("projection_matrix", offset_of!(EmissiveUniforms, projection_matrix)),
    scalar("view_matrix", offset_of!(EmissiveUniforms, view_matrix)),
    scalar("model_matrix", offset_of!(EmissiveUniforms, model_matrix)),
    scalar("material_color", offset_of!(EmissiveUniforms, material_color)),
];

/// Shape of a variant's uniform table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformTable {
    Color,
    Texture,
    Emissive,
}

impl UniformTable {
    pub fn fields(self) -> &'static [UniformField] {
        match self {
            UniformTable::Color => &LIT_FIELDS[..11],
            UniformTable::Texture => &LIT_FIELDS,
            UniformTable::Emissive => &EMISSIVE_FIELDS,
        }
    }

    /// Texture bindings; only texture variants sample an image.
    pub fn samplers(self) -> &'static [&'static str] {
        match self {
            UniformTable::Texture => &["image"],
            UniformTable::Color | UniformTable::Emissive => &[],
        }
    }

    /// Byte length of the uniform block a draw of this shape uploads.
    pub fn block_size(self) -> usize {
        match self {
            UniformTable::Color | UniformTable::Texture => std::mem::size_of::<LitUniforms>(),
            UniformTable::Emissive => std::mem::size_of::<EmissiveUniforms>(),
        }
    }
}
