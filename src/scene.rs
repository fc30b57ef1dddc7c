use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use glam::{Vec2, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::render::texture::TextureId;

/// Everything the renderer needs to draw one frame.
///
/// A scene is replaced wholesale on every update; nothing is merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub camera: Camera,
    pub light: LightSet,
    pub models: Vec<Model>,
}

/// Viewer placement. `direction` and `up` must not be parallel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

impl Camera {
    /// Returns `true` when the view basis cannot be built from `direction` and `up`.
    pub fn is_degenerate(&self) -> bool {
        // Relative to the vector lengths so short but independent vectors pass.
        let scale = self.direction.length_squared() * self.up.length_squared();
        self.direction.cross(self.up).length_squared() <= f32::EPSILON * scale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSet {
    pub ambient: Vec3,
    pub point_lights: Vec<PointLight>,
}

impl Default for LightSet {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.2),
            point_lights: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
}

/// A primitive placed in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(rename = "type")]
    pub kind: PrimitiveKind,
    pub surface: Surface,
    pub center: Vec3,
    /// Non-uniform scale applied before the translation to `center`.
    pub size: Vec3,
    pub material: Material,
}

impl Model {
    pub fn shader(&self) -> ShaderKind {
        self.surface.shader()
    }

    pub fn texture(&self) -> Option<&TextureRef> {
        match &self.surface {
            Surface::Color => None,
            Surface::Texture(texture) => Some(texture),
        }
    }
}

/// How a model's surface colour is sourced. A textured surface always
/// carries its texture, so the shader kind and the texture cannot disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    Color,
    Texture(TextureRef),
}

impl Surface {
    pub fn shader(&self) -> ShaderKind {
        match self {
            Surface::Color => ShaderKind::Color,
            Surface::Texture(_) => ShaderKind::Texture,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Ambient and diffuse reflectance (Ka = Kd).
    pub color: Vec3,
    /// Specular reflectance (Ks).
    pub specular: Vec3,
    /// Phong exponent.
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            specular: Vec3::ZERO,
            shininess: 1.0,
        }
    }
}

/// A model's reference to a texture owned by the texture manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureRef {
    pub scale: Vec2,
    pub id: TextureId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Plane,
    Cube,
    Sphere,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 3] = [
        PrimitiveKind::Plane,
        PrimitiveKind::Cube,
        PrimitiveKind::Sphere,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Plane => "plane",
            PrimitiveKind::Cube => "cube",
            PrimitiveKind::Sphere => "sphere",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PrimitiveKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "plane" => Ok(PrimitiveKind::Plane),
            "cube" => Ok(PrimitiveKind::Cube),
            "sphere" => Ok(PrimitiveKind::Sphere),
            other => Err(anyhow!("unknown primitive type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderKind {
    Color,
    Texture,
}

impl ShaderKind {
    pub fn name(self) -> &'static str {
        match self {
            ShaderKind::Color => "color",
            ShaderKind::Texture => "texture",
        }
    }
}

impl FromStr for ShaderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "color" => Ok(ShaderKind::Color),
            "texture" => Ok(ShaderKind::Texture),
            other => Err(anyhow!("unknown shader kind `{other}`")),
        }
    }
}

/// Scene as written in a scene file, before textures are resolved to GPU handles.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneDescription {
    pub camera: Camera,
    pub light: LightSet,
    pub models: Vec<ModelDescription>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescription {
    pub kind: PrimitiveKind,
    pub shader: ShaderKind,
    pub center: Vec3,
    pub size: Vec3,
    pub material: Material,
    pub texture: Option<TextureDescription>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescription {
    pub url: String,
    pub scale: Vec2,
}

impl SceneDescription {
    /// Parses a scene file.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("expected <scene> root element, found <{}>", root.tag_name().name());
        }

        let camera = match child(&root, "camera") {
            Some(node) => parse_camera(&node).context("invalid <camera>")?,
            None => Camera::default(),
        };
        let light = match child(&root, "light") {
            Some(node) => parse_light(&node).context("invalid <light>")?,
            None => LightSet::default(),
        };

        let mut models = Vec::new();
        for (index, node) in root
            .children()
            .filter(|n| n.has_tag_name("model"))
            .enumerate()
        {
            models.push(parse_model(&node).with_context(|| format!("invalid <model> #{index}"))?);
        }

        Ok(Self {
            camera,
            light,
            models,
        })
    }
}

fn parse_camera(node: &Node<'_, '_>) -> Result<Camera> {
    let defaults = Camera::default();
    let camera = Camera {
        position: parse_vec3(optional_text(node, "position"), defaults.position)?,
        direction: parse_vec3(optional_text(node, "direction"), defaults.direction)?,
        up: parse_vec3(optional_text(node, "up"), defaults.up)?,
    };
    if camera.is_degenerate() {
        bail!("camera direction and up vectors are parallel");
    }
    Ok(camera)
}

fn parse_light(node: &Node<'_, '_>) -> Result<LightSet> {
    let ambient = parse_vec3(optional_text(node, "ambient"), LightSet::default().ambient)?;
    let point_lights = node
        .children()
        .filter(|n| n.has_tag_name("point"))
        .map(|point| {
            Ok(PointLight {
                position: parse_vec3(Some(required_text(&point, "position")?), Vec3::ZERO)?,
                color: parse_vec3(optional_text(&point, "color"), Vec3::ONE)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LightSet {
        ambient,
        point_lights,
    })
}

fn parse_model(node: &Node<'_, '_>) -> Result<ModelDescription> {
    let kind: PrimitiveKind = required_text(node, "type")?.parse()?;
    let shader: ShaderKind = optional_text(node, "shader")
        .map(|text| text.parse::<ShaderKind>())
        .transpose()?
        .unwrap_or(ShaderKind::Color);

    let material = match child(node, "material") {
        Some(material) => {
            let defaults = Material::default();
            let shininess = parse_f32(optional_text(&material, "shininess"), defaults.shininess)?;
            if shininess < 0.0 {
                bail!("material shininess must not be negative");
            }
            Material {
                color: parse_vec3(optional_text(&material, "color"), defaults.color)?,
                specular: parse_vec3(optional_text(&material, "specular"), defaults.specular)?,
                shininess,
            }
        }
        None => Material::default(),
    };

    let texture = child(node, "texture")
        .map(|texture| -> Result<TextureDescription> {
            Ok(TextureDescription {
                url: required_text(&texture, "url")?,
                scale: parse_vec2(optional_text(&texture, "scale"), Vec2::ONE)?,
            })
        })
        .transpose()?;
    if shader == ShaderKind::Texture && texture.is_none() {
        bail!("texture shader requires a <texture> element");
    }

    Ok(ModelDescription {
        kind,
        shader,
        center: parse_vec3(optional_text(node, "center"), Vec3::ZERO)?,
        size: parse_vec3(optional_text(node, "size"), Vec3::ONE)?,
        material,
        texture,
    })
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components<const N: usize>(value: &str) -> Result<[f32; N]> {
    let mut components = [0.0; N];
    let mut numbers = value.split_whitespace().map(|part| {
        part.parse::<f32>()
            .map_err(|err| anyhow!("invalid number `{part}`: {err}"))
    });
    for component in components.iter_mut() {
        *component = numbers
            .next()
            .ok_or_else(|| anyhow!("vector is missing components"))??;
    }
    if numbers.next().is_some() {
        bail!("vector has more than {N} components");
    }
    Ok(components)
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(Vec3::from_array(parse_components::<3>(&value)?)),
        None => Ok(default),
    }
}

fn parse_vec2(value: Option<String>, default: Vec2) -> Result<Vec2> {
    match value {
        Some(value) => Ok(Vec2::from_array(parse_components::<2>(&value)?)),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene>
        <camera>
            <position>0 3 8</position>
            <direction>0 -0.3 -1</direction>
            <up>0 1 0</up>
        </camera>
        <light>
            <ambient>0.2 0.2 0.2</ambient>
            <point>
                <position>2 4 2</position>
                <color>1 1 0.8</color>
            </point>
            <point>
                <position>-2 1 0</position>
            </point>
        </light>
        <model>
            <type>plane</type>
            <shader>texture</shader>
            <size>8 1 8</size>
            <material>
                <color>0.9 0.9 0.9</color>
                <shininess>4</shininess>
            </material>
            <texture>
                <url>images/checker.png</url>
                <scale>4 4</scale>
            </texture>
        </model>
        <model>
            <type>sphere</type>
            <center>0 1 0</center>
            <material>
                <color>0.8 0.1 0.1</color>
                <specular>1 1 1</specular>
                <shininess>32</shininess>
            </material>
        </model>
    </scene>
    "#;

    #[test]
    fn parse_scene_populates_camera_lights_and_models() {
        let scene = SceneDescription::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.camera.position, Vec3::new(0.0, 3.0, 8.0));
        assert_eq!(scene.light.point_lights.len(), 2);
        assert_eq!(scene.light.point_lights[1].color, Vec3::ONE);
        assert_eq!(scene.models.len(), 2);

        let plane = &scene.models[0];
        assert_eq!(plane.kind, PrimitiveKind::Plane);
        assert_eq!(plane.shader, ShaderKind::Texture);
        assert_eq!(plane.size, Vec3::new(8.0, 1.0, 8.0));
        let texture = plane.texture.as_ref().unwrap();
        assert_eq!(texture.url, "images/checker.png");
        assert_eq!(texture.scale, Vec2::new(4.0, 4.0));

        let sphere = &scene.models[1];
        assert_eq!(sphere.shader, ShaderKind::Color);
        assert_eq!(sphere.size, Vec3::ONE);
        assert!((sphere.material.shininess - 32.0).abs() < f32::EPSILON);
    }

    #[test]
    fn texture_shader_without_texture_is_an_error() {
        let bad = "<scene><model><type>cube</type><shader>texture</shader></model></scene>";
        assert!(SceneDescription::from_xml(bad).is_err());
    }

    #[test]
    fn parallel_camera_vectors_are_rejected() {
        let bad = "<scene><camera><direction>0 1 0</direction><up>0 2 0</up></camera></scene>";
        assert!(SceneDescription::from_xml(bad).is_err());
    }

    #[test]
    fn unknown_primitive_is_an_error() {
        let bad = "<scene><model><type>torus</type></model></scene>";
        let err = SceneDescription::from_xml(bad).unwrap_err();
        assert!(format!("{err:#}").contains("torus"));
    }

    #[test]
    fn short_camera_vectors_are_not_degenerate() {
        let camera = Camera {
            position: Vec3::ZERO,
            direction: Vec3::new(0.0, 0.0, -1e-3),
            up: Vec3::new(0.0, 1e-3, 0.0),
        };
        assert!(!camera.is_degenerate());

        let parallel = Camera {
            up: Vec3::new(0.0, 0.0, 5.0),
            ..camera
        };
        assert!(parallel.is_degenerate());

        let zero = Camera {
            direction: Vec3::ZERO,
            ..camera
        };
        assert!(zero.is_degenerate());
    }
}
