//! Per-frame draw list construction.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use log::debug;

use super::backend::{DrawCall, Frame, RenderBackend, TextureBinding, TEXTURE_UNIT};
use super::error::RenderError;
use super::shaders::{ShaderRegistry, ShaderVariant, ShadingAlgorithm};
use super::uniforms::{EmissiveUniforms, LitUniforms, UniformBlock, MAX_POINT_LIGHTS};
use crate::geometry::GeometryProvider;
use crate::scene::{Camera, Model, PrimitiveKind, Scene};

/// Uniform scale of the emissive sphere drawn at each point light.
pub const LIGHT_MARKER_SCALE: f32 = 0.1;

pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

/// Projection and view transforms shared by every draw of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMatrices {
    pub projection: Mat4,
    pub view: Mat4,
}

impl FrameMatrices {
    pub fn new(projection: Mat4, camera: &Camera) -> Self {
        Self {
            projection,
            view: view_matrix(camera),
        }
    }

    pub fn set_camera(&mut self, camera: &Camera) {
        self.view = view_matrix(camera);
    }
}

/// Right-handed perspective projection with a `[0, 1]` depth range.
pub fn projection_matrix(fov_degrees: f32, width: u32, height: u32, near: f32, far: f32) -> Mat4 {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    Mat4::perspective_rh(fov_degrees.to_radians(), aspect, near, far)
}

pub fn view_matrix(camera: &Camera) -> Mat4 {
    Mat4::look_at_rh(camera.position, camera.position + camera.direction, camera.up)
}

/// Scales about the origin first, then translates to `center`.
pub fn model_matrix(center: Vec3, size: Vec3) -> Mat4 {
    Mat4::from_translation(center) * Mat4::from_scale(size)
}

/// Index counts of the vertex arrays uploaded to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexArrays {
    index_counts: BTreeMap<PrimitiveKind, u32>,
}

impl VertexArrays {
    /// Builds and uploads one vertex array per primitive kind.
    pub fn upload<B: RenderBackend + ?Sized>(
        backend: &mut B,
        geometry: &dyn GeometryProvider,
    ) -> Result<Self, RenderError> {
        let mut index_counts = BTreeMap::new();
        for kind in PrimitiveKind::ALL {
            let mesh = geometry.build(kind);
            backend.upload_mesh(kind, &mesh)?;
            debug!(
                "uploaded {kind}: {} vertices, {} indices",
                mesh.vertices.len(),
                mesh.face_index_count()
            );
            index_counts.insert(kind, mesh.face_index_count());
        }
        Ok(Self { index_counts })
    }

    pub fn index_count(&self, kind: PrimitiveKind) -> Option<u32> {
        self.index_counts.get(&kind).copied()
    }
}

/// Turns a scene into the ordered draw list for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameRenderer {
    pub clear_color: [f32; 4],
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self {
            clear_color: DEFAULT_CLEAR_COLOR,
        }
    }
}

impl FrameRenderer {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self { clear_color }
    }

    /// Models in scene order, then one emissive marker per point light.
    /// Variants without a linked program and primitives without a vertex
    /// array produce no draw.
    pub fn build(
        &self,
        scene: &Scene,
        matrices: &FrameMatrices,
        algorithm: ShadingAlgorithm,
        registry: &ShaderRegistry,
        arrays: &VertexArrays,
    ) -> Result<Frame, RenderError> {
        let lights = &scene.light.point_lights;
        if lights.len() > MAX_POINT_LIGHTS {
            return Err(RenderError::TooManyLights {
                count: lights.len(),
            });
        }

        let mut frame = Frame::new(self.clear_color);
        for model in &scene.models {
            let variant = ShaderVariant::lit(algorithm, model.shader());
            if !registry.is_ready(variant) {
                continue;
            }
            let Some(index_count) = arrays.index_count(model.kind) else {
                continue;
            };
            frame.draws.push(lit_draw(scene, model, matrices, variant, index_count));
        }

        if registry.is_ready(ShaderVariant::Emissive) {
            if let Some(index_count) = arrays.index_count(PrimitiveKind::Sphere) {
                for light in lights {
                    let model = model_matrix(light.position, Vec3::splat(LIGHT_MARKER_SCALE));
                    frame.draws.push(DrawCall {
                        variant: ShaderVariant::Emissive,
                        primitive: PrimitiveKind::Sphere,
                        index_count,
                        uniforms: UniformBlock::Emissive(EmissiveUniforms::new(
                            matrices.projection,
                            matrices.view,
                            model,
                            light.color,
                        )),
                        texture: None,
                    });
                }
            }
        }
        Ok(frame)
    }

    /// Builds the frame and submits it.
    pub fn render<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        scene: &Scene,
        matrices: &FrameMatrices,
        algorithm: ShadingAlgorithm,
        registry: &ShaderRegistry,
        arrays: &VertexArrays,
    ) -> Result<(), RenderError> {
        let frame = self.build(scene, matrices, algorithm, registry, arrays)?;
        backend.submit(&frame)
    }
}

fn lit_draw(
    scene: &Scene,
    model: &Model,
    matrices: &FrameMatrices,
    variant: ShaderVariant,
    index_count: u32,
) -> DrawCall {
    let mut uniforms = LitUniforms::new(
        matrices.projection,
        matrices.view,
        model_matrix(model.center, model.size),
    );
    uniforms.set_material(
        model.material.color,
        model.material.specular,
        model.material.shininess,
    );
    uniforms.set_camera_position(scene.camera.position);
    uniforms.set_lights(
        scene.light.ambient,
        scene
            .light
            .point_lights
            .iter()
            .map(|light| (light.position, light.color)),
    );

    let texture = model.texture().map(|texture| {
        uniforms.set_texture_scale(texture.scale);
        TextureBinding {
            unit: TEXTURE_UNIT,
            texture: texture.id,
        }
    });

    DrawCall {
        variant,
        primitive: model.kind,
        index_count,
        uniforms: UniformBlock::Lit(uniforms),
        texture,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::CollectingReporter;
    use crate::geometry::BuiltinGeometry;
    use crate::render::headless::HeadlessBackend;
    use crate::render::shaders::ShaderSources;
    use crate::render::texture::TextureId;
    use crate::scene::{LightSet, Material, PointLight, Surface, TextureRef};
    use glam::Vec2;

    struct Fixture {
        registry: ShaderRegistry,
        arrays: VertexArrays,
        matrices: FrameMatrices,
    }

    fn fixture() -> Fixture {
        let mut backend = HeadlessBackend::new(640, 480);
        let mut registry = ShaderRegistry::new();
        registry.build_all(&mut backend, &ShaderSources::embedded(), &CollectingReporter::default());
        let arrays = VertexArrays::upload(&mut backend, &BuiltinGeometry::default()).unwrap();
        let matrices = FrameMatrices::new(
            projection_matrix(45.0, 640, 480, 1.0, 50.0),
            &Camera::default(),
        );
        Fixture {
            registry,
            arrays,
            matrices,
        }
    }

    fn model(kind: PrimitiveKind, surface: Surface) -> Model {
        Model {
            kind,
            surface,
            center: Vec3::ZERO,
            size: Vec3::ONE,
            material: Material::default(),
        }
    }

    fn scene_with_lights(count: usize) -> Scene {
        Scene {
            light: LightSet {
                ambient: Vec3::splat(0.1),
                point_lights: (0..count)
                    .map(|i| PointLight {
                        position: Vec3::new(i as f32, 2.0, 0.0),
                        color: Vec3::ONE,
                    })
                    .collect(),
            },
            models: vec![model(PrimitiveKind::Cube, Surface::Color)],
            ..Scene::default()
        }
    }

    fn build(fixture: &Fixture, scene: &Scene, algorithm: ShadingAlgorithm) -> Frame {
        FrameRenderer::default()
            .build(
                scene,
                &fixture.matrices,
                algorithm,
                &fixture.registry,
                &fixture.arrays,
            )
            .unwrap()
    }

    #[test]
    fn model_matrix_translation_ignores_scale() {
        let matrix = model_matrix(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(2.0));
        assert_eq!(matrix.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(matrix.transform_point3(Vec3::X), Vec3::new(3.0, 2.0, 3.0));
    }

    #[test]
    fn models_draw_in_order_before_light_markers() {
        let fixture = fixture();
        let mut scene = scene_with_lights(2);
        scene.models.push(model(PrimitiveKind::Plane, Surface::Color));
        let frame = build(&fixture, &scene, ShadingAlgorithm::Gouraud);

        let layout: Vec<_> = frame.draws.iter().map(|d| (d.variant, d.primitive)).collect();
        assert_eq!(
            layout,
            [
                (ShaderVariant::GouraudColor, PrimitiveKind::Cube),
                (ShaderVariant::GouraudColor, PrimitiveKind::Plane),
                (ShaderVariant::Emissive, PrimitiveKind::Sphere),
                (ShaderVariant::Emissive, PrimitiveKind::Sphere),
            ]
        );
        assert_eq!(frame.clear_color, DEFAULT_CLEAR_COLOR);
        assert_eq!(frame.draws[0].index_count, 36);
    }

    #[test]
    fn nums_light_matches_point_light_count() {
        let fixture = fixture();
        for count in 0..=MAX_POINT_LIGHTS {
            let frame = build(&fixture, &scene_with_lights(count), ShadingAlgorithm::Phong);
            match frame.draws[0].uniforms {
                UniformBlock::Lit(block) => assert_eq!(block.nums_light as usize, count),
                UniformBlock::Emissive(_) => panic!("first draw should be lit"),
            }
            assert_eq!(frame.draws_with(ShaderVariant::Emissive).count(), count);
        }
    }

    #[test]
    fn too_many_lights_is_rejected() {
        let fixture = fixture();
        let err = FrameRenderer::default()
            .build(
                &scene_with_lights(MAX_POINT_LIGHTS + 1),
                &fixture.matrices,
                ShadingAlgorithm::Gouraud,
                &fixture.registry,
                &fixture.arrays,
            )
            .unwrap_err();
        assert!(matches!(err, RenderError::TooManyLights { count: 11 }));
    }

    #[test]
    fn texture_binding_only_for_textured_models() {
        let fixture = fixture();
        let mut scene = scene_with_lights(1);
        scene.models.push(model(
            PrimitiveKind::Plane,
            Surface::Texture(TextureRef {
                scale: Vec2::new(4.0, 2.0),
                id: TextureId(3),
            }),
        ));
        let frame = build(&fixture, &scene, ShadingAlgorithm::Gouraud);

        let color = &frame.draws[0];
        assert!(color.texture.is_none());
        let UniformBlock::Lit(block) = color.uniforms else {
            panic!("expected lit uniforms");
        };
        assert_eq!(block.texture_scale, [0.0, 0.0]);

        let textured = &frame.draws[1];
        assert_eq!(textured.variant, ShaderVariant::GouraudTexture);
        assert_eq!(
            textured.texture,
            Some(TextureBinding {
                unit: 0,
                texture: TextureId(3)
            })
        );
        let UniformBlock::Lit(block) = textured.uniforms else {
            panic!("expected lit uniforms");
        };
        assert_eq!(block.texture_scale, [4.0, 2.0]);
    }

    #[test]
    fn light_marker_is_scaled_sphere_at_light() {
        let fixture = fixture();
        let mut scene = scene_with_lights(0);
        scene.models[0].center = Vec3::new(5.0, 5.0, 5.0);
        scene.models[0].size = Vec3::splat(3.0);
        scene.light.point_lights.push(PointLight {
            position: Vec3::ZERO,
            color: Vec3::ONE,
        });
        let frame = build(&fixture, &scene, ShadingAlgorithm::Phong);

        let marker = frame.draws_with(ShaderVariant::Emissive).next().unwrap();
        assert_eq!(
            marker.uniforms.model_matrix(),
            Mat4::from_scale(Vec3::splat(0.1))
        );
        let UniformBlock::Emissive(block) = marker.uniforms else {
            panic!("expected emissive uniforms");
        };
        assert_eq!(block.material_color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn failed_variant_draws_nothing() {
        let mut backend = HeadlessBackend::new(64, 64);
        backend.fail_link(ShaderVariant::PhongColor);
        let mut registry = ShaderRegistry::new();
        let reporter = CollectingReporter::default();
        registry.build_all(&mut backend, &ShaderSources::embedded(), &reporter);
        let arrays = VertexArrays::upload(&mut backend, &BuiltinGeometry::default()).unwrap();
        let matrices = FrameMatrices::new(Mat4::IDENTITY, &Camera::default());

        let frame = FrameRenderer::default()
            .build(
                &scene_with_lights(1),
                &matrices,
                ShadingAlgorithm::Phong,
                &registry,
                &arrays,
            )
            .unwrap();
        assert_eq!(frame.draws.len(), 1);
        assert_eq!(frame.draws[0].variant, ShaderVariant::Emissive);
        assert_eq!(reporter.messages().len(), 1);
    }
}
