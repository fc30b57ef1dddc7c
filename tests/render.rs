use glam::{Mat4, Vec2, Vec3};
use image::{Rgba, RgbaImage};

use shade_illuminate::render::texture::{ImageFetcher, LoadQueue, TextureLoad, PLACEHOLDER_PIXEL};
use shade_illuminate::render::{
    model_matrix, DrawCall, UniformBlock, LIGHT_MARKER_SCALE, MAX_POINT_LIGHTS,
};
use shade_illuminate::{
    Application, BuiltinGeometry, CollectingReporter, HeadlessBackend, LightSet, Material, Model,
    PointLight, PrimitiveKind, Scene, SceneDescription, ShaderSources, ShaderVariant,
    ShadingAlgorithm, Surface, TextureId, ViewerConfig,
};

/// Holds fetches until the test delivers them.
#[derive(Default)]
struct DeferredFetcher {
    requests: std::cell::RefCell<Vec<(String, TextureId, LoadQueue)>>,
}

impl DeferredFetcher {
    fn complete(&self, image: &RgbaImage) {
        for (url, texture, queue) in self.requests.borrow_mut().drain(..) {
            queue.push(TextureLoad {
                texture,
                url,
                result: Ok(image.clone()),
            });
        }
    }
}

impl ImageFetcher for DeferredFetcher {
    fn fetch(&self, url: &str, texture: TextureId, queue: LoadQueue) {
        self.requests
            .borrow_mut()
            .push((url.to_string(), texture, queue));
    }
}

fn application() -> Application<HeadlessBackend> {
    Application::initialize(
        HeadlessBackend::new(640, 480),
        ViewerConfig::default(),
        &ShaderSources::embedded(),
        &BuiltinGeometry::default(),
        &CollectingReporter::default(),
    )
    .expect("headless initialization")
}

fn demo_scene(light_count: usize) -> Scene {
    Scene {
        light: LightSet {
            ambient: Vec3::splat(0.2),
            point_lights: (0..light_count)
                .map(|i| PointLight {
                    position: Vec3::new(i as f32 - 4.0, 3.0, 1.0),
                    color: Vec3::new(1.0, 0.9, 0.8),
                })
                .collect(),
        },
        models: vec![
            Model {
                kind: PrimitiveKind::Sphere,
                surface: Surface::Color,
                center: Vec3::new(0.0, 1.0, 0.0),
                size: Vec3::ONE,
                material: Material {
                    color: Vec3::new(0.8, 0.1, 0.1),
                    specular: Vec3::ONE,
                    shininess: 32.0,
                },
            },
            Model {
                kind: PrimitiveKind::Cube,
                surface: Surface::Color,
                center: Vec3::new(1.0, 2.0, 3.0),
                size: Vec3::splat(2.0),
                material: Material::default(),
            },
        ],
        ..Scene::default()
    }
}

fn lit(draw: &DrawCall) -> shade_illuminate::render::LitUniforms {
    match draw.uniforms {
        UniformBlock::Lit(block) => block,
        UniformBlock::Emissive(_) => panic!("expected a lit draw, got {:?}", draw.variant),
    }
}

#[test]
fn rendering_twice_is_deterministic() {
    let mut app = application();
    app.update_scene(demo_scene(3)).unwrap();
    app.render().unwrap();

    let frames = app.backend().frames();
    let n = frames.len();
    assert_eq!(frames[n - 1], frames[n - 2]);
}

#[test]
fn color_models_never_bind_a_texture() {
    let mut app = application();
    app.update_scene(demo_scene(MAX_POINT_LIGHTS)).unwrap();
    for algorithm in [ShadingAlgorithm::Gouraud, ShadingAlgorithm::Phong] {
        app.set_shading_algorithm(algorithm).unwrap();
        let frame = app.backend().last_frame().unwrap();
        assert!(frame.draws.iter().all(|draw| draw.texture.is_none()));
    }
}

#[test]
fn switching_algorithm_and_back_restores_the_frame() {
    let mut app = application();
    app.update_scene(demo_scene(2)).unwrap();
    let before = app.backend().last_frame().unwrap().clone();

    app.set_shading_algorithm(ShadingAlgorithm::Phong).unwrap();
    let phong = app.backend().last_frame().unwrap().clone();
    assert_ne!(phong, before);
    assert!(phong
        .draws
        .iter()
        .take(2)
        .all(|draw| draw.variant == ShaderVariant::PhongColor));

    app.set_shading_algorithm(ShadingAlgorithm::Gouraud).unwrap();
    assert_eq!(app.backend().last_frame().unwrap(), &before);
    assert_eq!(app.algorithm(), ShadingAlgorithm::Gouraud);
}

#[test]
fn light_marker_is_a_tenth_scale_sphere_at_the_light() {
    let mut app = application();
    let mut scene = demo_scene(0);
    scene.light.point_lights.push(PointLight {
        position: Vec3::ZERO,
        color: Vec3::ONE,
    });
    app.update_scene(scene).unwrap();

    let frame = app.backend().last_frame().unwrap();
    let marker = frame.draws.last().unwrap();
    assert_eq!(marker.variant, ShaderVariant::Emissive);
    assert_eq!(marker.primitive, PrimitiveKind::Sphere);
    let model = marker.uniforms.model_matrix();
    assert_eq!(model, Mat4::from_scale(Vec3::splat(LIGHT_MARKER_SCALE)));
    assert_eq!(model.transform_point3(Vec3::ZERO), Vec3::ZERO);
    assert_eq!(model.transform_point3(Vec3::X), Vec3::new(0.1, 0.0, 0.0));
}

#[test]
fn nums_light_tracks_light_count() {
    let mut app = application();
    for count in [0, 1, 5, MAX_POINT_LIGHTS] {
        app.update_scene(demo_scene(count)).unwrap();
        let frame = app.backend().last_frame().unwrap();
        assert_eq!(lit(&frame.draws[0]).nums_light as usize, count);
        assert_eq!(frame.draws.len(), 2 + count);
    }
}

#[test]
fn model_matrix_translation_is_not_scaled() {
    let mut app = application();
    app.update_scene(demo_scene(1)).unwrap();
    let cube = &app.backend().last_frame().unwrap().draws[1];
    let matrix = Mat4::from_cols_array_2d(&lit(cube).model_matrix);
    assert_eq!(matrix.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(
        matrix,
        model_matrix(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(2.0))
    );
}

#[test]
fn texture_renders_white_until_its_image_arrives() {
    let mut app = application();
    let description = SceneDescription::from_xml(
        r#"<scene>
            <model>
                <type>plane</type>
                <shader>texture</shader>
                <texture><url>brick.png</url><scale>2 2</scale></texture>
            </model>
            <model>
                <type>cube</type>
                <shader>texture</shader>
                <texture><url>brick.png</url></texture>
            </model>
        </scene>"#,
    )
    .unwrap();
    let fetcher = DeferredFetcher::default();
    app.load_scene(&description, &fetcher).unwrap();

    let frame = app.backend().last_frame().unwrap().clone();
    let binding = frame.draws[0].texture.expect("textured draw binds a texture");
    assert_eq!(binding.unit, 0);
    assert_eq!(frame.draws[1].texture, Some(binding));
    assert_eq!(lit(&frame.draws[0]).texture_scale, Vec2::splat(2.0).to_array());
    let placeholder = app.backend().texture(binding.texture).unwrap();
    assert_eq!(placeholder.len(), 1);
    assert_eq!(placeholder[0].dimensions(), (1, 1));
    assert_eq!(placeholder[0].get_pixel(0, 0).0, PLACEHOLDER_PIXEL);

    let frames_before = app.backend().frames().len();
    let image = RgbaImage::from_fn(8, 8, |x, _| Rgba([x as u8 * 30, 0, 0, 255]));
    fetcher.complete(&image);
    assert_eq!(app.process_texture_loads().unwrap(), 1);

    assert_eq!(app.backend().frames().len(), frames_before + 1);
    let after = app.backend().last_frame().unwrap();
    assert_eq!(after.draws[0].texture, Some(binding));
    let levels = app.backend().texture(binding.texture).unwrap();
    assert_eq!(levels.len(), 4);
    assert_eq!(levels[0], image);
    assert_eq!(levels[3].dimensions(), (1, 1));
    assert!(app.textures().is_ready(binding.texture));

    assert_eq!(app.process_texture_loads().unwrap(), 0);
    assert_eq!(app.backend().frames().len(), frames_before + 1);
}

#[test]
fn stale_texture_load_after_scene_swap_is_harmless() {
    let mut app = application();
    let description = SceneDescription::from_xml(
        r#"<scene><model><type>cube</type><shader>texture</shader>
            <texture><url>late.png</url></texture></model></scene>"#,
    )
    .unwrap();
    let fetcher = DeferredFetcher::default();
    app.load_scene(&description, &fetcher).unwrap();
    app.update_scene(demo_scene(1)).unwrap();

    fetcher.complete(&RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])));
    assert_eq!(app.process_texture_loads().unwrap(), 1);
    let frame = app.backend().last_frame().unwrap();
    assert!(frame.draws.iter().all(|draw| draw.texture.is_none()));
}
