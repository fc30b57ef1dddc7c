use assert_cmd::prelude::*;
use image::{Rgba, RgbaImage};
use predicates::str::contains;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const SCENE: &str = r#"<scene>
  <camera>
    <position>0 2 6</position>
    <direction>0 -0.3 -1</direction>
    <up>0 1 0</up>
  </camera>
  <light>
    <ambient>0.2 0.2 0.2</ambient>
    <point><position>2 3 2</position><color>1 1 1</color></point>
    <point><position>-2 3 0</position><color>0.5 0.5 1</color></point>
  </light>
  <model>
    <type>plane</type>
    <shader>texture</shader>
    <size>6 1 6</size>
    <texture><url>tile.png</url><scale>3 3</scale></texture>
  </model>
  <model>
    <type>sphere</type>
    <center>0 1 0</center>
    <material><color>0.8 0.2 0.2</color><specular>1 1 1</specular><shininess>24</shininess></material>
  </model>
  <model>
    <type>cube</type>
    <shader>texture</shader>
    <center>2 0.5 0</center>
    <texture><url>missing.png</url></texture>
  </model>
</scene>
"#;

fn write_scene(xml: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let scene = dir.path().join("scene.xml");
    std::fs::write(&scene, xml).expect("write scene");
    RgbaImage::from_pixel(4, 4, Rgba([10, 200, 30, 255]))
        .save(dir.path().join("tile.png"))
        .expect("write texture");
    (dir, scene)
}

fn copy_shaders(to: &Path) {
    let from = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
    for entry in std::fs::read_dir(from).expect("shader dir") {
        let entry = entry.expect("shader entry");
        std::fs::copy(entry.path(), to.join(entry.file_name())).expect("copy shader");
    }
}

#[test]
fn summary_reports_scene_programs_and_draws() {
    let (_dir, scene) = write_scene(SCENE);
    let mut cmd = Command::cargo_bin("shade-illuminate").expect("binary exists");
    cmd.arg(&scene).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 3 models (2 lights)"))
        .stdout(contains(" - plane (texture, tile.png)"))
        .stdout(contains(" - sphere (color)"))
        .stdout(contains("Built 5/5 shader programs"))
        .stdout(contains("Textures: 1 ready, 1 failed"))
        .stdout(contains("Rendered 5 draws with gouraud shading"))
        .stdout(contains("Rendered 5 draws with phong shading"));
}

#[test]
fn broken_shader_is_reported_but_not_fatal() {
    let (dir, scene) = write_scene(SCENE);
    let shaders = dir.path().join("shaders");
    std::fs::create_dir(&shaders).expect("shader dir");
    copy_shaders(&shaders);
    std::fs::write(shaders.join("phong_color.frag.wgsl"), "this is not wgsl").expect("break shader");

    let mut cmd = Command::cargo_bin("shade-illuminate").expect("binary exists");
    cmd.env_remove("RUST_LOG")
        .arg(&scene)
        .arg("--shaders")
        .arg(&shaders)
        .arg("--summary-only");
    cmd.assert()
        .success()
        .stderr(contains("compiling the phong_color fragment shader"))
        .stdout(contains("Built 4/5 shader programs"))
        .stdout(contains("Rendered 5 draws with gouraud shading"))
        .stdout(contains("Rendered 4 draws with phong shading"));
}

#[test]
fn shader_errors_are_reported_once() {
    let (dir, scene) = write_scene(SCENE);
    let shaders = dir.path().join("shaders");
    std::fs::create_dir(&shaders).expect("shader dir");
    copy_shaders(&shaders);
    std::fs::write(shaders.join("emissive.vert.wgsl"), "fn broken(").expect("break shader");

    let output = Command::cargo_bin("shade-illuminate")
        .expect("binary exists")
        .env_remove("RUST_LOG")
        .arg(&scene)
        .arg("--shaders")
        .arg(&shaders)
        .arg("--summary-only")
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr
            .matches("compiling the emissive vertex shader")
            .count(),
        1,
        "stderr was:\n{stderr}"
    );
}

#[test]
fn missing_shader_file_aborts_startup() {
    let (dir, scene) = write_scene(SCENE);
    let shaders = dir.path().join("shaders");
    std::fs::create_dir(&shaders).expect("shader dir");
    copy_shaders(&shaders);
    std::fs::remove_file(shaders.join("emissive.vert.wgsl")).expect("remove shader");

    let mut cmd = Command::cargo_bin("shade-illuminate").expect("binary exists");
    cmd.arg(&scene).arg("--shaders").arg(&shaders).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("failed to fetch emissive.vert.wgsl"));
}

#[test]
fn too_many_lights_is_rejected() {
    let lights: String = (0..11)
        .map(|i| format!("<point><position>{i} 1 0</position></point>"))
        .collect();
    let xml = format!("<scene><light>{lights}</light><model><type>cube</type></model></scene>");
    let (_dir, scene) = write_scene(&xml);

    let mut cmd = Command::cargo_bin("shade-illuminate").expect("binary exists");
    cmd.arg(&scene).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("scene has 11 point lights but shaders support at most 10"));
}

#[test]
fn unknown_argument_fails() {
    let (_dir, scene) = write_scene(SCENE);
    let mut cmd = Command::cargo_bin("shade-illuminate").expect("binary exists");
    cmd.arg(&scene).arg("--verbose");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --verbose"));
}
