#[cfg(feature = "shaderc")]
extern crate shaderc;

#[allow(unused_imports)]
use std::fs::File;
#[allow(unused_imports)]
use std::io::{Read, Write};
#[allow(unused_imports)]
use std::path::Path;

#[cfg(feature = "shaderc")]
use shaderc::{CompileOptions, EnvVersion, TargetEnv};

#[cfg(feature = "shaderc")]
fn load_file(path: &Path) -> String {
    let mut out = String::new();
    File::open(path).unwrap().read_to_string(&mut out).unwrap();
    out
}

#[cfg(feature = "shaderc")]
fn save_file(path: &Path, binary: &[u8]) {
    File::create(path).unwrap().write_all(binary).unwrap();
}

#[cfg(feature = "shaderc")]
fn compile_shader(path: &Path, kind: shaderc::ShaderKind, output: &Path) {
    let compiler = shaderc::Compiler::new().unwrap();
    let mut options = CompileOptions::new().unwrap();
    options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_2 as u32);
    let binary = compiler
        .compile_into_spirv(&load_file(path), kind, path.as_os_str().to_str().unwrap(), "main", Some(&options))
        .unwrap();
    save_file(output, binary.as_binary_u8());
}

#[cfg(feature = "shaderc")]
fn compile_shaders() {
    println!("cargo:rerun-if-changed=shaders/depth.vert.glsl");
    println!("cargo:rerun-if-changed=shaders/geometry.vert.glsl");
    println!("cargo:rerun-if-changed=shaders/geometry.frag.glsl");
    println!("cargo:rerun-if-changed=shaders/combine.vert.glsl");
    println!("cargo:rerun-if-changed=shaders/combine.frag.glsl");
    println!("cargo:rerun-if-changed=shaders/forward.frag.glsl");

    compile_shader(
        Path::new("shaders/depth.vert.glsl"),
        shaderc::ShaderKind::Vertex,
        Path::new("shaders/depth.vert.spv"),
    );
    compile_shader(
        Path::new("shaders/geometry.vert.glsl"),
        shaderc::ShaderKind::Vertex,
        Path::new("shaders/geometry.vert.spv"),
    );
    compile_shader(
        Path::new("shaders/geometry.frag.glsl"),
        shaderc::ShaderKind::Fragment,
        Path::new("shaders/geometry.frag.spv"),
    );
    compile_shader(
        Path::new("shaders/combine.vert.glsl"),
        shaderc::ShaderKind::Vertex,
        Path::new("shaders/combine.vert.spv"),
    );
    compile_shader(
        Path::new("shaders/combine.frag.glsl"),
        shaderc::ShaderKind::Fragment,
        Path::new("shaders/combine.frag.spv"),
    );
    compile_shader(
        Path::new("shaders/forward.frag.glsl"),
        shaderc::ShaderKind::Fragment,
        Path::new("shaders/forward.frag.spv"),
    );
}

fn main() {
    #[cfg(feature = "shaderc")]
    compile_shaders();
}
