//! Model loading: OBJ via `tobj` and glTF via the `gltf` crate.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ash::vk;
use glam::{Mat3, Mat4, Vec3};

use crate::core::error::Error;

/// Interleaved vertex format shared by all pipelines.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        let attribute = |location, format, offset| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset,
        };
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
            attribute(1, vk::Format::R32G32B32_SFLOAT, 12),
            attribute(2, vk::Format::R32G32B32_SFLOAT, 24),
            attribute(3, vk::Format::R32G32_SFLOAT, 36),
        ]
    }
}

/// Texture paths and blend behavior of a mesh's material. Missing paths get the
/// white fallback texture at descriptor-write time.
#[derive(Debug, Clone, Default)]
pub struct Material {
    pub base_color: Option<PathBuf>,
    pub normal: Option<PathBuf>,
    pub metal_rough: Option<PathBuf>,
    /// Whether this mesh goes to the transparent draw list.
    pub transparent: bool,
}

/// One loaded mesh: vertices in world space (node transforms applied), u32 indices
/// and its material.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: Material,
}

/// Load all meshes from a model file. The loader is picked from the extension;
/// anything that is not OBJ or glTF is rejected.
pub fn load(path: &Path) -> Result<Vec<MeshData>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "obj" => load_obj(path),
        "gltf" | "glb" => load_gltf(path),
        other => Err(anyhow::Error::from(Error::UnsupportedModelFormat(other.to_owned()))),
    }
}

fn load_obj(path: &Path) -> Result<Vec<MeshData>> {
    let (models, materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)?;
    let materials = materials.unwrap_or_default();
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    models
        .into_iter()
        .map(|model| {
            let mesh = model.mesh;
            let vertex_count = mesh.positions.len() / 3;
            let vertices = (0..vertex_count)
                .map(|index| Vertex {
                    position: [
                        mesh.positions[3 * index],
                        mesh.positions[3 * index + 1],
                        mesh.positions[3 * index + 2],
                    ],
                    normal: if mesh.normals.is_empty() {
                        [0.0, 1.0, 0.0]
                    } else {
                        [
                            mesh.normals[3 * index],
                            mesh.normals[3 * index + 1],
                            mesh.normals[3 * index + 2],
                        ]
                    },
                    color: if mesh.vertex_color.is_empty() {
                        [1.0, 1.0, 1.0]
                    } else {
                        [
                            mesh.vertex_color[3 * index],
                            mesh.vertex_color[3 * index + 1],
                            mesh.vertex_color[3 * index + 2],
                        ]
                    },
                    uv: if mesh.texcoords.is_empty() {
                        [0.0, 0.0]
                    } else {
                        [mesh.texcoords[2 * index], mesh.texcoords[2 * index + 1]]
                    },
                })
                .collect();

            let material = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map(|material| Material {
                    base_color: material
                        .diffuse_texture
                        .as_ref()
                        .map(|texture| base_dir.join(texture)),
                    normal: material
                        .normal_texture
                        .as_ref()
                        .map(|texture| base_dir.join(texture)),
                    metal_rough: None,
                    transparent: material.dissolve.map(|dissolve| dissolve < 1.0).unwrap_or(false),
                })
                .unwrap_or_default();

            Ok(MeshData {
                name: model.name,
                vertices,
                indices: mesh.indices,
                material,
            })
        })
        .collect()
}

fn load_gltf(path: &Path) -> Result<Vec<MeshData>> {
    let (document, buffers, _images) = gltf::import(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    let mut meshes = Vec::new();
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next());
    if let Some(scene) = scene {
        for node in scene.nodes() {
            load_gltf_node(path, base_dir, &buffers, &node, Mat4::IDENTITY, &mut meshes)?;
        }
    }
    Ok(meshes)
}

fn load_gltf_node(
    path: &Path,
    base_dir: &Path,
    buffers: &[gltf::buffer::Data],
    node: &gltf::Node,
    parent: Mat4,
    out: &mut Vec<MeshData>,
) -> Result<()> {
    // Node transforms accumulate down the hierarchy; vertices are baked into world
    // space so draws need no per-model matrix.
    let transform = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .map(|positions| positions.collect())
                .unwrap_or_default();
            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map(|normals| normals.collect())
                .unwrap_or_default();
            let uvs: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|uvs| uvs.into_f32().collect())
                .unwrap_or_default();
            let colors: Vec<[f32; 3]> = reader
                .read_colors(0)
                .map(|colors| colors.into_rgb_f32().collect())
                .unwrap_or_default();

            let vertices: Vec<Vertex> = positions
                .iter()
                .enumerate()
                .map(|(index, position)| {
                    let position = transform.transform_point3(Vec3::from_array(*position));
                    let normal = normals
                        .get(index)
                        .map(|normal| (normal_matrix * Vec3::from_array(*normal)).normalize())
                        .unwrap_or(Vec3::Y);
                    Vertex {
                        position: position.to_array(),
                        normal: normal.to_array(),
                        color: colors.get(index).copied().unwrap_or([1.0, 1.0, 1.0]),
                        uv: uvs.get(index).copied().unwrap_or([0.0, 0.0]),
                    }
                })
                .collect();

            // All glTF index component widths are widened to u32 here.
            let indices: Vec<u32> = reader
                .read_indices()
                .map(|indices| indices.into_u32().collect())
                .ok_or_else(|| Error::UnsupportedIndexType(path.to_path_buf()))?;

            let gltf_material = primitive.material();
            let pbr = gltf_material.pbr_metallic_roughness();
            let transparent = is_transparent(gltf_material.alpha_mode());
            let material = Material {
                base_color: pbr
                    .base_color_texture()
                    .and_then(|info| texture_uri(base_dir, &info.texture())),
                normal: gltf_material
                    .normal_texture()
                    .and_then(|info| texture_uri(base_dir, &info.texture())),
                metal_rough: pbr
                    .metallic_roughness_texture()
                    .and_then(|info| texture_uri(base_dir, &info.texture())),
                transparent,
            };

            out.push(MeshData {
                name: mesh.name().unwrap_or("unnamed").to_owned(),
                vertices,
                indices,
                material,
            });
        }
    }

    for child in node.children() {
        load_gltf_node(path, base_dir, buffers, &child, transform, out)?;
    }
    Ok(())
}

/// Whether a glTF alpha mode routes a mesh to the transparent draw list. Masked and
/// blended materials both go through the forward pass.
pub fn is_transparent(mode: gltf::material::AlphaMode) -> bool {
    !matches!(mode, gltf::material::AlphaMode::Opaque)
}

fn texture_uri(base_dir: &Path, texture: &gltf::Texture) -> Option<PathBuf> {
    match texture.source().source() {
        gltf::image::Source::Uri {
            uri,
            ..
        } => Some(base_dir.join(uri)),
        // Textures embedded in buffer views are not resolved; the white fallback
        // texture takes their place.
        gltf::image::Source::View {
            ..
        } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_rejected() {
        let error = load(Path::new("scene.fbx")).unwrap_err();
        let error = error.downcast::<Error>().unwrap();
        assert!(matches!(error, Error::UnsupportedModelFormat(ext) if ext == "fbx"));
    }

    #[test]
    fn mask_and_blend_route_to_the_transparent_list() {
        use gltf::material::AlphaMode;
        assert!(!is_transparent(AlphaMode::Opaque));
        assert!(is_transparent(AlphaMode::Mask));
        assert!(is_transparent(AlphaMode::Blend));
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[3].offset, 36);
        assert_eq!(Vertex::binding_description().stride, 44);
    }
}
