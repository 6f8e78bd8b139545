//! The draw list: all meshes concatenated into one vertex and one index buffer,
//! with per-model draw records partitioned into opaque and transparent lists.

use anyhow::Result;
use ash::vk;

use crate::allocator::Allocator;
use crate::buffer::{upload_buffer, Buffer};
use crate::command_pool::CommandPool;
use crate::core::device::Device;
use crate::scene::mesh::{MeshData, Vertex};

/// One draw in the mega buffers. `first_index` and `vertex_offset` are prefix sums
/// over the meshes that precede this one; `descriptor_sets` holds one set per frame
/// in flight.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub name: String,
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
}

/// The scene's geometry on the GPU. Every mesh lives in exactly one of the two
/// record lists, decided by its material at load time.
#[derive(Debug)]
pub struct DrawList {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub opaque: Vec<DrawRecord>,
    pub transparent: Vec<DrawRecord>,
}

/// Buffer offsets for one mesh: (first_index, index_count, vertex_offset).
pub(crate) fn record_offsets(counts: &[(usize, usize)]) -> Vec<(u32, u32, i32)> {
    let mut first_index = 0u32;
    let mut vertex_offset = 0i32;
    counts
        .iter()
        .map(|&(vertex_count, index_count)| {
            let record = (first_index, index_count as u32, vertex_offset);
            first_index += index_count as u32;
            vertex_offset += vertex_count as i32;
            record
        })
        .collect()
}

/// Split items into (opaque, transparent) by their flag. Relative order within each
/// list is preserved; every item lands in exactly one list.
pub(crate) fn partition<T>(items: Vec<(T, bool)>) -> (Vec<T>, Vec<T>) {
    let mut opaque = Vec::new();
    let mut transparent = Vec::new();
    for (item, is_transparent) in items {
        if is_transparent {
            transparent.push(item);
        } else {
            opaque.push(item);
        }
    }
    (opaque, transparent)
}

impl DrawList {
    /// Upload all meshes and build the draw records. `descriptor_sets[i]` belongs to
    /// `meshes[i]` and must hold one set per frame in flight.
    pub fn build(
        device: Device,
        allocator: &Allocator,
        pool: &CommandPool,
        meshes: &[MeshData],
        descriptor_sets: Vec<Vec<vk::DescriptorSet>>,
    ) -> Result<Self> {
        debug_assert_eq!(meshes.len(), descriptor_sets.len());

        let counts: Vec<(usize, usize)> = meshes
            .iter()
            .map(|mesh| (mesh.vertices.len(), mesh.indices.len()))
            .collect();
        let offsets = record_offsets(&counts);

        let vertices: Vec<Vertex> = meshes.iter().flat_map(|mesh| mesh.vertices.iter().copied()).collect();
        let indices: Vec<u32> = meshes.iter().flat_map(|mesh| mesh.indices.iter().copied()).collect();
        info!(
            "Uploading scene geometry: {} meshes, {} vertices, {} indices",
            meshes.len(),
            vertices.len(),
            indices.len()
        );

        let vertex_buffer = upload_buffer(
            device.clone(),
            allocator,
            pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &vertices,
        )?;
        let index_buffer = upload_buffer(
            device,
            allocator,
            pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &indices,
        )?;

        let records = meshes
            .iter()
            .zip(descriptor_sets)
            .zip(offsets)
            .map(|((mesh, sets), (first_index, index_count, vertex_offset))| {
                (
                    DrawRecord {
                        name: mesh.name.clone(),
                        first_index,
                        index_count,
                        vertex_offset,
                        descriptor_sets: sets,
                    },
                    mesh.material.transparent,
                )
            })
            .collect();
        let (opaque, transparent) = partition(records);

        Ok(DrawList {
            vertex_buffer,
            index_buffer,
            opaque,
            transparent,
        })
    }

    /// All records in both lists.
    pub fn records(&self) -> impl Iterator<Item = &DrawRecord> {
        self.opaque.iter().chain(self.transparent.iter())
    }

    /// Total number of draws.
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_prefix_sums() {
        let offsets = record_offsets(&[(4, 6), (8, 12), (3, 3)]);
        assert_eq!(offsets[0], (0, 6, 0));
        assert_eq!(offsets[1], (6, 12, 4));
        assert_eq!(offsets[2], (18, 3, 12));
    }

    #[test]
    fn empty_scene_has_no_offsets() {
        assert!(record_offsets(&[]).is_empty());
    }

    #[test]
    fn every_item_lands_in_exactly_one_list() {
        let (opaque, transparent) = partition(vec![("floor", false), ("glass", true)]);
        assert_eq!(opaque, vec!["floor"]);
        assert_eq!(transparent, vec!["glass"]);
    }
}
