//! Descriptor set layout, pool and writes.
//!
//! Every model gets one descriptor set per frame in flight, all with the same
//! layout: the camera uniform buffer, the three material textures and the three
//! gbuffer attachments.

use anyhow::Result;
use ash::vk;

use crate::buffer::Buffer;
use crate::core::device::Device;
use crate::image::Texture;
use crate::pass::gbuffer::GBufferTarget;
use crate::sampler::Sampler;

/// Binding index of the camera uniform buffer (vertex stage).
pub const BINDING_CAMERA: u32 = 0;
/// First material texture binding: base color, normal, metal-roughness occupy 1..=3.
pub const BINDING_MATERIAL: u32 = 1;
/// First gbuffer sampler binding: albedo, normal, metal-roughness occupy 4..=6.
pub const BINDING_GBUFFER: u32 = 4;
/// Total bindings per set.
pub const BINDING_COUNT: u32 = 7;

/// The three material textures bound for one model. Slots a model's material does
/// not provide carry the shared white fallback texture.
#[derive(Debug, Copy, Clone)]
pub struct MaterialBindings<'a> {
    pub base_color: &'a Texture,
    pub normal: &'a Texture,
    pub metal_rough: &'a Texture,
}

impl<'a> MaterialBindings<'a> {
    /// Resolve one model's loaded textures into its three bindings. A binding whose
    /// material named no texture path resolves to the shared `fallback`.
    pub fn resolve(
        base_color: &'a Option<Texture>,
        normal: &'a Option<Texture>,
        metal_rough: &'a Option<Texture>,
        fallback: &'a Texture,
    ) -> Self {
        MaterialBindings {
            base_color: resolve_binding(base_color, fallback),
            normal: resolve_binding(normal, fallback),
            metal_rough: resolve_binding(metal_rough, fallback),
        }
    }
}

/// Pick the loaded texture for one material binding, or the shared fallback when
/// the material named no path for it.
pub(crate) fn resolve_binding<'a, T>(loaded: &'a Option<T>, fallback: &'a T) -> &'a T {
    loaded.as_ref().unwrap_or(fallback)
}

/// Owns the descriptor set layout and pool, and performs all descriptor writes.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Descriptors {
    #[derivative(Debug = "ignore")]
    device: Device,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    frames_in_flight: usize,
}

impl Descriptors {
    /// Create the layout and a pool sized for `model_count` models with
    /// `frames_in_flight` sets each.
    pub fn new(device: Device, model_count: usize, frames_in_flight: usize) -> Result<Self> {
        let mut bindings = vec![vk::DescriptorSetLayoutBinding {
            binding: BINDING_CAMERA,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        }];
        for binding in BINDING_MATERIAL..BINDING_COUNT {
            bindings.push(vk::DescriptorSetLayoutBinding {
                binding,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            });
        }
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorSetLayout {layout:p}");

        let set_count = (model_count * frames_in_flight).max(1) as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: set_count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: set_count * (BINDING_COUNT - 1),
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(set_count)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorPool {pool:p}");

        Ok(Descriptors {
            device,
            layout,
            pool,
            frames_in_flight,
        })
    }

    /// The set layout, used for the pipeline layout.
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Allocate one set per frame in flight for a single model.
    pub fn allocate_model_sets(&self) -> Result<Vec<vk::DescriptorSet>> {
        let layouts = vec![self.layout; self.frames_in_flight];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&info)? };
        Ok(sets)
    }

    /// Write the camera uniform and material bindings of one model's sets.
    /// `uniforms[n]` is frame slot n's uniform buffer; these bindings never change
    /// after this write.
    pub fn write_static_bindings(
        &self,
        sets: &[vk::DescriptorSet],
        uniforms: &[Buffer],
        material: MaterialBindings,
    ) -> Result<()> {
        for (set, uniform) in sets.iter().zip(uniforms) {
            let buffer_info = vk::DescriptorBufferInfo {
                buffer: unsafe { uniform.handle() },
                offset: 0,
                range: uniform.size(),
            };
            let image_infos = [
                texture_info(material.base_color),
                texture_info(material.normal),
                texture_info(material.metal_rough),
            ];
            let mut writes = vec![vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(BINDING_CAMERA)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(&buffer_info))
                .build()];
            for (offset, info) in image_infos.iter().enumerate() {
                writes.push(
                    vk::WriteDescriptorSet::builder()
                        .dst_set(*set)
                        .dst_binding(BINDING_MATERIAL + offset as u32)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(info))
                        .build(),
                );
            }
            unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        }
        Ok(())
    }

    /// Rewrite the gbuffer bindings of the given sets to the attachment views of one
    /// swapchain image's target. Called once per frame after the slot fence signals,
    /// which guarantees no GPU work still reads these sets; this also covers view
    /// identity changes after swapchain recreation.
    pub fn write_gbuffer_bindings(
        &self,
        sets: &[vk::DescriptorSet],
        target: &GBufferTarget,
        sampler: &Sampler,
    ) {
        let views = target.views();
        let image_infos: Vec<vk::DescriptorImageInfo> = views
            .iter()
            .map(|view| vk::DescriptorImageInfo {
                sampler: unsafe { sampler.handle() },
                image_view: unsafe { view.handle() },
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect();
        for set in sets {
            let writes: Vec<vk::WriteDescriptorSet> = image_infos
                .iter()
                .enumerate()
                .map(|(offset, info)| {
                    vk::WriteDescriptorSet::builder()
                        .dst_set(*set)
                        .dst_binding(BINDING_GBUFFER + offset as u32)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(info))
                        .build()
                })
                .collect();
            unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        }
    }
}

fn texture_info(texture: &Texture) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo {
        sampler: unsafe { texture.sampler.handle() },
        image_view: unsafe { texture.view.handle() },
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

impl Drop for Descriptors {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorPool {:p}", self.pool);
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::resolve_binding;
    use crate::scene::mesh::Material;

    #[test]
    fn absent_material_paths_resolve_to_the_fallback() {
        let material = Material {
            base_color: Some(PathBuf::from("data/albedo.png")),
            normal: None,
            metal_rough: None,
            transparent: false,
        };
        // Loading maps each named path to a texture; unnamed slots stay empty.
        let loaded = [&material.base_color, &material.normal, &material.metal_rough]
            .map(|path| path.as_ref().map(|path| path.display().to_string()));
        let fallback = String::from("white");

        assert_eq!(resolve_binding(&loaded[0], &fallback).as_str(), "data/albedo.png");
        assert_eq!(resolve_binding(&loaded[1], &fallback).as_str(), "white");
        assert_eq!(resolve_binding(&loaded[2], &fallback).as_str(), "white");
    }
}
