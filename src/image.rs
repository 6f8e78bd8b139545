//! Image, image view and texture wrappers.

use std::path::Path;

use anyhow::Result;
use ash::vk;

use crate::allocator::{Allocation, Allocator, MemoryType};
use crate::buffer::Buffer;
use crate::command_pool::CommandPool;
use crate::core::device::Device;
use crate::core::error::Error;
use crate::sampler::Sampler;

/// Wrapper around a [`VkImage`](vk::Image). Images owned by the renderer carry their
/// backing allocation; swapchain images do not, since the swapchain owns their memory.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Image {
    #[derivative(Debug = "ignore")]
    device: Device,
    /// `None` for images whose memory is managed externally, such as swapchain images.
    #[derivative(Debug = "ignore")]
    memory: Option<Allocation>,
    handle: vk::Image,
    format: vk::Format,
    extent: vk::Extent2D,
}

/// Wrapper around a [`VkImageView`](vk::ImageView) over a single 2D image.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ImageView {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::ImageView,
    format: vk::Format,
}

impl Image {
    /// Allocate a new 2D image in device-local memory.
    pub fn new(
        device: Device,
        allocator: &Allocator,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let handle = unsafe { device.create_image(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {handle:p}");

        let requirements = unsafe { device.get_image_memory_requirements(handle) };
        let memory = allocator.allocate("image", &requirements, MemoryType::GpuOnly)?;
        unsafe { device.bind_image_memory(handle, memory.memory(), memory.offset())? };

        Ok(Self {
            device,
            memory: Some(memory),
            handle,
            format,
            extent,
        })
    }

    /// Wrap an externally owned image, such as a swapchain image. The wrapper will
    /// not destroy the handle on drop.
    pub fn external(device: Device, handle: vk::Image, format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            device,
            memory: None,
            handle,
            format,
            extent,
        }
    }

    /// Create a view over the whole image with the given aspect.
    pub fn view(&self, aspect: vk::ImageAspectFlags) -> Result<ImageView> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(self.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let handle = unsafe { self.device.create_image_view(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImageView {handle:p}");
        Ok(ImageView {
            device: self.device.clone(),
            handle,
            format: self.format,
        })
    }

    /// Image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get unsafe access to the underlying `VkImage` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Image {
        self.handle
    }
}

impl ImageView {
    /// View format, inherited from the parent image.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Get unsafe access to the underlying `VkImageView` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if self.memory.is_some() {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkImage {:p}", self.handle);
            unsafe {
                self.device.destroy_image(self.handle, None);
            }
        }
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImageView {:p}", self.handle);
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}

/// A sampled texture: an image in `SHADER_READ_ONLY_OPTIMAL` layout together with a
/// view and a sampler, ready to be bound as a combined image sampler.
#[derive(Debug)]
pub struct Texture {
    pub image: Image,
    pub view: ImageView,
    pub sampler: Sampler,
}

impl Texture {
    /// Load a texture from an image file on disk. RGBA8 with sRGB-less storage;
    /// color space handling is done in the shaders.
    pub fn from_file(
        device: Device,
        allocator: &Allocator,
        pool: &CommandPool,
        path: &Path,
    ) -> Result<Self> {
        let data = image::open(path)
            .map_err(|_| Error::TextureLoadFailed(path.to_path_buf()))?
            .into_rgba8();
        let extent = vk::Extent2D {
            width: data.width(),
            height: data.height(),
        };
        Self::from_pixels(device, allocator, pool, extent, data.as_raw())
    }

    /// Create a 1x1 opaque white texture. Bound in place of material textures a
    /// model does not provide, so the descriptor layout never has unbound slots.
    pub fn white(device: Device, allocator: &Allocator, pool: &CommandPool) -> Result<Self> {
        Self::from_pixels(
            device,
            allocator,
            pool,
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            &[0xFF, 0xFF, 0xFF, 0xFF],
        )
    }

    /// Upload raw RGBA8 pixels into a new device-local texture and transition it to
    /// `SHADER_READ_ONLY_OPTIMAL`.
    pub fn from_pixels(
        device: Device,
        allocator: &Allocator,
        pool: &CommandPool,
        extent: vk::Extent2D,
        pixels: &[u8],
    ) -> Result<Self> {
        let mut staging = Buffer::new(
            device.clone(),
            allocator,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryType::CpuToGpu,
        )?;
        // SAFETY: The staging buffer was created with exactly `pixels.len()` bytes.
        unsafe { staging.mapped_slice::<u8>()?.copy_from_slice(pixels) };

        let image = Image::new(
            device.clone(),
            allocator,
            extent,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        pool.submit_once(|cmd| {
            let range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            };
            let to_transfer = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(unsafe { image.handle() })
                .subresource_range(range)
                .build();
            let copy = vk::BufferImageCopy::builder()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .build();
            let to_sampled = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(unsafe { image.handle() })
                .subresource_range(range)
                .build();
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_transfer),
                );
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    image.handle(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&copy),
                );
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_sampled),
                );
            }
            Ok(())
        })?;

        let view = image.view(vk::ImageAspectFlags::COLOR)?;
        let sampler = Sampler::new(device)?;
        Ok(Texture {
            image,
            view,
            sampler,
        })
    }
}
