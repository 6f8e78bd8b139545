//! The geometry buffer: per-swapchain-image attachment sets plus the shared
//! depth attachment.

use anyhow::Result;
use ash::vk;

use crate::allocator::Allocator;
use crate::core::device::Device;
use crate::image::{Image, ImageView};
use crate::pass::transition::LayoutTracker;

/// Albedo target format.
pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// World-space normal target format.
pub const NORMAL_FORMAT: vk::Format = vk::Format::A2B10G10R10_UNORM_PACK32;
/// Metallic-roughness target format.
pub const METAL_ROUGH_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// Depth attachment format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Number of color targets per gbuffer set.
pub const TARGET_COUNT: usize = 3;

/// One gbuffer attachment: image and whole-image view.
#[derive(Debug)]
pub struct GBufferAttachment {
    pub image: Image,
    pub view: ImageView,
}

impl GBufferAttachment {
    fn new(device: Device, allocator: &Allocator, extent: vk::Extent2D, format: vk::Format) -> Result<Self> {
        let image = Image::new(
            device,
            allocator,
            extent,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        )?;
        let view = image.view(vk::ImageAspectFlags::COLOR)?;
        Ok(GBufferAttachment {
            image,
            view,
        })
    }
}

/// The albedo/normal/metal-roughness targets for a single swapchain image.
#[derive(Debug)]
pub struct GBufferTarget {
    pub albedo: GBufferAttachment,
    pub normal: GBufferAttachment,
    pub metal_rough: GBufferAttachment,
    tracker: LayoutTracker,
}

impl GBufferTarget {
    /// Views of the three targets, in attachment order. This order matches the
    /// geometry pass outputs and the combine shader's sampler bindings.
    pub fn views(&self) -> [&ImageView; TARGET_COUNT] {
        [&self.albedo.view, &self.normal.view, &self.metal_rough.view]
    }
}

/// The full geometry buffer: one target set per swapchain image and one depth
/// attachment shared across all of them. Frames are serialized on the depth
/// attachment by the pre-pass's external subpass dependency.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GBuffer {
    #[derivative(Debug = "ignore")]
    device: Device,
    pub targets: Vec<GBufferTarget>,
    pub depth: GBufferAttachment,
    extent: vk::Extent2D,
}

impl GBuffer {
    /// Create a gbuffer with `image_count` target sets at the given extent.
    pub fn new(
        device: Device,
        allocator: &Allocator,
        extent: vk::Extent2D,
        image_count: usize,
    ) -> Result<Self> {
        let targets = (0..image_count)
            .map(|_| -> Result<GBufferTarget> {
                Ok(GBufferTarget {
                    albedo: GBufferAttachment::new(device.clone(), allocator, extent, ALBEDO_FORMAT)?,
                    normal: GBufferAttachment::new(device.clone(), allocator, extent, NORMAL_FORMAT)?,
                    metal_rough: GBufferAttachment::new(device.clone(), allocator, extent, METAL_ROUGH_FORMAT)?,
                    tracker: LayoutTracker::new(TARGET_COUNT),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let depth = {
            let image = Image::new(
                device.clone(),
                allocator,
                extent,
                DEPTH_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            )?;
            let view = image.view(vk::ImageAspectFlags::DEPTH)?;
            GBufferAttachment {
                image,
                view,
            }
        };

        Ok(GBuffer {
            device,
            targets,
            depth,
            extent,
        })
    }

    /// Extent the gbuffer was created with. Always equals the swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Record the implicit transition the geometry pass performs through its final
    /// attachment layouts. Must be called when the geometry pass for `image_index`
    /// ends.
    pub fn on_geometry_pass_end(&mut self, image_index: usize) {
        let target = &mut self.targets[image_index];
        for index in 0..TARGET_COUNT {
            target.tracker.assume(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }
    }

    /// Transition the targets for `image_index` so the combine pass can sample them.
    pub fn transition_to_sampled(&mut self, cmd: vk::CommandBuffer, image_index: usize) -> Result<()> {
        self.transition(cmd, image_index, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    /// Transition the targets for `image_index` back to attachment layout before the
    /// next frame's geometry pass renders into them.
    pub fn transition_to_attachment(&mut self, cmd: vk::CommandBuffer, image_index: usize) -> Result<()> {
        self.transition(cmd, image_index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
    }

    fn transition(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: usize,
        to: vk::ImageLayout,
    ) -> Result<()> {
        let target = &mut self.targets[image_index];
        let images = [
            unsafe { target.albedo.image.handle() },
            unsafe { target.normal.image.handle() },
            unsafe { target.metal_rough.image.handle() },
        ];
        for (index, image) in images.into_iter().enumerate() {
            let from = target.tracker.current(index);
            let masks = target.tracker.transition(index, to)?;
            let barrier = vk::ImageMemoryBarrier::builder()
                .src_access_mask(masks.src_access)
                .dst_access_mask(masks.dst_access)
                .old_layout(from)
                .new_layout(to)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .build();
            unsafe {
                self.device.cmd_pipeline_barrier(
                    cmd,
                    masks.src_stage,
                    masks.dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&barrier),
                );
            }
        }
        Ok(())
    }
}
