//! Render pass objects, built from plain-data pass descriptions.

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;
use crate::pass::gbuffer;

/// Description of a single attachment within a [`PassLayout`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttachmentDescription {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

/// Plain-data description of a render pass: its attachments, whether the depth
/// attachment is written or only tested, and the external subpass dependency.
/// Render passes are constructed from these and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct PassLayout {
    pub name: &'static str,
    pub colors: Vec<AttachmentDescription>,
    pub depth: Option<AttachmentDescription>,
    /// Whether the pipeline bound in this pass writes depth. The depth pre-pass is
    /// the only pass that does.
    pub depth_write: bool,
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

impl PassLayout {
    /// The depth pre-pass: no color output, clears the depth attachment and fills it
    /// with the depth of all opaque geometry.
    pub fn depth_prepass() -> Self {
        PassLayout {
            name: "depth_prepass",
            colors: vec![],
            depth: Some(AttachmentDescription {
                format: gbuffer::DEPTH_FORMAT,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }),
            depth_write: true,
            src_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            src_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        }
    }

    /// The geometry pass: rasterizes opaque geometry into the three gbuffer
    /// attachments. Depth is loaded from the pre-pass and never re-cleared.
    pub fn geometry() -> Self {
        let color = |format| AttachmentDescription {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        PassLayout {
            name: "geometry",
            colors: vec![
                color(gbuffer::ALBEDO_FORMAT),
                color(gbuffer::NORMAL_FORMAT),
                color(gbuffer::METAL_ROUGH_FORMAT),
            ],
            depth: Some(AttachmentDescription {
                format: gbuffer::DEPTH_FORMAT,
                load_op: vk::AttachmentLoadOp::LOAD,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }),
            depth_write: false,
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            src_access: vk::AccessFlags::empty(),
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        }
    }

    /// The lighting combine pass: shades into the swapchain image by sampling the
    /// gbuffer. Depth is loaded and tested but not written.
    pub fn combine(swapchain_format: vk::Format) -> Self {
        PassLayout {
            name: "combine",
            colors: vec![AttachmentDescription {
                format: swapchain_format,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            }],
            depth: Some(AttachmentDescription {
                format: gbuffer::DEPTH_FORMAT,
                load_op: vk::AttachmentLoadOp::LOAD,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }),
            depth_write: false,
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            src_access: vk::AccessFlags::empty(),
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        }
    }

    /// The transparency forward pass: blends transparent geometry over the combine
    /// output. It shares the combine pass's render pass object at record time, so
    /// the color attachment loads what the combine pass stored; this description
    /// exists for its contract (load op, depth policy), which the forward pipeline
    /// honors.
    pub fn forward(swapchain_format: vk::Format) -> Self {
        let mut layout = Self::combine(swapchain_format);
        layout.name = "forward";
        layout.colors[0].load_op = vk::AttachmentLoadOp::LOAD;
        layout.colors[0].initial_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        layout
    }

    /// Total number of attachments, color and depth.
    pub fn attachment_count(&self) -> usize {
        self.colors.len() + usize::from(self.depth.is_some())
    }
}

/// Wrapper around a [`VkRenderPass`](vk::RenderPass), built once from a
/// [`PassLayout`] and immutable afterwards.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderPass {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::RenderPass,
    layout: PassLayout,
}

impl RenderPass {
    /// Build a render pass with a single subpass from its description.
    pub fn new(device: Device, layout: PassLayout) -> Result<Self> {
        let mut attachments: Vec<vk::AttachmentDescription> = layout
            .colors
            .iter()
            .map(|color| attachment(color))
            .collect();
        let color_refs: Vec<vk::AttachmentReference> = (0..layout.colors.len() as u32)
            .map(|index| vk::AttachmentReference {
                attachment: index,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();

        let depth_ref = layout.depth.as_ref().map(|depth| {
            attachments.push(attachment(depth));
            vk::AttachmentReference {
                attachment: attachments.len() as u32 - 1,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpass = subpass.build();

        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: layout.src_stage,
            src_access_mask: layout.src_access,
            dst_stage_mask: layout.dst_stage,
            dst_access_mask: layout.dst_access,
            dependency_flags: vk::DependencyFlags::empty(),
        };

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));
        let handle = unsafe { device.create_render_pass(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkRenderPass {handle:p} ({})", layout.name);

        Ok(RenderPass {
            device,
            handle,
            layout,
        })
    }

    /// The description this pass was built from.
    pub fn layout(&self) -> &PassLayout {
        &self.layout
    }

    /// Clear values for a `vkCmdBeginRenderPass` on this pass. Entries for loaded
    /// attachments are present but ignored by the driver.
    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        let mut values: Vec<vk::ClearValue> = self
            .layout
            .colors
            .iter()
            .map(|_| vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            })
            .collect();
        if self.layout.depth.is_some() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }
        values
    }

    /// Get unsafe access to the underlying `VkRenderPass` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkRenderPass {:p}", self.handle);
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

fn attachment(desc: &AttachmentDescription) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        flags: vk::AttachmentDescriptionFlags::empty(),
        format: desc.format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: desc.load_op,
        store_op: desc.store_op,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: desc.initial_layout,
        final_layout: desc.final_layout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepass_is_depth_only_and_clears() {
        let layout = PassLayout::depth_prepass();
        assert!(layout.colors.is_empty());
        assert!(layout.depth_write);
        let depth = layout.depth.unwrap();
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn geometry_has_three_targets_and_loads_depth() {
        let layout = PassLayout::geometry();
        assert_eq!(layout.colors.len(), 3);
        assert_eq!(layout.attachment_count(), 4);
        assert!(!layout.depth_write);
        for color in &layout.colors {
            assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }
        assert_eq!(layout.depth.unwrap().load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn combine_presents_and_reads_depth() {
        let layout = PassLayout::combine(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(layout.colors.len(), 1);
        assert!(!layout.depth_write);
        assert_eq!(layout.colors[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(layout.colors[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(layout.depth.unwrap().store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn forward_loads_the_combine_output() {
        let layout = PassLayout::forward(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(layout.colors[0].load_op, vk::AttachmentLoadOp::LOAD);
        assert!(!layout.depth_write);
    }

    #[test]
    fn forward_stays_render_pass_compatible_with_combine() {
        // The blend pipeline is built against the combine pass, so the two
        // descriptions must agree on attachment shape, formats and depth policy.
        let combine = PassLayout::combine(vk::Format::B8G8R8A8_SRGB);
        let forward = PassLayout::forward(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(forward.attachment_count(), combine.attachment_count());
        assert_eq!(forward.colors[0].format, combine.colors[0].format);
        assert_eq!(forward.depth.unwrap().format, combine.depth.unwrap().format);
        assert_eq!(forward.depth_write, combine.depth_write);
    }
}
