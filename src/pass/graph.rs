//! The render graph: owns the render passes, the gbuffer and the framebuffers, and
//! records one frame of work in strict program order.

use anyhow::Result;
use ash::vk;

use crate::allocator::Allocator;
use crate::core::device::Device;
use crate::pass::gbuffer::GBuffer;
use crate::pass::render_pass::{PassLayout, RenderPass};
use crate::pipeline::{Pipelines, PushConstants};
use crate::scene::draw::{DrawList, DrawRecord};
use crate::util::as_byte_slice;
use crate::wsi::swapchain::Swapchain;

/// Owns the passes of the deferred pipeline and everything derived from the
/// swapchain extent: gbuffer attachments and framebuffers.
///
/// A frame is recorded as: depth pre-pass over the opaque list, geometry pass over
/// the opaque list, gbuffer barrier to sampled layout, then one render pass instance
/// that first shades the opaque geometry (combine pipeline) and then blends the
/// transparent list over it (forward pipeline), and finally the gbuffer barrier back
/// to attachment layout for the next frame.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderGraph {
    #[derivative(Debug = "ignore")]
    device: Device,
    prepass: RenderPass,
    geometry: RenderPass,
    combine: RenderPass,
    gbuffer: GBuffer,
    prepass_framebuffer: vk::Framebuffer,
    geometry_framebuffers: Vec<vk::Framebuffer>,
    combine_framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl RenderGraph {
    /// Build the graph for the given swapchain.
    pub fn new(device: Device, allocator: &Allocator, swapchain: &Swapchain) -> Result<Self> {
        let prepass = RenderPass::new(device.clone(), PassLayout::depth_prepass())?;
        let geometry = RenderPass::new(device.clone(), PassLayout::geometry())?;
        let combine = RenderPass::new(device.clone(), PassLayout::combine(swapchain.format.format))?;

        let gbuffer = GBuffer::new(device.clone(), allocator, swapchain.extent, swapchain.image_count())?;
        let (prepass_framebuffer, geometry_framebuffers, combine_framebuffers) =
            create_framebuffers(&device, &prepass, &geometry, &combine, &gbuffer, swapchain)?;

        Ok(RenderGraph {
            device,
            prepass,
            geometry,
            combine,
            gbuffer,
            prepass_framebuffer,
            geometry_framebuffers,
            combine_framebuffers,
            extent: swapchain.extent,
        })
    }

    /// Dispose and recreate everything derived from the swapchain extent. The caller
    /// must have waited for the device to go idle; the surface format is assumed
    /// stable across resizes.
    pub fn rebuild(&mut self, allocator: &Allocator, swapchain: &Swapchain) -> Result<()> {
        self.destroy_framebuffers();
        self.gbuffer = GBuffer::new(
            self.device.clone(),
            allocator,
            swapchain.extent,
            swapchain.image_count(),
        )?;
        let (prepass_framebuffer, geometry_framebuffers, combine_framebuffers) = create_framebuffers(
            &self.device,
            &self.prepass,
            &self.geometry,
            &self.combine,
            &self.gbuffer,
            swapchain,
        )?;
        self.prepass_framebuffer = prepass_framebuffer;
        self.geometry_framebuffers = geometry_framebuffers;
        self.combine_framebuffers = combine_framebuffers;
        self.extent = swapchain.extent;
        Ok(())
    }

    /// The gbuffer, for descriptor writes against its attachment views.
    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// The depth pre-pass.
    pub fn prepass(&self) -> &RenderPass {
        &self.prepass
    }

    /// The geometry pass.
    pub fn geometry_pass(&self) -> &RenderPass {
        &self.geometry
    }

    /// The combine pass. Also the compatibility pass for the forward pipeline.
    pub fn combine_pass(&self) -> &RenderPass {
        &self.combine
    }

    /// Record one frame into `cmd`. `image_index` selects the acquired swapchain
    /// image's framebuffers and gbuffer target; `frame_index` selects the in-flight
    /// slot's descriptor sets. The two are independent. With no draw list the passes
    /// still run and clear their attachments.
    pub fn record(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: usize,
        frame_index: usize,
        pipelines: &Pipelines,
        draws: Option<&DrawList>,
        push: &PushConstants,
    ) -> Result<()> {
        let opaque = draws.map(|draws| draws.opaque.as_slice()).unwrap_or(&[]);
        let transparent = draws.map(|draws| draws.transparent.as_slice()).unwrap_or(&[]);
        let device = self.device.clone();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D {
                x: 0,
                y: 0,
            },
            extent: self.extent,
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&render_area));
            if let Some(draws) = draws {
                device.cmd_bind_vertex_buffers(cmd, 0, &[draws.vertex_buffer.handle()], &[0]);
                device.cmd_bind_index_buffer(cmd, draws.index_buffer.handle(), 0, vk::IndexType::UINT32);
            }
        }

        // Depth pre-pass: opaque geometry, depth only.
        self.begin_pass(cmd, &self.prepass, self.prepass_framebuffer, render_area);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines.depth.handle());
        }
        self.draw_records(cmd, pipelines, frame_index, opaque);
        unsafe { device.cmd_end_render_pass(cmd) };

        // Geometry pass: opaque geometry into the gbuffer, depth loaded and tested EQUAL.
        self.begin_pass(cmd, &self.geometry, self.geometry_framebuffers[image_index], render_area);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines.geometry.handle());
        }
        self.draw_records(cmd, pipelines, frame_index, opaque);
        unsafe { device.cmd_end_render_pass(cmd) };
        self.gbuffer.on_geometry_pass_end(image_index);

        // The combine pass samples the gbuffer; make the geometry output visible.
        self.gbuffer.transition_to_sampled(cmd, image_index)?;

        // Combine + forward in one render pass instance, so the forward draws blend
        // over the combine output without an intermediate store/load cycle.
        self.begin_pass(cmd, &self.combine, self.combine_framebuffers[image_index], render_area);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines.combine.handle());
            device.cmd_push_constants(
                cmd,
                pipelines.layout(),
                vk::ShaderStageFlags::FRAGMENT,
                0,
                as_byte_slice(push),
            );
        }
        self.draw_records(cmd, pipelines, frame_index, opaque);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines.forward.handle());
        }
        // Transparent draws are unsorted. Blending artifacts between overlapping
        // transparent surfaces are a known approximation.
        self.draw_records(cmd, pipelines, frame_index, transparent);
        unsafe { device.cmd_end_render_pass(cmd) };

        // Back to attachment layout before the next frame renders into the gbuffer.
        self.gbuffer.transition_to_attachment(cmd, image_index)?;
        Ok(())
    }

    fn begin_pass(
        &self,
        cmd: vk::CommandBuffer,
        pass: &RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
    ) {
        let clear_values = pass.clear_values();
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(unsafe { pass.handle() })
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        };
    }

    fn draw_records(
        &self,
        cmd: vk::CommandBuffer,
        pipelines: &Pipelines,
        frame_index: usize,
        records: &[DrawRecord],
    ) {
        for record in records {
            unsafe {
                self.device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipelines.layout(),
                    0,
                    &[record.descriptor_sets[frame_index]],
                    &[],
                );
                self.device.cmd_draw_indexed(
                    cmd,
                    record.index_count,
                    1,
                    record.first_index,
                    record.vertex_offset,
                    0,
                );
            }
        }
    }

    fn destroy_framebuffers(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.prepass_framebuffer, None);
            for framebuffer in self.geometry_framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            for framebuffer in self.combine_framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
        self.prepass_framebuffer = vk::Framebuffer::null();
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.destroy_framebuffers();
    }
}

fn create_framebuffers(
    device: &Device,
    prepass: &RenderPass,
    geometry: &RenderPass,
    combine: &RenderPass,
    gbuffer: &GBuffer,
    swapchain: &Swapchain,
) -> Result<(vk::Framebuffer, Vec<vk::Framebuffer>, Vec<vk::Framebuffer>)> {
    let extent = swapchain.extent;
    let depth_view = unsafe { gbuffer.depth.view.handle() };

    let create = |pass: &RenderPass, attachments: &[vk::ImageView]| -> Result<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(unsafe { pass.handle() })
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { device.create_framebuffer(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFramebuffer {framebuffer:p} ({})", pass.layout().name);
        Ok(framebuffer)
    };

    let prepass_framebuffer = create(prepass, &[depth_view])?;

    let geometry_framebuffers = gbuffer
        .targets
        .iter()
        .map(|target| {
            let views = target.views();
            create(
                geometry,
                &[
                    unsafe { views[0].handle() },
                    unsafe { views[1].handle() },
                    unsafe { views[2].handle() },
                    depth_view,
                ],
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let combine_framebuffers = swapchain
        .images
        .iter()
        .map(|image| create(combine, &[unsafe { image.view.handle() }, depth_view]))
        .collect::<Result<Vec<_>>>()?;

    Ok((prepass_framebuffer, geometry_framebuffers, combine_framebuffers))
}
