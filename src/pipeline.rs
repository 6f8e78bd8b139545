//! Shader modules, the shared pipeline layout and the four graphics pipelines of
//! the deferred pipeline.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ash::vk;
use glam::Vec3;

use crate::core::device::Device;
use crate::core::error::Error;
use crate::pass::render_pass::{PassLayout, RenderPass};
use crate::scene::mesh::Vertex;

/// Push constants shared by the combine and forward fragment shaders.
/// Layout matches the GLSL `std430` push constant block.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct PushConstants {
    pub viewport: [f32; 2],
    _pad0: [f32; 2],
    pub camera_forward: [f32; 3],
    _pad1: f32,
}

impl PushConstants {
    pub fn new(extent: vk::Extent2D, camera_forward: Vec3) -> Self {
        PushConstants {
            viewport: [extent.width as f32, extent.height as f32],
            _pad0: [0.0; 2],
            camera_forward: camera_forward.to_array(),
            _pad1: 0.0,
        }
    }
}

/// Wrapper around a [`VkShaderModule`](vk::ShaderModule), loaded from a SPIR-V
/// binary on disk.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ShaderModule {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::ShaderModule,
}

impl ShaderModule {
    /// Load a shader binary from `dir/name`.
    pub fn load(device: Device, dir: &Path, name: &str) -> Result<Self> {
        let path: PathBuf = dir.join(name);
        let mut file = File::open(&path).map_err(|_| Error::ShaderNotFound(path.clone()))?;
        let code = ash::util::read_spv(&mut file).map_err(|_| Error::ShaderNotFound(path))?;
        let info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let handle = unsafe { device.create_shader_module(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkShaderModule {handle:p}");
        Ok(ShaderModule {
            device,
            handle,
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkShaderModule {:p}", self.handle);
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}

/// Wrapper around a graphics [`VkPipeline`](vk::Pipeline).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Pipeline {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Pipeline,
}

impl Pipeline {
    /// Get unsafe access to the underlying `VkPipeline` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipeline {:p}", self.handle);
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
        }
    }
}

/// Builder for one graphics pipeline of the deferred chain. All pipelines share the
/// same vertex layout, dynamic viewport/scissor state and pipeline layout; they
/// differ in shaders, color attachment count, depth policy and blending.
struct PipelineBuilder<'a> {
    device: Device,
    layout: vk::PipelineLayout,
    render_pass: &'a RenderPass,
    vertex: &'a ShaderModule,
    fragment: Option<&'a ShaderModule>,
    color_attachments: usize,
    depth_write: bool,
    blend: bool,
}

impl PipelineBuilder<'_> {
    fn build(self) -> Result<Pipeline> {
        let entry = unsafe { std::ffi::CStr::from_bytes_with_nul_unchecked(b"main\0") };
        let mut stages = vec![vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(self.vertex.handle)
            .name(entry)
            .build()];
        if let Some(fragment) = self.fragment {
            stages.push(
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(fragment.handle)
                    .name(entry)
                    .build(),
            );
        }

        let binding = Vertex::binding_description();
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(std::slice::from_ref(&binding))
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // Viewport and scissor are dynamic, so pipelines survive resizes.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        let blend_attachment = if self.blend {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build()
        } else {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build()
        };
        let blend_attachments = vec![blend_attachment; self.color_attachments];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(unsafe { self.render_pass.handle() })
            .subpass(0)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|err| Error::from(err))?
        };
        let handle = pipelines[0];
        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipeline {handle:p}");
        Ok(Pipeline {
            device: self.device,
            handle,
        })
    }
}

/// The four pipelines of the deferred chain plus their shared layout. The forward
/// pipeline is built against the combine render pass, since its draws are recorded
/// inside the same render pass instance.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Pipelines {
    #[derivative(Debug = "ignore")]
    device: Device,
    layout: vk::PipelineLayout,
    pub depth: Pipeline,
    pub geometry: Pipeline,
    pub combine: Pipeline,
    pub forward: Pipeline,
}

impl Pipelines {
    /// Load all shader binaries from `shader_dir` and build the pipelines.
    pub fn new(
        device: Device,
        shader_dir: &Path,
        set_layout: vk::DescriptorSetLayout,
        prepass: &RenderPass,
        geometry_pass: &RenderPass,
        combine_pass: &RenderPass,
    ) -> Result<Self> {
        let push_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<PushConstants>() as u32,
        };
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(std::slice::from_ref(&set_layout))
            .push_constant_ranges(std::slice::from_ref(&push_range));
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let depth_vert = ShaderModule::load(device.clone(), shader_dir, "depth.vert.spv")?;
        let geometry_vert = ShaderModule::load(device.clone(), shader_dir, "geometry.vert.spv")?;
        let geometry_frag = ShaderModule::load(device.clone(), shader_dir, "geometry.frag.spv")?;
        let combine_vert = ShaderModule::load(device.clone(), shader_dir, "combine.vert.spv")?;
        let combine_frag = ShaderModule::load(device.clone(), shader_dir, "combine.frag.spv")?;
        let forward_frag = ShaderModule::load(device.clone(), shader_dir, "forward.frag.spv")?;

        let depth = PipelineBuilder {
            device: device.clone(),
            layout,
            render_pass: prepass,
            vertex: &depth_vert,
            fragment: None,
            color_attachments: 0,
            depth_write: true,
            blend: false,
        }
        .build()?;

        let geometry = PipelineBuilder {
            device: device.clone(),
            layout,
            render_pass: geometry_pass,
            vertex: &geometry_vert,
            fragment: Some(&geometry_frag),
            color_attachments: 3,
            depth_write: false,
            blend: false,
        }
        .build()?;

        let combine = PipelineBuilder {
            device: device.clone(),
            layout,
            render_pass: combine_pass,
            vertex: &combine_vert,
            fragment: Some(&combine_frag),
            color_attachments: 1,
            depth_write: false,
            blend: false,
        }
        .build()?;

        // The blend pipeline records inside the combine pass's render pass instance,
        // so its description must stay render-pass compatible with the combine pass.
        let combine_layout = combine_pass.layout();
        let forward_layout = PassLayout::forward(combine_layout.colors[0].format);
        debug_assert_eq!(forward_layout.attachment_count(), combine_layout.attachment_count());
        debug_assert_eq!(forward_layout.colors[0].format, combine_layout.colors[0].format);
        debug_assert!(!forward_layout.depth_write);

        let forward = PipelineBuilder {
            device: device.clone(),
            layout,
            render_pass: combine_pass,
            vertex: &combine_vert,
            fragment: Some(&forward_frag),
            color_attachments: 1,
            depth_write: false,
            blend: true,
        }
        .build()?;

        Ok(Pipelines {
            device,
            layout,
            depth,
            geometry,
            combine,
            forward,
        })
    }

    /// The pipeline layout shared by all four pipelines.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for Pipelines {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
