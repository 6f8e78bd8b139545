//! Convenient re-exports of the types most applications need.

pub use ash::vk;

pub use crate::allocator::{Allocation, Allocator, MemoryType};
pub use crate::buffer::Buffer;
pub use crate::command_pool::CommandPool;
pub use crate::core::debug::DebugMessenger;
pub use crate::core::device::Device;
pub use crate::core::error::Error;
pub use crate::core::instance::Instance;
pub use crate::core::physical_device::PhysicalDevice;
pub use crate::core::settings::{RendererSettings, SettingsBuilder};
pub use crate::descriptor::Descriptors;
pub use crate::frame::{CameraUniform, FrameScheduler, FrameSlot};
pub use crate::image::{Image, ImageView, Texture};
pub use crate::pass::gbuffer::GBuffer;
pub use crate::pass::graph::RenderGraph;
pub use crate::pass::render_pass::{AttachmentDescription, PassLayout, RenderPass};
pub use crate::pass::transition::{barrier_masks, BarrierMasks, LayoutTracker};
pub use crate::pipeline::{Pipeline, Pipelines, PushConstants, ShaderModule};
pub use crate::renderer::{FrameTimer, Renderer};
#[cfg(feature = "winit")]
pub use crate::renderer::run;
pub use crate::sampler::Sampler;
pub use crate::scene::camera::{Camera, CameraMovement};
pub use crate::scene::draw::{DrawList, DrawRecord};
pub use crate::scene::mesh::{Material, MeshData, Vertex};
pub use crate::sync::{Fence, Semaphore};
pub use crate::wsi::surface::Surface;
pub use crate::wsi::swapchain::Swapchain;
pub use crate::wsi::window::{Window, WindowSize};
