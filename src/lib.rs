//! Deimos: a real-time deferred-shading renderer built directly on Vulkan.
//!
//! Geometry is rasterized into a set of gbuffer attachments (albedo, normal,
//! metallic-roughness, depth), combined in a lighting pass, and transparent
//! geometry is blended over the result in a forward pass. The interesting parts
//! are the orchestration around that: the render pass graph with its explicit
//! gbuffer layout round-trip, the frame-in-flight scheduler, and swapchain-resize
//! recovery.
//!
//! # Example
//!
//! Any windowing library works by implementing the [`Window`] traits; with the
//! default `winit` feature the crate ships the glue:
//! ```no_run
//! use deimos::prelude::*;
//! use winit::event_loop::EventLoop;
//! use winit::window::WindowBuilder;
//!
//! # fn main() -> anyhow::Result<()> {
//! let event_loop = EventLoop::new();
//! let window = WindowBuilder::new()
//!     .with_title("deimos")
//!     .build(&event_loop)?;
//!
//! let settings = SettingsBuilder::new()
//!     .name("deimos demo")
//!     .extent(1280, 720)
//!     .model_path("data/scene.gltf")
//!     .validation(true)
//!     .build();
//!
//! let renderer = Renderer::new(settings, &window)?;
//! deimos::run(renderer, event_loop, window)
//! # }
//! ```

#![allow(clippy::too_many_arguments)]

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod allocator;
pub mod buffer;
pub mod command_pool;
pub mod core;
pub mod descriptor;
pub mod frame;
pub mod image;
pub mod pass;
pub mod pipeline;
pub mod prelude;
pub mod renderer;
pub mod sampler;
pub mod scene;
pub mod sync;
pub mod util;
pub mod wsi;

pub use crate::core::device::Device;
pub use crate::core::error::Error;
pub use crate::core::instance::Instance;
pub use crate::core::physical_device::PhysicalDevice;
pub use crate::core::settings::{RendererSettings, SettingsBuilder};
pub use crate::renderer::Renderer;
#[cfg(feature = "winit")]
pub use crate::renderer::run;
pub use crate::wsi::window::{Window, WindowSize};
