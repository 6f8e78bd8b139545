//! The core module holds the Vulkan context objects: the instance, debug messenger,
//! physical device selection, the logical device, renderer settings and the error type.
//!
//! Teardown order is strict and encoded in drop order of the owning structs:
//! swapchain before device, device before instance.

pub mod debug;
pub mod device;
pub mod error;
pub mod instance;
pub mod physical_device;
pub mod settings;
