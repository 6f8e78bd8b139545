//! Window system integration: window traits, the surface and the swapchain.

pub mod surface;
pub mod swapchain;
pub mod window;
