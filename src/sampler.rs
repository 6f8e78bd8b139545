//! Wrappers for `VkSampler` objects.

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;

/// Wrapper around a [`VkSampler`](vk::Sampler) object.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Sampler {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Sampler,
}

impl Sampler {
    /// Create a linear, repeating sampler with anisotropy maxed out to the device
    /// limit. Used for material textures.
    pub fn new(device: Device) -> Result<Self> {
        let max_anisotropy = device.properties().limits.max_sampler_anisotropy;
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS);
        Self::create(device, &info)
    }

    /// Create a clamping nearest-edge sampler without anisotropy. Used for sampling
    /// geometry attachments in the combine pass, where filtering across texel
    /// boundaries would blend unrelated surface data.
    pub fn attachment(device: Device) -> Result<Self> {
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS);
        Self::create(device, &info)
    }

    fn create(device: Device, info: &vk::SamplerCreateInfo) -> Result<Self> {
        let handle = unsafe { device.create_sampler(info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSampler {handle:p}");
        Ok(Sampler {
            device,
            handle,
        })
    }

    /// Get unsafe access to the underlying `VkSampler` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSampler {:p}", self.handle);
        unsafe {
            self.device.destroy_sampler(self.handle, None);
        }
    }
}
