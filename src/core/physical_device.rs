use std::ffi::CStr;

use anyhow::Result;
use ash::vk;

use crate::core::error::Error;
use crate::core::instance::Instance;
use crate::util::wrap_c_str;
use crate::wsi::surface::Surface;

/// A physical device abstracts away an actual device, like a graphics card or integrated graphics card.
/// Selection requires support for graphics and presentation on the given surface, the swapchain
/// extension, and sampler anisotropy.
#[derive(Default, Debug)]
pub struct PhysicalDevice {
    /// Handle to the [`VkPhysicalDevice`](vk::PhysicalDevice).
    handle: vk::PhysicalDevice,
    /// [`VkPhysicalDeviceProperties`](vk::PhysicalDeviceProperties) structure with properties of this physical device.
    properties: vk::PhysicalDeviceProperties,
    /// [`VkPhysicalDeviceMemoryProperties`](vk::PhysicalDeviceMemoryProperties) structure with memory properties of the physical device.
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family index with graphics support.
    graphics_family: u32,
    /// Queue family index with presentation support for the selected surface.
    /// May equal `graphics_family`.
    present_family: u32,
}

impl PhysicalDevice {
    /// Selects the first physical device that can drive the renderer on the given surface.
    pub fn select(instance: &Instance, surface: &Surface) -> Result<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(anyhow::Error::from(Error::NoGPU));
        }

        devices
            .iter()
            .find_map(|device| -> Option<PhysicalDevice> {
                let properties = unsafe { instance.get_physical_device_properties(*device) };
                let features = unsafe { instance.get_physical_device_features(*device) };
                if features.sampler_anisotropy == vk::FALSE {
                    return None;
                }
                if !supports_swapchain(instance, *device) {
                    return None;
                }
                let (graphics_family, present_family) = find_queue_families(instance, *device, surface)?;
                info!("Picked physical device {}", unsafe {
                    wrap_c_str(properties.device_name.as_ptr())
                });
                Some(PhysicalDevice {
                    handle: *device,
                    properties,
                    memory_properties: unsafe { instance.get_physical_device_memory_properties(*device) },
                    graphics_family,
                    present_family,
                })
            })
            .ok_or_else(|| anyhow::Error::from(Error::NoGPU))
    }

    /// Get unsafe access to the underlying `VkPhysicalDevice` handle.
    /// # Safety
    /// Any vulkan calls that mutate this physical device may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Get the properties of this physical device.
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Get the memory properties of this physical device.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Queue family index used for graphics commands.
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Queue family index used for presentation.
    pub fn present_family(&self) -> u32 {
        self.present_family
    }
}

fn supports_swapchain(instance: &Instance, device: vk::PhysicalDevice) -> bool {
    let extensions = match unsafe { instance.enumerate_device_extension_properties(device) } {
        Ok(extensions) => extensions,
        Err(_) => return false,
    };
    let swapchain_name = ash::extensions::khr::Swapchain::name();
    extensions
        .iter()
        // SAFETY: The extension name comes from a Vulkan API call, which always returns
        // valid null-terminated strings.
        .any(|ext| swapchain_name == unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
}

fn find_queue_families(
    instance: &Instance,
    device: vk::PhysicalDevice,
    surface: &Surface,
) -> Option<(u32, u32)> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let graphics = families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))? as u32;
    let present = (0..families.len() as u32).find(|&index| {
        unsafe { surface.supports_present(device, index) }.unwrap_or(false)
    })?;
    Some((graphics, present))
}
