use std::ffi::CString;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::instance::Instance;
use crate::core::physical_device::PhysicalDevice;
use crate::core::settings::RendererSettings;

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
    properties: vk::PhysicalDeviceProperties,
}

/// Wrapper around a `VkDevice`. The device provides access to almost the entire
/// Vulkan API. Internal state is wrapped in an `Arc<DeviceInner>`, so this is safe
/// to clone.
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Create a new Vulkan device with one graphics queue and one presentation queue
    /// (which may be the same queue).
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDevice,
        settings: &RendererSettings,
    ) -> Result<Self> {
        let graphics_family = physical_device.graphics_family();
        let present_family = physical_device.present_family();

        let priority = [1.0f32];
        let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_family)
            .queue_priorities(&priority)
            .build()];
        if present_family != graphics_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(present_family)
                    .queue_priorities(&priority)
                    .build(),
            );
        }

        let extension_names = [CString::from(ash::extensions::khr::Swapchain::name())];
        let extension_ptrs: Vec<*const i8> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        // Device-level layers are ignored by current implementations, but older ones
        // still distinguish them; keep them in sync with the instance.
        let mut layers = Vec::<CString>::new();
        if settings.validation {
            layers.push(CString::new("VK_LAYER_KHRONOS_validation")?);
        }
        let layer_ptrs: Vec<*const i8> = layers.iter().map(|layer| layer.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features)
            .build();

        // SAFETY: The user passed in a valid Instance and PhysicalDevice.
        let handle = unsafe { instance.create_device(physical_device.handle(), &info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDevice {:p}", handle.handle());
        let graphics_queue = unsafe { handle.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { handle.get_device_queue(present_family, 0) };

        Ok(Device {
            inner: Arc::new(DeviceInner {
                handle,
                graphics_queue,
                present_queue,
                graphics_family,
                present_family,
                properties: *physical_device.properties(),
            }),
        })
    }

    /// Wait until the device is completely idle. This is a full stop of all
    /// outstanding GPU work, used for swapchain recreation and teardown only.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.inner.handle.device_wait_idle()? };
        Ok(())
    }

    /// The queue used for graphics commands.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.inner.graphics_queue
    }

    /// The queue used for presentation.
    pub fn present_queue(&self) -> vk::Queue {
        self.inner.present_queue
    }

    /// Queue family index of the graphics queue.
    pub fn graphics_family(&self) -> u32 {
        self.inner.graphics_family
    }

    /// Queue family index of the present queue.
    pub fn present_family(&self) -> u32 {
        self.inner.present_family
    }

    /// Whether graphics and presentation run on the same queue family.
    pub fn is_single_queue(&self) -> bool {
        self.inner.graphics_family == self.inner.present_family
    }

    /// Physical device properties, queried at selection time.
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.inner.properties
    }

    /// Get unsafe access to the underlying `VkDevice` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> ash::Device {
        self.inner.handle.clone()
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.inner.handle
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDevice {:p}", self.handle.handle());
        unsafe {
            self.handle.destroy_device(None);
        }
    }
}
