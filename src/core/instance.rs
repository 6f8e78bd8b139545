//! Exposes the Vulkan instance, which represents the loaded Vulkan library

use std::ffi::CString;
use std::ops::Deref;

use anyhow::Result;
use ash;
use ash::vk;
use raw_window_handle::HasRawDisplayHandle;

use crate::core::settings::RendererSettings;
use crate::wsi::window::Window;

/// Represents the loaded vulkan instance.
/// You need to create this to initialize the Vulkan API. The device is
/// created from this.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Instance {
    #[derivative(Debug = "ignore")]
    entry: ash::Entry,
    #[derivative(Debug = "ignore")]
    instance: ash::Instance,
}

impl Instance {
    /// Initializes the Vulkan API.
    /// # Errors
    /// * Can fail if the Vulkan loader was not found. Check for valid Vulkan drivers.
    /// * Can fail if an instance extension or layer was requested that is not supported. This can happen when
    ///   validation is enabled through [`RendererSettings`], but the Vulkan SDK is not installed.
    pub fn new(settings: &RendererSettings, window: &dyn Window) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };
        let instance = create_vk_instance(&entry, settings, window)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkInstance {:p}", instance.handle());
        Ok(Instance {
            entry,
            instance,
        })
    }

    /// Get unsafe access to the vulkan entry point.
    /// # Safety
    /// Any vulkan calls that modify the system's state may put the system in an undefined state.
    pub unsafe fn loader(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkInstance {:p}", self.instance.handle());
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

impl Deref for Instance {
    type Target = ash::Instance;

    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

fn create_vk_instance(
    entry: &ash::Entry,
    settings: &RendererSettings,
    window: &dyn Window,
) -> Result<ash::Instance> {
    let app_name = CString::new(settings.name.clone())?;
    let engine_name = CString::new("deimos")?;
    let (major, minor, patch) = settings.version;
    let app_info = vk::ApplicationInfo {
        api_version: vk::make_api_version(0, 1, 2, 0),
        p_application_name: app_name.as_ptr(),
        p_engine_name: engine_name.as_ptr(),
        application_version: vk::make_api_version(0, major, minor, patch),
        engine_version: vk::make_api_version(0, major, minor, patch),
        ..Default::default()
    };

    let mut layers = Vec::<CString>::new();
    if settings.validation {
        layers.push(CString::new("VK_LAYER_KHRONOS_validation")?);
    }

    let mut extensions: Vec<CString> =
        ash_window::enumerate_required_extensions(window.raw_display_handle())?
            .iter()
            .map(|ext| unsafe { std::ffi::CStr::from_ptr(*ext).to_owned() })
            .collect();
    if settings.validation {
        extensions.push(CString::from(ash::extensions::ext::DebugUtils::name()));
    }

    let layer_ptrs: Vec<*const i8> = layers.iter().map(|layer| layer.as_ptr()).collect();
    let extension_ptrs: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    if settings.validation {
        info!("Enabled validation layers:");
        for layer in &layers {
            info!("{:?}", layer);
        }
    }

    let info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_layer_names(&layer_ptrs)
        .enabled_extension_names(&extension_ptrs)
        .build();

    Ok(unsafe { entry.create_instance(&info, None)? })
}
