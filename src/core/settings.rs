//! Exposes all structs needed to store renderer initialization parameters.

use std::path::PathBuf;

use ash::vk;

/// Explicit configuration for the renderer. Everything that used to be an implicit
/// global constant lives here: the frame-in-flight count (concurrency depth), the
/// initial window extent, the scene source and the shader directory.
///
/// Construct one through [`SettingsBuilder`].
///
/// # Example
/// ```
/// use deimos::prelude::*;
///
/// let settings = SettingsBuilder::new()
///     .name("deimos demo")
///     .frames_in_flight(2)
///     .extent(1280, 720)
///     .model_path("data/sponza.gltf")
///     .present_mode(vk::PresentModeKHR::MAILBOX)
///     .validation(true)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// Application name, reported to the Vulkan driver.
    pub name: String,
    /// Application version, reported to the Vulkan driver.
    pub version: (u32, u32, u32),
    /// Number of frames the CPU may record ahead of the GPU. The sole concurrency
    /// depth of the whole renderer.
    pub frames_in_flight: usize,
    /// Initial window/framebuffer size.
    pub extent: vk::Extent2D,
    /// Scene source to load at startup (`.obj` or `.gltf`).
    pub model_path: Option<PathBuf>,
    /// Directory holding the compiled SPIR-V shader binaries.
    pub shader_dir: PathBuf,
    /// Preferred surface format. Falls back to `{B8G8R8A8_SRGB, SRGB_NONLINEAR}`,
    /// then to the first supported format.
    pub surface_format: Option<vk::SurfaceFormatKHR>,
    /// Preferred present mode. Falls back to FIFO, which is always supported.
    pub present_mode: Option<vk::PresentModeKHR>,
    /// Whether to enable Vulkan validation layers and the debug messenger.
    pub validation: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        RendererSettings {
            name: String::from("deimos"),
            version: (0, 1, 0),
            frames_in_flight: 2,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            model_path: None,
            shader_dir: PathBuf::from("shaders"),
            surface_format: None,
            present_mode: None,
            validation: false,
        }
    }
}

/// Builder for [`RendererSettings`].
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    inner: RendererSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Set the application version.
    pub fn version(mut self, version: (u32, u32, u32)) -> Self {
        self.inner.version = version;
        self
    }

    /// Set the number of frames in flight. Must be at least one.
    pub fn frames_in_flight(mut self, count: usize) -> Self {
        debug_assert!(count >= 1);
        self.inner.frames_in_flight = count;
        self
    }

    /// Set the initial framebuffer extent.
    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.inner.extent = vk::Extent2D {
            width,
            height,
        };
        self
    }

    /// Set the scene source path.
    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.model_path = Some(path.into());
        self
    }

    /// Set the directory holding compiled shader binaries.
    pub fn shader_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.shader_dir = path.into();
        self
    }

    /// Set the preferred surface format.
    pub fn surface_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.inner.surface_format = Some(format);
        self
    }

    /// Set the preferred present mode.
    pub fn present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.inner.present_mode = Some(mode);
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enabled: bool) -> Self {
        self.inner.validation = enabled;
        self
    }

    /// Obtain the finished [`RendererSettings`].
    pub fn build(self) -> RendererSettings {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let settings = SettingsBuilder::new().build();
        assert_eq!(settings.frames_in_flight, 2);
        assert_eq!(settings.extent.width, 800);
        assert_eq!(settings.extent.height, 600);
        assert!(settings.model_path.is_none());
        assert!(!settings.validation);
    }

    #[test]
    fn builder_overrides() {
        let settings = SettingsBuilder::new()
            .frames_in_flight(3)
            .extent(1920, 1080)
            .model_path("scene.gltf")
            .present_mode(vk::PresentModeKHR::MAILBOX)
            .validation(true)
            .build();
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.extent.width, 1920);
        assert_eq!(settings.model_path.unwrap(), PathBuf::from("scene.gltf"));
        assert_eq!(settings.present_mode, Some(vk::PresentModeKHR::MAILBOX));
        assert!(settings.validation);
    }
}
