//! Abstraction for the presentation system: swapchain creation, image acquisition
//! and recreation after a resize.

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;
use crate::core::error::Error;
use crate::core::instance::Instance;
use crate::core::settings::RendererSettings;
use crate::image::{Image, ImageView};
use crate::wsi::surface::Surface;

/// One image owned by the swapchain, bundled with a view over it.
#[derive(Debug)]
pub struct SwapchainImage {
    pub image: Image,
    pub view: ImageView,
}

/// A swapchain is an abstraction of a presentation system. It handles buffering, VSync,
/// and acquiring images to render and present frames to.
///
/// The number of swapchain images is chosen by the driver and is unrelated to the number
/// of frames in flight. Acquired image indices index into [`Self::images`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    /// Swapchain images to present to.
    pub images: Vec<SwapchainImage>,
    /// Swapchain image format.
    pub format: vk::SurfaceFormatKHR,
    /// Present mode. The only mode required by the Vulkan spec to always be supported is `FIFO`.
    pub present_mode: vk::PresentModeKHR,
    /// Size of the swapchain images. This is effectively the window render area.
    pub extent: vk::Extent2D,
    #[derivative(Debug = "ignore")]
    functions: ash::extensions::khr::Swapchain,
    #[derivative(Debug = "ignore")]
    device: Device,
}

impl Swapchain {
    /// Create a new swapchain over the surface.
    pub fn new(
        instance: &Instance,
        device: Device,
        settings: &RendererSettings,
        surface: &Surface,
        fallback_extent: vk::Extent2D,
    ) -> Result<Self> {
        let functions = ash::extensions::khr::Swapchain::new(instance, &device);
        Self::create(device, functions, settings, surface, fallback_extent, vk::SwapchainKHR::null())
    }

    /// Recreate the swapchain after the surface changed, handing the old swapchain to
    /// the driver so in-flight presents can complete. The caller must have waited for
    /// the device to go idle and re-queried the surface details first.
    pub fn recreate(
        &mut self,
        settings: &RendererSettings,
        surface: &Surface,
        fallback_extent: vk::Extent2D,
    ) -> Result<()> {
        let new = Self::create(
            self.device.clone(),
            self.functions.clone(),
            settings,
            surface,
            fallback_extent,
            self.handle,
        )?;
        // The old swapchain drops here, after the new one was chained off it.
        let _old = std::mem::replace(self, new);
        Ok(())
    }

    fn create(
        device: Device,
        functions: ash::extensions::khr::Swapchain,
        settings: &RendererSettings,
        surface: &Surface,
        fallback_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let format = choose_surface_format(settings, surface)?;
        let present_mode = choose_present_mode(settings, surface);
        let extent = choose_swapchain_extent(surface, fallback_extent);

        let capabilities = surface.capabilities();
        let image_count = {
            let mut count = capabilities.min_image_count + 1;
            // If a maximum is set, clamp to it
            if capabilities.max_image_count != 0 {
                count = count.clamp(0, capabilities.max_image_count);
            }
            count
        };

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(unsafe { surface.handle() })
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .present_mode(present_mode)
            .min_image_count(image_count)
            .clipped(true)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .old_swapchain(old_swapchain)
            .build();

        let handle = unsafe { functions.create_swapchain(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSwapchainKHR {handle:p}");

        let images: Vec<SwapchainImage> = unsafe { functions.get_swapchain_images(handle)? }
            .iter()
            .map(|handle| -> Result<SwapchainImage> {
                // Memory is managed by the swapchain, not our application.
                let image = Image::external(device.clone(), *handle, format.format, extent);
                let view = image.view(vk::ImageAspectFlags::COLOR)?;
                Ok(SwapchainImage {
                    image,
                    view,
                })
            })
            .collect::<Result<Vec<SwapchainImage>>>()?;

        Ok(Swapchain {
            handle,
            images,
            format,
            present_mode,
            extent,
            functions,
            device,
        })
    }

    /// Number of images in the swapchain.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next swapchain image, signaling `signal` when it is ready.
    /// Returns `Ok(None)` when the swapchain is out of date and must be recreated
    /// before rendering can continue.
    pub fn acquire(&self, signal: vk::Semaphore) -> Result<Option<u32>> {
        let result = unsafe {
            self.functions
                .acquire_next_image(self.handle, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(err) => Err(anyhow::Error::from(Error::from(err))),
        }
    }

    /// Queue a present of the given image on the present queue, waiting on `wait`.
    /// Returns whether the swapchain needs to be recreated.
    pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, index: u32) -> Result<bool> {
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(std::slice::from_ref(&wait))
            .swapchains(std::slice::from_ref(&self.handle))
            .image_indices(std::slice::from_ref(&index))
            .build();
        let result = unsafe { self.functions.queue_present(queue, &info) };
        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(err) => Err(anyhow::Error::from(Error::from(err))),
        }
    }

    /// Unsafe access to the swapchain extension functions.
    /// # Safety
    /// Any vulkan calls through these functions may put the system in an undefined state.
    pub unsafe fn loader(&self) -> ash::extensions::khr::Swapchain {
        self.functions.clone()
    }

    /// Unsafe access to the underlying vulkan handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // The image views have to go *before* the swapchain itself,
        // otherwise the view handles become invalid.
        self.images.clear();
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSwapchainKHR {:p}", self.handle);
        unsafe {
            self.functions.destroy_swapchain(self.handle, None);
        }
    }
}

fn choose_surface_format(settings: &RendererSettings, surface: &Surface) -> Result<vk::SurfaceFormatKHR> {
    // In case the requested format isn't found, try this. If that one isn't found
    // we fall back to the first available format.
    const FALLBACK_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    if let Some(preferred_format) = settings.surface_format {
        if surface.formats().contains(&preferred_format) {
            return Ok(preferred_format);
        }
    }
    if surface.formats().contains(&FALLBACK_FORMAT) {
        return Ok(FALLBACK_FORMAT);
    }

    surface
        .formats()
        .first()
        .copied()
        .ok_or_else(|| anyhow::Error::from(Error::NoSurfaceFormat))
}

fn choose_present_mode(settings: &RendererSettings, surface: &Surface) -> vk::PresentModeKHR {
    if let Some(mode) = settings.present_mode {
        if surface.present_modes().contains(&mode) {
            return mode;
        }
    }
    // VSync, guaranteed to be supported
    vk::PresentModeKHR::FIFO
}

fn choose_swapchain_extent(surface: &Surface, fallback_extent: vk::Extent2D) -> vk::Extent2D {
    let capabilities = surface.capabilities();
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: fallback_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: fallback_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}
