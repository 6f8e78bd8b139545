//! Command pool and command buffer helpers.

use std::slice;

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;

/// Wrapper around a [`VkCommandPool`](vk::CommandPool). All command buffers used by
/// the renderer are allocated from a single pool on the graphics family, with the
/// `RESET_COMMAND_BUFFER` flag so per-frame buffers can be re-recorded individually.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandPool {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool on the graphics queue family.
    pub fn new(device: Device) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.graphics_family());
        let handle = unsafe { device.create_command_pool(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkCommandPool {handle:p}");
        Ok(CommandPool {
            device,
            handle,
        })
    }

    /// Allocate `count` primary command buffers from this pool.
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let buffers = unsafe { self.device.allocate_command_buffers(&info)? };
        Ok(buffers)
    }

    /// Record and submit a one-time command buffer on the graphics queue, then block
    /// until it completes. Used for resource uploads and initial layout transitions,
    /// never on the frame path.
    pub fn submit_once<F: FnOnce(vk::CommandBuffer) -> Result<()>>(&self, record: F) -> Result<()> {
        let cmd = self.allocate(1)?[0];
        let begin = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin)? };
        let recorded = record(cmd);
        unsafe { self.device.end_command_buffer(cmd)? };
        if let Err(err) = recorded {
            unsafe { self.device.free_command_buffers(self.handle, slice::from_ref(&cmd)) };
            return Err(err);
        }

        let submit = vk::SubmitInfo::builder()
            .command_buffers(slice::from_ref(&cmd))
            .build();
        unsafe {
            self.device
                .queue_submit(self.device.graphics_queue(), slice::from_ref(&submit), vk::Fence::null())?;
            self.device.queue_wait_idle(self.device.graphics_queue())?;
            self.device.free_command_buffers(self.handle, slice::from_ref(&cmd));
        }
        Ok(())
    }

    /// Get unsafe access to the underlying `VkCommandPool` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkCommandPool {:p}", self.handle);
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}
