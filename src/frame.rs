//! Frame-in-flight scheduling.
//!
//! The scheduler owns N frame slots (N = frames in flight, independent of the
//! swapchain image count). A slot's resources may only be rewritten after its fence
//! has signaled; that single invariant is what keeps CPU writes from racing GPU
//! reads of the previous use of the slot.

use anyhow::Result;
use ash::vk;
use glam::Mat4;

use crate::allocator::{Allocator, MemoryType};
use crate::buffer::Buffer;
use crate::command_pool::CommandPool;
use crate::core::device::Device;
use crate::sync::{Fence, Semaphore};

/// Per-frame camera data, written into the slot's mapped uniform buffer every frame.
/// Layout matches the GLSL `std140` uniform block.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
}

/// The synchronization objects and command buffer of one in-flight frame.
#[derive(Debug)]
pub struct FrameSlot {
    /// Signaled by the swapchain when the acquired image is ready to be rendered to.
    pub image_available: Semaphore,
    /// Signaled by the graphics queue when rendering completes; presentation waits on it.
    pub render_finished: Semaphore,
    /// Signaled when all GPU work of this slot's previous frame has finished.
    /// Created signaled so the first use of each slot does not deadlock.
    pub fence: Fence,
    pub command_buffer: vk::CommandBuffer,
}

/// Ring of [`FrameSlot`]s plus one persistently mapped uniform buffer per slot.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FrameScheduler {
    #[derivative(Debug = "ignore")]
    device: Device,
    slots: Vec<FrameSlot>,
    uniforms: Vec<Buffer>,
    current: usize,
}

pub(crate) fn next_slot(current: usize, frames_in_flight: usize) -> usize {
    (current + 1) % frames_in_flight
}

impl FrameScheduler {
    /// Create the slot ring. All slot resources are created once and live until the
    /// scheduler drops.
    pub fn new(
        device: Device,
        allocator: &Allocator,
        pool: &CommandPool,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let command_buffers = pool.allocate(frames_in_flight as u32)?;
        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| -> Result<FrameSlot> {
                Ok(FrameSlot {
                    image_available: Semaphore::new(device.clone())?,
                    render_finished: Semaphore::new(device.clone())?,
                    fence: Fence::new(device.clone(), true)?,
                    command_buffer,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let uniforms = (0..frames_in_flight)
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    allocator,
                    std::mem::size_of::<CameraUniform>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryType::CpuToGpu,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FrameScheduler {
            device,
            slots,
            uniforms,
            current: 0,
        })
    }

    /// Index of the slot the next frame will use.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of slots in the ring.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// The slot at `index`.
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// The per-slot uniform buffers, for descriptor writes.
    pub fn uniforms(&self) -> &[Buffer] {
        &self.uniforms
    }

    /// Block until the current slot's previous frame has fully completed on the GPU.
    /// After this returns, every resource of the slot is safe to rewrite.
    pub fn wait_current(&self) -> Result<()> {
        self.slots[self.current].fence.wait()
    }

    /// Write the camera matrices into the current slot's mapped uniform memory.
    /// Plain copy; exclusivity was established by [`Self::wait_current()`].
    pub fn write_camera(&mut self, uniform: CameraUniform) -> Result<()> {
        let buffer = &mut self.uniforms[self.current];
        // SAFETY: The buffer is host-visible and the slot fence has signaled, so the
        // GPU no longer reads it.
        let mapped = unsafe { buffer.mapped_slice::<CameraUniform>()? };
        mapped[0] = uniform;
        Ok(())
    }

    /// Reset the current slot's fence and command buffer so a new frame can be
    /// recorded into it.
    pub fn reset_current(&self) -> Result<()> {
        let slot = &self.slots[self.current];
        slot.fence.reset()?;
        unsafe {
            self.device.reset_command_buffer(
                slot.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?
        };
        Ok(())
    }

    /// Submit the current slot's command buffer: wait on image-available at the
    /// color-output stage, signal render-finished, and signal the slot fence when
    /// all work retires.
    pub fn submit_current(&self) -> Result<()> {
        let slot = &self.slots[self.current];
        let wait_semaphore = unsafe { slot.image_available.handle() };
        let signal_semaphore = unsafe { slot.render_finished.handle() };
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(std::slice::from_ref(&wait_semaphore))
            .wait_dst_stage_mask(std::slice::from_ref(&wait_stage))
            .command_buffers(std::slice::from_ref(&slot.command_buffer))
            .signal_semaphores(std::slice::from_ref(&signal_semaphore))
            .build();
        unsafe {
            self.device.queue_submit(
                self.device.graphics_queue(),
                std::slice::from_ref(&submit),
                slot.fence.handle(),
            )?
        };
        Ok(())
    }

    /// Advance the ring to the next slot.
    pub fn advance(&mut self) {
        self.current = next_slot(self.current, self.slots.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_at_frame_count() {
        assert_eq!(next_slot(0, 2), 1);
        assert_eq!(next_slot(1, 2), 0);
        assert_eq!(next_slot(2, 3), 0);
        // Slot for frame F is F mod N.
        let mut slot = 0;
        for frame in 1..=10usize {
            slot = next_slot(slot, 3);
            assert_eq!(slot, frame % 3);
        }
    }
}
