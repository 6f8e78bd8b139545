//! GPU buffer wrappers and upload helpers.

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::allocator::{Allocation, Allocator, MemoryType};
use crate::command_pool::CommandPool;
use crate::core::device::Device;
use crate::core::error::Error;

/// Wrapper around a [`VkBuffer`](vk::Buffer) together with its backing allocation.
/// Buffers allocated in mappable memory are persistently mapped for their entire
/// lifetime.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Buffer {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    memory: Allocation,
    pointer: Option<NonNull<c_void>>,
    handle: vk::Buffer,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Allocate a new buffer with the given usage flags in the given memory type.
    pub fn new(
        device: Device,
        allocator: &Allocator,
        size: impl Into<vk::DeviceSize>,
        usage: vk::BufferUsageFlags,
        location: MemoryType,
    ) -> Result<Self> {
        let size = size.into();
        let handle = unsafe {
            device.create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(size)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE),
                None,
            )?
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {handle:p}");

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let memory = allocator.allocate("buffer", &requirements, location)?;
        unsafe { device.bind_buffer_memory(handle, memory.memory(), memory.offset())? };

        Ok(Self {
            device,
            pointer: memory.mapped_ptr(),
            memory,
            handle,
            size,
        })
    }

    /// Allocate a device-local buffer, additionally flagged as a transfer destination
    /// so it can be filled through a staging buffer.
    pub fn new_device_local(
        device: Device,
        allocator: &Allocator,
        size: impl Into<vk::DeviceSize>,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        Self::new(
            device,
            allocator,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryType::GpuOnly,
        )
    }

    /// View the buffer's mapped memory as a slice of `T`.
    /// Fails with [`Error::UnmappableBuffer`] if the buffer is not allocated in
    /// mappable memory.
    /// # Safety
    /// The buffer contents must be valid for the layout of `T`, and no GPU work
    /// writing to this buffer may be in flight while the slice is alive.
    pub unsafe fn mapped_slice<T>(&mut self) -> Result<&mut [T]> {
        if let Some(pointer) = self.pointer {
            Ok(std::slice::from_raw_parts_mut(
                pointer.cast::<T>().as_ptr(),
                self.size as usize / std::mem::size_of::<T>(),
            ))
        } else {
            Err(Error::UnmappableBuffer.into())
        }
    }

    /// Whether this buffer's memory is persistently mapped.
    pub fn is_mapped(&self) -> bool {
        self.pointer.is_some()
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Get unsafe access to the underlying `VkBuffer` handle.
    /// # Safety
    /// Any vulkan calls on this handle may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Buffer {
        self.handle
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {:p}", self.handle);
        unsafe {
            self.device.destroy_buffer(self.handle, None);
        }
    }
}

/// Create a device-local buffer and fill it with `data` through a temporary
/// staging buffer. Blocks until the copy completes.
pub fn upload_buffer<T: Copy>(
    device: Device,
    allocator: &Allocator,
    pool: &CommandPool,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<Buffer> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;
    let mut staging = Buffer::new(
        device.clone(),
        allocator,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryType::CpuToGpu,
    )?;
    // SAFETY: The staging buffer was just created with the exact size of `data`,
    // and no GPU work references it yet.
    unsafe { staging.mapped_slice::<T>()?.copy_from_slice(data) };

    let buffer = Buffer::new_device_local(device, allocator, size, usage)?;
    pool.submit_once(|cmd| {
        let region = vk::BufferCopy::builder().size(size).build();
        unsafe {
            buffer
                .device
                .cmd_copy_buffer(cmd, staging.handle, buffer.handle, std::slice::from_ref(&region));
        }
        Ok(())
    })?;
    Ok(buffer)
}
