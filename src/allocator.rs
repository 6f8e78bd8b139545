//! Device memory allocation, backed by the [`gpu_allocator`] crate.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;
use gpu_allocator::MemoryLocation;

use crate::core::device::Device;
use crate::core::error::Error;
use crate::core::instance::Instance;
use crate::core::physical_device::PhysicalDevice;

/// The memory type of an allocation indicates where it should live.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryType {
    /// Device-local memory. The fastest memory to access from shaders, but
    /// usually not mappable from the CPU.
    GpuOnly,
    /// Memory used for CPU to GPU uploads, like staging buffers or
    /// per-frame uniform buffers.
    CpuToGpu,
    /// Memory used for GPU to CPU readbacks.
    GpuToCpu,
}

impl From<MemoryType> for MemoryLocation {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::GpuOnly => MemoryLocation::GpuOnly,
            MemoryType::CpuToGpu => MemoryLocation::CpuToGpu,
            MemoryType::GpuToCpu => MemoryLocation::GpuToCpu,
        }
    }
}

/// Allocation obtained from [`Allocator::allocate()`]. Freed automatically on drop.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct Allocation {
    // Both are always Some(_) until drop, where they are moved out.
    #[derivative(Debug = "ignore")]
    allocator: Option<Allocator>,
    allocation: Option<vk_alloc::Allocation>,
}

/// Device memory allocator. All internal state is wrapped in an `Arc<Mutex<T>>`,
/// so this is safe to clone and pass around.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Allocator {
    #[derivative(Debug = "ignore")]
    alloc: Arc<Mutex<vk_alloc::Allocator>>,
}

impl Allocator {
    /// Create a new allocator over the given device.
    pub fn new(
        instance: &Instance,
        device: &Device,
        physical_device: &PhysicalDevice,
    ) -> Result<Self> {
        Ok(Self {
            alloc: Arc::new(Mutex::new(vk_alloc::Allocator::new(
                &vk_alloc::AllocatorCreateDesc {
                    instance: (*instance).clone(),
                    // SAFETY: The user passed in a valid Device reference.
                    device: unsafe { device.handle() },
                    // SAFETY: The user passed in a valid PhysicalDevice reference.
                    physical_device: unsafe { physical_device.handle() },
                    debug_settings: Default::default(),
                    buffer_device_address: false,
                },
            )?)),
        })
    }

    /// Allocate raw memory of a specific memory type. The name is used for internal
    /// tracking and debug logging only.
    pub fn allocate(
        &self,
        name: &str,
        requirements: &vk::MemoryRequirements,
        ty: MemoryType,
    ) -> Result<Allocation> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        let allocation = alloc.allocate(&vk_alloc::AllocationCreateDesc {
            name,
            requirements: *requirements,
            location: ty.into(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(Allocation {
            allocator: Some(self.clone()),
            allocation: Some(allocation),
        })
    }

    fn free_impl(&self, allocation: &mut Allocation) -> Result<()> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        if let Some(allocation) = allocation.allocation.take() {
            alloc.free(allocation)?;
        }
        Ok(())
    }
}

impl Allocation {
    /// The underlying `VkDeviceMemory` block this allocation lives in.
    /// # Safety
    /// The allocation is a suballocation of this memory block. Only the range
    /// starting at [`Self::offset()`] belongs to this allocation.
    pub unsafe fn memory(&self) -> vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map(|alloc| alloc.memory())
            .unwrap_or_default()
    }

    /// Offset of this allocation inside the memory block.
    pub fn offset(&self) -> vk::DeviceSize {
        self.allocation
            .as_ref()
            .map(|alloc| alloc.offset())
            .unwrap_or_default()
    }

    /// Host-visible pointer to the mapped memory, if the memory type is mappable.
    pub fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        self.allocation.as_ref().and_then(|alloc| alloc.mapped_ptr())
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            let _ = allocator.free_impl(self);
        }
    }
}
