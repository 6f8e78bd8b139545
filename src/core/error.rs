//! Exposes the deimos error type

use std::ffi::NulError;
use std::path::PathBuf;
use std::sync::PoisonError;

use ash;
use ash::vk;
use gpu_allocator::AllocationError;
use thiserror::Error;

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load the Vulkan library.
    #[error("Failed to load Vulkan.")]
    LoadFailed(ash::LoadingError),
    /// Could not convert rust string to C-String because it has null bytes
    #[error("Invalid C string")]
    InvalidString(NulError),
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(vk::Result),
    /// No suitable GPU found.
    #[error("No physical device found matching requirements.")]
    NoGPU,
    /// No supported surface formats found.
    #[error("No supported surface formats found.")]
    NoSurfaceFormat,
    /// No queue family was found that supports both graphics and presentation.
    #[error("No queue family found supporting graphics and presentation.")]
    NoSuitableQueue,
    /// Vulkan allocation error.
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// A layout transition was requested that the pass graph does not recognize.
    /// This is a programming-contract violation: the pass graph and the transition
    /// table have drifted out of sync.
    #[error("Unsupported image layout transition: {0:?} -> {1:?}")]
    UnsupportedTransition(vk::ImageLayout, vk::ImageLayout),
    /// The GPU reported a lost device. Unrecoverable.
    #[error("Device lost.")]
    DeviceLost,
    /// A model file had an extension the loader does not understand.
    #[error("Unsupported model format: `{0}`")]
    UnsupportedModelFormat(String),
    /// A glTF index accessor used a component type the loader does not understand.
    #[error("Unsupported index component type in `{0}`")]
    UnsupportedIndexType(PathBuf),
    /// A shader binary could not be read from disk.
    #[error("Could not read shader binary at `{0}`")]
    ShaderNotFound(PathBuf),
    /// A texture file could not be decoded.
    #[error("Could not load texture at `{0}`")]
    TextureLoadFailed(PathBuf),
    /// Mappable buffer expected.
    #[error("Requested mappable buffer, but buffer does not have a memory map")]
    UnmappableBuffer,
    /// Poisoned mutex.
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::LoadingError> for Error {
    fn from(value: ash::LoadingError) -> Self {
        Error::LoadFailed(value)
    }
}

impl From<NulError> for Error {
    fn from(value: NulError) -> Self {
        Error::InvalidString(value)
    }
}

impl From<vk::Result> for Error {
    fn from(value: vk::Result) -> Self {
        match value {
            vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
            err => Error::VkError(err),
        }
    }
}

impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}

impl From<(Vec<vk::Pipeline>, vk::Result)> for Error {
    fn from(_: (Vec<vk::Pipeline>, vk::Result)) -> Self {
        Error::Uncategorized("Pipeline creation failed")
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
