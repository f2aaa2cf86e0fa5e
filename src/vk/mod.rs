//! Translation of planner and residency types into vulkan structures.

pub mod barrier;
pub mod budget;
pub mod state;

use ash::vk;
use ash::vk::Handle;

use crate::residency::{AllocationHandle, DeviceError};

pub use barrier::{BarrierBatch, VkResource};
pub use state::VkResourceState;

impl From<vk::DeviceMemory> for AllocationHandle {
    fn from(memory: vk::DeviceMemory) -> Self {
        AllocationHandle::from_raw(memory.as_raw())
    }
}

impl From<vk::Result> for DeviceError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => DeviceError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => DeviceError::OutOfDeviceMemory,
            vk::Result::ERROR_DEVICE_LOST => DeviceError::DeviceLost,
            _ => DeviceError::Unknown(result.as_raw()),
        }
    }
}
