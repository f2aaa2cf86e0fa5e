use std::fmt::{Display, Formatter};

use super::budget::{MemoryBudgetInfo, MemorySegment};

/// A opaque device allocation that can be paged in and out.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AllocationHandle(u64);

impl AllocationHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get_raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub enum DeviceError {
    OutOfHostMemory,
    OutOfDeviceMemory,
    DeviceLost,
    Unknown(i32),
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::OutOfHostMemory => f.write_str("Out of host memory"),
            DeviceError::OutOfDeviceMemory => f.write_str("Out of device memory"),
            DeviceError::DeviceLost => f.write_str("Device lost"),
            DeviceError::Unknown(code) => write!(f, "Unknown device error {}", code),
        }
    }
}

impl std::error::Error for DeviceError {
}

/// The paging interface of a device.
///
/// Calls are only ever made from inside a paging pass while the residency lock is held.
pub trait ResidencyDevice: Send + Sync {
    /// Starts making allocations resident. The device signals the paging fence with
    /// `paging_fence_value` once all of them are usable.
    fn enqueue_make_resident(&self, allocations: &[AllocationHandle], paging_fence_value: u64) -> Result<(), DeviceError>;

    fn evict(&self, allocations: &[AllocationHandle]) -> Result<(), DeviceError>;

    fn query_memory_budget(&self, segment: MemorySegment) -> MemoryBudgetInfo;
}
