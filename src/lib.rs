//! Tracks the state of gpu resources across hardware queues and keeps the memory they reference
//! resident.
//!
//! The [`transition::TransitionPlanner`] turns desired resource states into barriers, cross queue
//! waits and flushes right before command batches are recorded. The
//! [`residency::ResidencyManager`] pages managed allocations in and out of device memory right
//! before they are submitted.

pub mod queue;
pub mod residency;
pub mod state;
pub mod transition;
pub mod util;
pub mod vk;

pub mod prelude {
    pub use crate::queue::{FenceMonitor, HardwareQueue, PerQueue, QueueType, Queues};
    pub use crate::residency::{AllocationHandle, ResidencyConfig, ResidencyError, ResidencyManager, ResidencySet, ResidencyStatus};
    pub use crate::state::{ResourceDesc, ResourceState, SubresourceRange, TransitionFlags};
    pub use crate::transition::{Barrier, Subresources, TransitionError, TransitionPlanner};
    pub use crate::util::id::{ObjectId, ResourceId};
}
