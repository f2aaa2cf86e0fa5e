//! Keeps the working set of each submission resident within the device memory budget.
//!
//! Every managed allocation is either resident or evicted. Right before a command list is
//! submitted [`ResidencyManager::process_paging_work`] makes all objects it references resident,
//! evicting least recently used objects the device is done with to stay inside the budget.

mod budget;
mod device;
mod set;
mod tracker;

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use static_assertions::assert_impl_all;

use crate::queue::{FenceMonitor, PerQueue, QueueType};
use crate::util::id::ObjectId;

pub use budget::{calc_grace_period, calc_min_grace_period, MemoryBudgetInfo, MemorySegment};
pub use device::{AllocationHandle, DeviceError, ResidencyDevice};
pub use set::ResidencySet;
pub use tracker::{LruIter, ManagedObject, ResidencyStatus, ResidencyTracker, TrimResult};

#[derive(Clone, Debug)]
pub struct ResidencyConfig {
    min_grace_period: Duration,
    max_grace_period: Duration,
    allow_over_budget: bool,
}

impl ResidencyConfig {
    pub fn new() -> Self {
        Self {
            min_grace_period: Duration::from_secs(1),
            max_grace_period: Duration::from_secs(60),
            allow_over_budget: true,
        }
    }

    /// Sets how long a allocation must be unused before it may be evicted. `min` applies at or
    /// over budget and `max` when no memory is used.
    pub fn set_grace_period(&mut self, min: Duration, max: Duration) {
        debug_assert!(min <= max);
        self.min_grace_period = min;
        self.max_grace_period = max;
    }

    /// If disabled a paging pass that cannot fit its working set into the budget fails with
    /// [`ResidencyError::BudgetExceeded`] instead of exceeding the budget.
    pub fn allow_over_budget(&mut self, allow: bool) {
        self.allow_over_budget = allow;
    }

    pub fn get_min_grace_period(&self) -> Duration {
        self.min_grace_period
    }

    pub fn get_max_grace_period(&self) -> Duration {
        self.max_grace_period
    }

    pub fn is_over_budget_allowed(&self) -> bool {
        self.allow_over_budget
    }
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum ResidencyError {
    UnknownObject(ObjectId),
    MakeResidentFailed(DeviceError),
    EvictFailed(DeviceError),
    BudgetExceeded {
        required: u64,
        budget: u64,
    },
}

impl Display for ResidencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResidencyError::UnknownObject(id) => write!(f, "Unknown managed object {:?}", id),
            ResidencyError::MakeResidentFailed(err) => write!(f, "Failed to make objects resident: {}", err),
            ResidencyError::EvictFailed(err) => write!(f, "Failed to evict objects: {}", err),
            ResidencyError::BudgetExceeded { required, budget } => write!(f, "Working set of {} bytes exceeds budget of {} bytes", required, budget),
        }
    }
}

impl std::error::Error for ResidencyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResidencyError::MakeResidentFailed(err) | ResidencyError::EvictFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// The result of a paging pass.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct PagingOutcome {
    /// The paging fence value the submission must wait on before executing. None if nothing had
    /// to be made resident.
    pub paging_fence_wait: Option<u64>,
    pub made_resident: usize,
    pub evicted: usize,

    /// How far the local segment is over budget after the pass. Only ever non zero if over budget
    /// residency is allowed.
    pub over_budget_bytes: u64,
}

/// A copy of the residency state for diagnostics.
#[derive(Clone, Debug)]
pub struct ResidencySnapshot {
    /// All resident objects from most to least recently used.
    pub resident: Vec<(ObjectId, ManagedObject)>,
    pub resident_size: u64,
    pub tracked_count: usize,
}

struct ResidencyInner {
    tracker: ResidencyTracker,
    pass: u64,
    paging_fence_value: u64,
}

pub struct ResidencyManager {
    inner: Mutex<ResidencyInner>,
    device: Arc<dyn ResidencyDevice>,
    fences: Arc<dyn FenceMonitor>,
    config: ResidencyConfig,
}

assert_impl_all!(ResidencyManager: Send, Sync);

impl ResidencyManager {
    pub fn new(device: Arc<dyn ResidencyDevice>, fences: Arc<dyn FenceMonitor>, config: ResidencyConfig) -> Self {
        Self {
            inner: Mutex::new(ResidencyInner {
                tracker: ResidencyTracker::new(),
                pass: 0,
                paging_fence_value: 0,
            }),
            device,
            fences,
            config,
        }
    }

    pub fn get_config(&self) -> &ResidencyConfig {
        &self.config
    }

    /// Starts managing a allocation. The allocation must currently be resident.
    pub fn begin_tracking(&self, handle: AllocationHandle, size: u64) -> ObjectId {
        let mut guard = self.lock_inner("begin_tracking");
        guard.tracker.begin_tracking(handle, size, Instant::now())
    }

    /// Stops managing a object.
    ///
    /// Returns the fence values of the last use on each queue. The allocation must not be
    /// destroyed before they have completed.
    pub fn end_tracking(&self, id: ObjectId) -> Result<PerQueue<u64>, ResidencyError> {
        let mut guard = self.lock_inner("end_tracking");
        guard.tracker.end_tracking(id)
            .map(|object| *object.get_last_used_fences())
            .ok_or(ResidencyError::UnknownObject(id))
    }

    /// Prevents a object from being evicted.
    pub fn pin(&self, id: ObjectId) -> Result<(), ResidencyError> {
        self.set_pinned(id, true)
    }

    pub fn unpin(&self, id: ObjectId) -> Result<(), ResidencyError> {
        self.set_pinned(id, false)
    }

    pub fn get_residency_status(&self, id: ObjectId) -> Result<ResidencyStatus, ResidencyError> {
        let guard = self.lock_inner("get_residency_status");
        guard.tracker.get(id).map(ManagedObject::get_status).ok_or(ResidencyError::UnknownObject(id))
    }

    /// The last paging fence value handed to the device.
    pub fn get_paging_fence_value(&self) -> u64 {
        self.lock_inner("get_paging_fence_value").paging_fence_value
    }

    pub fn snapshot(&self) -> ResidencySnapshot {
        let guard = self.lock_inner("snapshot");
        ResidencySnapshot {
            resident: guard.tracker.iter().map(|(id, object)| (id, object.clone())).collect(),
            resident_size: guard.tracker.get_resident_size(),
            tracked_count: guard.tracker.get_tracked_count(),
        }
    }

    /// Makes every object in `set` resident for a submission to `queue`.
    ///
    /// Objects are paged in batches that fit the local budget. Room is made by evicting the least
    /// recently used objects that have been idle for the grace period first. If that is not
    /// enough any object the device is done with is evicted, waiting for the device if necessary.
    /// What still does not fit is made resident over budget unless that is disabled in the config.
    ///
    /// On error the objects that were not made resident are evicted again and no eviction is
    /// performed.
    pub fn process_paging_work(&self, queue: QueueType, set: ResidencySet) -> Result<PagingOutcome, ResidencyError> {
        let mut guard = self.lock_inner("process_paging_work");
        let inner = &mut *guard;

        if let Some(id) = set.iter().find(|id| !inner.tracker.contains(*id)) {
            return Err(ResidencyError::UnknownObject(id));
        }

        inner.pass += 1;
        let pass = inner.pass;
        let now = Instant::now();
        let fence_value = self.fences.current_fence_value(queue);

        let mut pending = Vec::new();
        let mut pending_size = 0u64;
        for id in set.iter() {
            if inner.tracker.make_resident(id) {
                pending_size += Self::get_size(&inner.tracker, id);
                pending.push(id);
            }
            inner.tracker.object_referenced(id, queue, fence_value, now, pass);
        }

        let local = self.device.query_memory_budget(MemorySegment::Local);
        let non_local = self.device.query_memory_budget(MemorySegment::NonLocal);
        let grace = calc_min_grace_period(self.config.min_grace_period, self.config.max_grace_period, [&local, &non_local]);

        let budget = local.budget;
        let mut usage = local.usage;
        let mut completed = PerQueue::from_fn(|queue| self.fences.completed_fence_value(queue));
        let mut evicted = Vec::new();

        let overshoot = (usage + pending_size).saturating_sub(budget);
        if overshoot > 0 {
            let freed = inner.tracker.trim_aged_allocations(now, grace, pass, &completed, overshoot, &mut evicted);
            usage = usage.saturating_sub(freed);
        }

        let mut outcome = PagingOutcome::default();
        let mut batch = Vec::new();
        let mut index = 0;
        while index < pending.len() {
            let headroom = budget.saturating_sub(usage);

            let mut end = index;
            let mut batch_size = 0u64;
            while end < pending.len() {
                let size = Self::get_size(&inner.tracker, pending[end]);
                if batch_size + size > headroom {
                    break;
                }
                batch_size += size;
                end += 1;
            }

            if end == index {
                let needed = Self::get_size(&inner.tracker, pending[index]) - headroom;
                let freed = self.trim_to_budget_inclusive(&mut inner.tracker, pass, &mut completed, needed, &mut evicted);
                usage = usage.saturating_sub(freed);
                if freed >= needed {
                    continue;
                }

                let remaining: u64 = pending[index..].iter().map(|id| Self::get_size(&inner.tracker, *id)).sum();
                if !self.config.allow_over_budget {
                    Self::rollback(&mut inner.tracker, &pending[index..], &evicted);
                    return Err(ResidencyError::BudgetExceeded { required: usage + remaining, budget });
                }

                log::warn!("Working set of {} bytes does not fit into the residency budget of {} bytes. Forcing residency over budget", usage + remaining, budget);
                end = pending.len();
                batch_size = remaining;
            }

            batch.clear();
            batch.extend(pending[index..end].iter().filter_map(|id| inner.tracker.get(*id).map(ManagedObject::get_handle)));

            inner.paging_fence_value += 1;
            if let Err(err) = self.device.enqueue_make_resident(&batch, inner.paging_fence_value) {
                log::error!("Failed to make {} objects resident: {:?}", batch.len(), err);
                Self::rollback(&mut inner.tracker, &pending[index..], &evicted);
                return Err(ResidencyError::MakeResidentFailed(err));
            }

            outcome.paging_fence_wait = Some(inner.paging_fence_value);
            outcome.made_resident += end - index;
            usage += batch_size;
            index = end;
        }

        if !evicted.is_empty() {
            let handles: Vec<_> = evicted.iter().filter_map(|id| inner.tracker.get(*id).map(ManagedObject::get_handle)).collect();
            if let Err(err) = self.device.evict(&handles) {
                log::error!("Failed to evict {} objects: {:?}", handles.len(), err);
                Self::rollback(&mut inner.tracker, &[], &evicted);
                return Err(ResidencyError::EvictFailed(err));
            }
        }

        outcome.evicted = evicted.len();
        outcome.over_budget_bytes = usage.saturating_sub(budget);
        Ok(outcome)
    }

    /// Evicts idle objects ignoring their age until `needed` bytes are freed. If only objects the
    /// device may still be using are left the calling thread waits for the least recently used
    /// one.
    fn trim_to_budget_inclusive(&self, tracker: &mut ResidencyTracker, pass: u64, completed: &mut PerQueue<u64>, needed: u64, evicted: &mut Vec<ObjectId>) -> u64 {
        let mut freed = 0u64;
        loop {
            let result = tracker.trim_to_budget_inclusive(pass, completed, needed - freed, evicted);
            freed += result.freed;
            if freed >= needed {
                break;
            }

            let fences = match result.blocked_on.and_then(|id| tracker.get(id)) {
                Some(object) => *object.get_last_used_fences(),
                None => break,
            };
            for (queue, fence_value) in fences.iter() {
                if *fence_value > completed[queue] {
                    log::debug!("Waiting for {} queue fence {} to free residency budget", queue.as_str(), fence_value);
                    self.fences.wait_for_fence(queue, *fence_value);
                    completed[queue] = *fence_value;
                }
            }
        }
        freed
    }

    /// Undoes the residency decisions of a failed paging pass.
    fn rollback(tracker: &mut ResidencyTracker, not_paged_in: &[ObjectId], evicted: &[ObjectId]) {
        for id in not_paged_in {
            tracker.evict(*id);
        }
        for id in evicted.iter().rev() {
            tracker.restore_at_tail(*id);
        }
    }

    fn get_size(tracker: &ResidencyTracker, id: ObjectId) -> u64 {
        tracker.get(id).map_or(0, ManagedObject::get_size)
    }

    fn set_pinned(&self, id: ObjectId, pinned: bool) -> Result<(), ResidencyError> {
        let mut guard = self.lock_inner("set_pinned");
        if guard.tracker.set_pinned(id, pinned) {
            Ok(())
        } else {
            Err(ResidencyError::UnknownObject(id))
        }
    }

    fn lock_inner(&self, caller: &str) -> MutexGuard<ResidencyInner> {
        self.inner.lock().unwrap_or_else(|_| {
            log::error!("Poisoned residency mutex in ResidencyManager::{}!", caller);
            panic!()
        })
    }
}
