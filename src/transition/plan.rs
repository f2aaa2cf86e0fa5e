//! Computes the barriers, waits and flushes needed to move subresources into their desired state.
//!
//! Planning never touches the state tables. The resulting [`TransitionPlan`] is executed and
//! committed by the [`super::TransitionPlanner`] once every resource on the worklist has been
//! planned successfully.

use crate::queue::{PerQueue, QueueType, Queues};
use crate::state::{CurrentState, DesiredState, ResourceDesc, ResourceState, SharedAccess, TransitionFlags};
use crate::util::id::ResourceId;

use super::barrier::{Barrier, Subresources};
use super::TransitionError;

/// Fence values of one queue captured at the start of an apply pass.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct QueueFences {
    pub current: u64,
    pub completed: u64,
    pub has_pending_commands: bool,
}

/// Fence snapshot of every queue available to a pass.
pub(crate) struct FenceSnapshot {
    fences: PerQueue<Option<QueueFences>>,
}

impl FenceSnapshot {
    pub(crate) fn capture(queues: &Queues) -> Self {
        Self {
            fences: PerQueue::from_fn(|queue_type| {
                queues.get(queue_type).map(|queue| QueueFences {
                    current: queue.current_fence_value(),
                    completed: queue.completed_fence_value(),
                    has_pending_commands: queue.has_pending_commands(),
                })
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_fences(fences: PerQueue<Option<QueueFences>>) -> Self {
        Self { fences }
    }

    pub(crate) fn get(&self, queue: QueueType) -> Result<&QueueFences, TransitionError> {
        self.fences[queue].as_ref().ok_or(TransitionError::QueueUnavailable(queue))
    }
}

/// A resolved state that still needs its fence stamped once the plan has been executed.
///
/// The fence of the destination queue is only known after the flushes of the pass have been
/// issued, so the planner records which queue the new state belongs to and stamps it at commit.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StateUpdate {
    pub resource: ResourceId,
    pub subresources: Subresources,
    pub state: CurrentState,
    pub queue: QueueType,
}

impl StateUpdate {
    /// Returns the new state with the fence of `queue` set to `fence_value`.
    pub fn stamped(&self, fence_value: u64) -> CurrentState {
        let mut state = self.state;
        match &mut state {
            CurrentState::Common => {}
            CurrentState::Exclusive(exclusive) => {
                if exclusive.queue == self.queue {
                    exclusive.fence_value = fence_value;
                }
            }
            CurrentState::Shared(shared) => {
                if let Some(access) = shared.get(self.queue).copied() {
                    shared.set(self.queue, SharedAccess { state: access.state, fence_value });
                }
            }
        }
        state
    }
}

/// The output of a planning step.
#[derive(Default)]
pub struct TransitionPlan {
    source_barriers: PerQueue<Vec<Barrier>>,
    destination_barriers: PerQueue<Vec<Barrier>>,
    waits: PerQueue<PerQueue<Option<u64>>>,
    flushes: PerQueue<bool>,
    updates: Vec<StateUpdate>,
}

impl TransitionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the plan keeping all allocations.
    pub fn clear(&mut self) {
        for (_, barriers) in self.source_barriers.iter_mut() {
            barriers.clear();
        }
        for (_, barriers) in self.destination_barriers.iter_mut() {
            barriers.clear();
        }
        self.waits = PerQueue::default();
        self.flushes = PerQueue::default();
        self.updates.clear();
    }

    pub fn get_source_barriers(&self, queue: QueueType) -> &[Barrier] {
        &self.source_barriers[queue]
    }

    pub fn get_destination_barriers(&self, queue: QueueType) -> &[Barrier] {
        &self.destination_barriers[queue]
    }

    /// Returns the fence of `source` the queue `destination` has to wait on.
    pub fn get_wait(&self, destination: QueueType, source: QueueType) -> Option<u64> {
        self.waits[destination][source]
    }

    /// Iterates all `(destination, source, fence_value)` waits.
    pub fn iter_waits(&self) -> impl Iterator<Item=(QueueType, QueueType, u64)> + '_ {
        self.waits.iter().flat_map(|(destination, sources)| {
            sources.iter().filter_map(move |(source, fence)| fence.map(|fence| (destination, source, fence)))
        })
    }

    pub fn is_flushed(&self, queue: QueueType) -> bool {
        self.flushes[queue]
    }

    pub fn get_updates(&self) -> &[StateUpdate] {
        &self.updates
    }

    pub fn get_barrier_count(&self) -> usize {
        self.source_barriers.iter().chain(self.destination_barriers.iter()).map(|(_, barriers)| barriers.len()).sum()
    }

    pub fn get_wait_count(&self) -> usize {
        self.iter_waits().count()
    }

    pub fn get_flush_count(&self) -> usize {
        self.flushes.iter().filter(|(_, flush)| **flush).count()
    }

    pub(crate) fn push_update(&mut self, update: StateUpdate) -> Result<(), TransitionError> {
        push_checked(&mut self.updates, update)
    }

    fn push_source_barrier(&mut self, queue: QueueType, barrier: Barrier) -> Result<(), TransitionError> {
        push_checked(&mut self.source_barriers[queue], barrier)
    }

    fn push_destination_barrier(&mut self, queue: QueueType, barrier: Barrier) -> Result<(), TransitionError> {
        push_checked(&mut self.destination_barriers[queue], barrier)
    }

    /// Makes `destination` wait until `source` has completed the work of `fence_value`.
    ///
    /// Waits on completed fences are dropped. If the fence belongs to the batch `source` is still
    /// recording the batch is flushed, unless nothing was recorded into it.
    fn add_wait(&mut self, destination: QueueType, source: QueueType, fence_value: u64, fences: &QueueFences) {
        debug_assert_ne!(destination, source);

        if fence_value <= fences.completed {
            return;
        }

        let mut fence_value = fence_value;
        if fence_value >= fences.current {
            let recorded = fences.has_pending_commands || !self.source_barriers[source].is_empty();
            if !recorded {
                return;
            }
            self.flushes[source] = true;
            fence_value = fences.current;
        }

        let wait = &mut self.waits[destination][source];
        *wait = Some(wait.map_or(fence_value, |old| old.max(fence_value)));
    }

    /// Plans the transition of some subresources from `current` into `desired` and returns the new
    /// current state.
    ///
    /// The fence of the destination queue in the returned state is left at 0 and is stamped at
    /// commit time.
    pub(crate) fn plan_subresource(
        &mut self,
        resource: ResourceId,
        subresources: Subresources,
        desc: &ResourceDesc,
        current: &CurrentState,
        desired: &DesiredState,
        fences: &FenceSnapshot,
    ) -> Result<CurrentState, TransitionError> {
        let queue = desired.queue;
        fences.get(queue)?;

        let state = desired.state;
        let exclusive = desired.requires_exclusive(desc) || state.is_common();

        match current {
            CurrentState::Common => {
                if state.is_common() {
                    return Ok(CurrentState::Common);
                }
                if desc.shareable {
                    // Shareable resources are implicitly promoted out of the common state
                    return Ok(Self::make_owned(queue, state, exclusive));
                }
                self.push_destination_barrier(queue, Barrier::new(resource, subresources, ResourceState::COMMON, state))?;
                Ok(CurrentState::new_exclusive(state, queue, 0))
            }

            CurrentState::Exclusive(owner) if owner.queue == queue => {
                let target = if owner.state.implies(state) {
                    owner.state
                } else if owner.state.can_accumulate(state) && !desired.flags.contains(TransitionFlags::NO_ACCUMULATE) {
                    owner.state | state
                } else {
                    state
                };

                if target != owner.state {
                    self.push_destination_barrier(queue, Barrier::new(resource, subresources, owner.state, target))?;
                }

                Ok(Self::make_owned(queue, target, exclusive || !target.is_read()))
            }

            CurrentState::Exclusive(owner) => {
                let source = owner.queue;
                let source_fences = fences.get(source)?;

                if desc.shareable {
                    // Promote / decay handoff, only the queue order needs to be established
                    self.add_wait(queue, source, owner.fence_value, source_fences);
                    return Ok(Self::make_owned(queue, state, exclusive));
                }

                let wait_fence = if owner.state.is_common() {
                    owner.fence_value
                } else {
                    self.push_source_barrier(source, Barrier::new(resource, subresources, owner.state, ResourceState::COMMON))?;
                    source_fences.current
                };
                self.add_wait(queue, source, wait_fence, source_fences);

                if !state.is_common() {
                    self.push_destination_barrier(queue, Barrier::new(resource, subresources, ResourceState::COMMON, state))?;
                }
                Ok(CurrentState::new_exclusive(state, queue, 0))
            }

            CurrentState::Shared(shared) => {
                debug_assert!(desc.shareable, "Shared state on a non shareable resource");

                let before = shared.get(queue).map(|access| access.state).unwrap_or(ResourceState::COMMON);

                if !exclusive {
                    let target = if before.implies(state) {
                        before
                    } else if before.can_accumulate(state) && !desired.flags.contains(TransitionFlags::NO_ACCUMULATE) {
                        before | state
                    } else {
                        state
                    };

                    let mut result = *shared;
                    result.set(queue, SharedAccess { state: target, fence_value: 0 });
                    return Ok(CurrentState::Shared(result));
                }

                // A writer must not run concurrently with any reader on another queue
                for (reader, access) in shared.iter() {
                    if reader != queue {
                        let reader_fences = fences.get(reader)?;
                        self.add_wait(queue, reader, access.fence_value, reader_fences);
                    }
                }

                if !before.is_common() && before != state {
                    self.push_destination_barrier(queue, Barrier::new(resource, subresources, before, state))?;
                }
                Ok(CurrentState::new_exclusive(state, queue, 0))
            }
        }
    }

    fn make_owned(queue: QueueType, state: ResourceState, exclusive: bool) -> CurrentState {
        if exclusive {
            CurrentState::new_exclusive(state, queue, 0)
        } else {
            CurrentState::new_shared(queue, state, 0)
        }
    }
}

fn push_checked<T>(vec: &mut Vec<T>, value: T) -> Result<(), TransitionError> {
    vec.try_reserve(1)?;
    vec.push(value);
    Ok(())
}
