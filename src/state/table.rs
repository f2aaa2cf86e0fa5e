use crate::queue::{PerQueue, QueueType};

use super::resource_state::{ResourceState, TransitionFlags};
use super::subresource::{ResourceDesc, SubresourceRange, SubresourceTable};

/// A subresource owned by a single queue type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ExclusiveState {
    pub state: ResourceState,
    pub queue: QueueType,

    /// The fence value of `queue` at which the ownership was established or last used.
    pub fence_value: u64,
}

/// The read state a single queue holds on a shared subresource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SharedAccess {
    pub state: ResourceState,
    pub fence_value: u64,
}

/// A subresource of a shareable resource that may be read by multiple queue types at once.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct SharedState {
    accesses: PerQueue<Option<SharedAccess>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(queue: QueueType, access: SharedAccess) -> Self {
        let mut result = Self::new();
        result.set(queue, access);
        result
    }

    pub fn get(&self, queue: QueueType) -> Option<&SharedAccess> {
        self.accesses[queue].as_ref()
    }

    pub fn set(&mut self, queue: QueueType, access: SharedAccess) {
        debug_assert!(!access.state.is_write(), "Shared subresources may only hold read states");
        self.accesses[queue] = Some(access);
    }

    /// Iterates all queues holding a shared read.
    pub fn iter(&self) -> impl Iterator<Item=(QueueType, &SharedAccess)> {
        self.accesses.iter().filter_map(|(queue, access)| access.as_ref().map(|access| (queue, access)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// The state the hardware actually holds for a subresource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CurrentState {
    /// Not owned by any queue. Every resource starts in this state.
    Common,
    Exclusive(ExclusiveState),
    Shared(SharedState),
}

impl CurrentState {
    pub fn new_exclusive(state: ResourceState, queue: QueueType, fence_value: u64) -> Self {
        Self::Exclusive(ExclusiveState { state, queue, fence_value })
    }

    pub fn new_shared(queue: QueueType, state: ResourceState, fence_value: u64) -> Self {
        Self::Shared(SharedState::single(queue, SharedAccess { state, fence_value }))
    }

    /// Returns the state the subresource is in when used on `queue`.
    pub fn get_state_on(&self, queue: QueueType) -> ResourceState {
        match self {
            CurrentState::Common => ResourceState::COMMON,
            CurrentState::Exclusive(exclusive) => {
                if exclusive.queue == queue {
                    exclusive.state
                } else {
                    ResourceState::COMMON
                }
            }
            CurrentState::Shared(shared) => shared.get(queue).map(|access| access.state).unwrap_or(ResourceState::COMMON),
        }
    }

    pub fn get_exclusive(&self) -> Option<&ExclusiveState> {
        match self {
            CurrentState::Exclusive(exclusive) => Some(exclusive),
            _ => None,
        }
    }

    pub fn get_shared(&self) -> Option<&SharedState> {
        match self {
            CurrentState::Shared(shared) => Some(shared),
            _ => None,
        }
    }

    /// Checks the ownership invariants. Writers are always exclusive and shared state only exists
    /// for shareable resources.
    pub fn is_valid_for(&self, desc: &ResourceDesc) -> bool {
        match self {
            CurrentState::Common => true,
            CurrentState::Exclusive(_) => true,
            CurrentState::Shared(shared) => desc.shareable && shared.iter().all(|(_, access)| !access.state.is_write()),
        }
    }
}

impl Default for CurrentState {
    fn default() -> Self {
        CurrentState::Common
    }
}

/// A requested state for a subresource that has not been applied yet.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct DesiredState {
    pub state: ResourceState,
    pub queue: QueueType,
    pub flags: TransitionFlags,
}

impl DesiredState {
    pub fn new(state: ResourceState, queue: QueueType, flags: TransitionFlags) -> Self {
        Self { state, queue, flags }
    }

    /// Returns true if this request must take exclusive ownership of a subresource.
    pub fn requires_exclusive(&self, desc: &ResourceDesc) -> bool {
        !desc.shareable || self.state.is_write() || self.flags.contains(TransitionFlags::EXCLUSIVE)
    }
}

/// How a resource is currently attached to the graphics pipeline.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct BindingState {
    /// The union of the states required by all bind points the resource is attached to.
    pub bound: ResourceState,

    /// The bound state every subresource was last confirmed to satisfy.
    pub asserted: ResourceState,
}

impl BindingState {
    pub fn is_dirty(&self) -> bool {
        self.bound != self.asserted
    }
}

/// The current and desired state records of a single resource.
pub struct ResourceStateTable {
    desc: ResourceDesc,
    current: SubresourceTable<CurrentState>,
    desired: SubresourceTable<Option<DesiredState>>,
    binding: BindingState,
    in_worklist: bool,
}

impl ResourceStateTable {
    pub fn new(desc: ResourceDesc) -> Self {
        Self {
            desc,
            current: SubresourceTable::new(CurrentState::Common),
            desired: SubresourceTable::new(None),
            binding: BindingState::default(),
            in_worklist: false,
        }
    }

    pub fn get_desc(&self) -> &ResourceDesc {
        &self.desc
    }

    pub fn get_subresource_count(&self) -> u32 {
        self.desc.get_subresource_count()
    }

    pub fn get_current_state(&self, subresource: u32) -> &CurrentState {
        self.current.get(subresource)
    }

    pub fn get_shared_state(&self, subresource: u32) -> Option<&SharedState> {
        self.current.get(subresource).get_shared()
    }

    pub fn get_desired_state(&self, subresource: u32) -> Option<&DesiredState> {
        self.desired.get(subresource).as_ref()
    }

    pub fn get_current_table(&self) -> &SubresourceTable<CurrentState> {
        &self.current
    }

    pub fn get_desired_table(&self) -> &SubresourceTable<Option<DesiredState>> {
        &self.desired
    }

    pub fn get_binding_state(&self) -> &BindingState {
        &self.binding
    }

    pub fn is_current_uniform(&self) -> bool {
        self.current.is_uniform()
    }

    /// Records a desired state for every subresource. This is a full resource reset of the desired
    /// table and collapses it.
    pub fn set_desired_state(&mut self, desired: DesiredState) {
        self.desired.set_all(Some(desired));
    }

    pub fn set_desired_subresource_state(&mut self, subresource: u32, desired: DesiredState) {
        let count = self.get_subresource_count();
        self.desired.set(count, subresource, Some(desired));
    }

    pub fn set_desired_range_state(&mut self, range: &SubresourceRange, desired: DesiredState) {
        if range.covers(&self.desc) {
            self.set_desired_state(desired);
            return;
        }

        let count = self.get_subresource_count();
        let desc = self.desc;
        let entries = self.desired.expand(count);
        for subresource in range.iter_indices(&desc) {
            entries[subresource as usize] = Some(desired);
        }
    }

    pub fn has_desired_state(&self) -> bool {
        match &self.desired {
            SubresourceTable::Uniform(desired) => desired.is_some(),
            SubresourceTable::PerSubresource(entries) => entries.iter().any(Option::is_some),
        }
    }

    /// Updates the bound state. Deferred entries synthesized for the previous binding are dropped.
    pub(crate) fn set_bound_state(&mut self, bound: ResourceState) {
        let previous = self.binding.bound;
        if previous == bound {
            return;
        }
        self.binding.bound = bound;

        if previous.is_common() {
            return;
        }
        let stale = Some(DesiredState::new(previous, QueueType::Graphics, TransitionFlags::DEFER_TO_DRAW));
        match &mut self.desired {
            SubresourceTable::Uniform(entry) => {
                if *entry == stale {
                    *entry = None;
                }
            }
            SubresourceTable::PerSubresource(entries) => {
                for entry in entries.iter_mut().filter(|entry| **entry == stale) {
                    *entry = None;
                }
            }
        }
        self.desired.try_collapse();
    }

    /// Returns the deferred graphics queue request needed to bring a subresource in `current` into
    /// the bound state. None if nothing is bound or the bound state is already satisfied.
    pub fn get_binding_transition(&self, current: &CurrentState) -> Option<DesiredState> {
        let bound = self.binding.bound;
        if bound.is_common() || current.get_state_on(QueueType::Graphics).implies(bound) {
            None
        } else {
            Some(DesiredState::new(bound, QueueType::Graphics, TransitionFlags::DEFER_TO_DRAW))
        }
    }

    /// Stores deferred desired entries for every subresource without a explicit request that does
    /// not satisfy the bound state. The binding is only marked as asserted once every subresource
    /// satisfies it.
    ///
    /// Must only be called after the current states of a pass have been committed.
    pub(crate) fn refresh_binding_transitions(&mut self) {
        let bound = self.binding.bound;
        if bound.is_common() {
            self.binding.asserted = bound;
            return;
        }

        let uniform = match (self.current.get_uniform(), self.desired.get_uniform()) {
            (Some(current), Some(None)) => Some(self.get_binding_transition(current)),
            _ => None,
        };

        let mut satisfied = true;
        if let Some(transition) = uniform {
            if let Some(desired) = transition {
                self.desired.set_all(Some(desired));
                satisfied = false;
            }
        } else {
            let count = self.get_subresource_count();
            for subresource in 0..count {
                if self.desired.get(subresource).is_some() {
                    satisfied = false;
                    continue;
                }
                if let Some(desired) = self.get_binding_transition(self.current.get(subresource)) {
                    self.desired.set(count, subresource, Some(desired));
                    satisfied = false;
                }
            }
            self.desired.try_collapse();
        }

        if satisfied {
            self.binding.asserted = bound;
        }
    }

    pub(crate) fn is_in_worklist(&self) -> bool {
        self.in_worklist
    }

    pub(crate) fn set_in_worklist(&mut self, in_worklist: bool) {
        self.in_worklist = in_worklist;
    }

    /// Replaces the current state of every subresource and clears the matching desired entries.
    pub(crate) fn commit_all(&mut self, state: CurrentState) {
        debug_assert!(state.is_valid_for(&self.desc));
        self.current.set_all(state);
        self.desired.set_all(None);
    }

    /// Replaces the current state of one subresource and clears its desired entry.
    pub(crate) fn commit_subresource(&mut self, subresource: u32, state: CurrentState) {
        debug_assert!(state.is_valid_for(&self.desc));
        let count = self.get_subresource_count();
        self.current.set(count, subresource, state);
        self.desired.set(count, subresource, None);
    }

    /// Re-collapses the current and desired tables if all subresources agree again.
    pub(crate) fn try_collapse(&mut self) {
        self.current.try_collapse();
        self.desired.try_collapse();
    }
}
