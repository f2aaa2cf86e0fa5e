//! Converts desired subresource states into barriers, cross queue waits and flushes.
//!
//! Call sites record the state they need a resource in through [`TransitionPlanner::transition_resource`]
//! and friends. Nothing is submitted until [`TransitionPlanner::apply_all_resource_transitions`]
//! is called right before a command batch is recorded. That pass plans every resource on the
//! worklist, submits the result to the [`Queues`] and only then updates the current states.

mod barrier;
mod plan;

use std::collections::TryReserveError;
use std::fmt::{Display, Formatter};

use crate::queue::{QueueType, Queues};
use crate::state::{CurrentState, DesiredState, ResourceDesc, ResourceState, ResourceStateTable, SharedState, SubresourceRange, TransitionFlags};
use crate::util::id::ResourceId;

pub use barrier::{Barrier, Subresources};
pub use plan::{QueueFences, StateUpdate, TransitionPlan};

use plan::FenceSnapshot;

#[derive(Debug)]
pub enum TransitionError {
    UnknownResource(ResourceId),
    SubresourceOutOfRange(ResourceId),
    QueueUnavailable(QueueType),
    InvalidDesc(ResourceDesc),
    OutOfMemory,
}

impl From<TryReserveError> for TransitionError {
    fn from(_: TryReserveError) -> Self {
        TransitionError::OutOfMemory
    }
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::UnknownResource(id) => write!(f, "Unknown resource {:?}", id),
            TransitionError::SubresourceOutOfRange(id) => write!(f, "Subresource out of range for resource {:?}", id),
            TransitionError::QueueUnavailable(queue) => write!(f, "Queue {} is not available", queue.as_str()),
            TransitionError::InvalidDesc(desc) => write!(f, "Invalid resource description {:?}", desc),
            TransitionError::OutOfMemory => f.write_str("Out of memory"),
        }
    }
}

impl std::error::Error for TransitionError {
}

/// Counts of the work issued by a single apply pass.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct ApplyStats {
    pub barriers: usize,
    pub waits: usize,
    pub flushes: usize,
    pub updates: usize,
}

struct ResourceSlot {
    generation: u32,
    table: Option<ResourceStateTable>,
}

/// Owns the state tables of all registered resources and the worklist of resources with pending
/// desired states.
pub struct TransitionPlanner {
    slots: Vec<ResourceSlot>,
    free_slots: Vec<u32>,
    worklist: Vec<ResourceId>,
    plan: TransitionPlan,
}

impl Default for TransitionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionPlanner {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            worklist: Vec::new(),
            plan: TransitionPlan::new(),
        }
    }

    /// Starts tracking a resource. Every subresource starts in the common state.
    pub fn register_resource(&mut self, desc: ResourceDesc) -> Result<ResourceId, TransitionError> {
        if !desc.is_valid() {
            log::error!("Rejected invalid resource description {:?}", desc);
            return Err(TransitionError::InvalidDesc(desc));
        }

        let table = ResourceStateTable::new(desc);
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = ResourceId::next_generation(slot.generation);
            slot.table = Some(table);
            Ok(ResourceId::new(index, slot.generation))
        } else {
            self.slots.try_reserve(1)?;
            let index = self.slots.len() as u32;
            self.slots.push(ResourceSlot { generation: 1, table: Some(table) });
            Ok(ResourceId::new(index, 1))
        }
    }

    /// Stops tracking a resource. Pending desired states are dropped.
    pub fn unregister_resource(&mut self, id: ResourceId) -> Result<(), TransitionError> {
        let table = self.get_slot_mut(id)?.table.take();
        if let Some(table) = table {
            if table.is_in_worklist() {
                self.worklist.retain(|entry| *entry != id);
            }
        }
        self.free_slots.push(id.get_index());
        Ok(())
    }

    pub fn get_resource(&self, id: ResourceId) -> Result<&ResourceStateTable, TransitionError> {
        self.slots.get(id.get_index() as usize)
            .filter(|slot| slot.generation == id.get_generation())
            .and_then(|slot| slot.table.as_ref())
            .ok_or(TransitionError::UnknownResource(id))
    }

    pub fn get_current_state(&self, id: ResourceId, subresource: u32) -> Result<&CurrentState, TransitionError> {
        let table = self.get_resource(id)?;
        Self::check_subresource(id, table, subresource)?;
        Ok(table.get_current_state(subresource))
    }

    pub fn get_shared_state(&self, id: ResourceId, subresource: u32) -> Result<Option<&SharedState>, TransitionError> {
        let table = self.get_resource(id)?;
        Self::check_subresource(id, table, subresource)?;
        Ok(table.get_shared_state(subresource))
    }

    pub fn get_desired_state(&self, id: ResourceId, subresource: u32) -> Result<Option<&DesiredState>, TransitionError> {
        let table = self.get_resource(id)?;
        Self::check_subresource(id, table, subresource)?;
        Ok(table.get_desired_state(subresource))
    }

    /// Requests every subresource of a resource to be in `state` on `queue` the next time
    /// transitions are applied.
    pub fn transition_resource(&mut self, id: ResourceId, state: ResourceState, queue: QueueType, flags: TransitionFlags) -> Result<(), TransitionError> {
        self.worklist.try_reserve(1)?;
        let table = self.get_table_mut(id)?;
        table.set_desired_state(DesiredState::new(state, queue, flags));
        self.push_worklist(id);
        Ok(())
    }

    pub fn transition_subresource(&mut self, id: ResourceId, subresource: u32, state: ResourceState, queue: QueueType, flags: TransitionFlags) -> Result<(), TransitionError> {
        self.worklist.try_reserve(1)?;
        let table = self.get_table_mut(id)?;
        Self::check_subresource(id, table, subresource)?;
        table.set_desired_subresource_state(subresource, DesiredState::new(state, queue, flags));
        self.push_worklist(id);
        Ok(())
    }

    pub fn transition_subresources(&mut self, id: ResourceId, range: &SubresourceRange, state: ResourceState, queue: QueueType, flags: TransitionFlags) -> Result<(), TransitionError> {
        self.worklist.try_reserve(1)?;
        let table = self.get_table_mut(id)?;
        if !range.fits(table.get_desc()) {
            return Err(TransitionError::SubresourceOutOfRange(id));
        }
        if range.is_empty() {
            return Ok(());
        }
        table.set_desired_range_state(range, DesiredState::new(state, queue, flags));
        self.push_worklist(id);
        Ok(())
    }

    /// Reports the union of the states required by the bind points a resource is currently
    /// attached to. Changes are turned into deferred graphics queue transitions that resolve on the
    /// next draw preparation pass.
    pub fn set_binding_state(&mut self, id: ResourceId, bound: ResourceState) -> Result<(), TransitionError> {
        self.worklist.try_reserve(1)?;
        let table = self.get_table_mut(id)?;
        table.set_bound_state(bound);
        if table.get_binding_state().is_dirty() {
            self.push_worklist(id);
        }
        Ok(())
    }

    pub fn has_pending_transitions(&self) -> bool {
        !self.worklist.is_empty()
    }

    pub fn get_worklist(&self) -> &[ResourceId] {
        &self.worklist
    }

    /// Plans and submits all pending transitions.
    ///
    /// Deferred entries are only resolved if `is_pre_draw` is true, otherwise they stay on the
    /// worklist. Work is submitted in the order source barriers, flushes, waits, destination
    /// barriers. The current states are updated afterwards.
    ///
    /// If planning fails nothing is submitted and no state table is changed.
    pub fn apply_all_resource_transitions(&mut self, queues: &mut Queues, is_pre_draw: bool) -> Result<ApplyStats, TransitionError> {
        if self.worklist.is_empty() {
            return Ok(ApplyStats::default());
        }

        let fences = FenceSnapshot::capture(queues);
        let mut worklist = std::mem::take(&mut self.worklist);
        let mut plan = std::mem::take(&mut self.plan);
        plan.clear();

        let result = self.plan_all(&worklist, &fences, is_pre_draw, &mut plan);
        if let Err(err) = result {
            self.worklist = worklist;
            self.plan = plan;
            return Err(err);
        }

        Self::submit(queues, &plan);
        self.commit(queues, &plan);

        worklist.retain(|id| {
            match self.get_table_mut(*id) {
                Ok(table) => {
                    table.refresh_binding_transitions();
                    let keep = table.has_desired_state();
                    table.set_in_worklist(keep);
                    keep
                }
                Err(_) => false,
            }
        });
        self.worklist = worklist;

        let stats = ApplyStats {
            barriers: plan.get_barrier_count(),
            waits: plan.get_wait_count(),
            flushes: plan.get_flush_count(),
            updates: plan.get_updates().len(),
        };
        log::trace!("Applied resource transitions (pre draw: {}): {:?}", is_pre_draw, stats);

        self.plan = plan;
        Ok(stats)
    }

    fn plan_all(&self, worklist: &[ResourceId], fences: &FenceSnapshot, is_pre_draw: bool, plan: &mut TransitionPlan) -> Result<(), TransitionError> {
        for id in worklist.iter().copied() {
            let table = match self.get_resource(id) {
                Ok(table) => table,
                Err(_) => continue,
            };
            Self::plan_resource(id, table, fences, is_pre_draw, plan)?;
        }
        Ok(())
    }

    fn plan_resource(id: ResourceId, table: &ResourceStateTable, fences: &FenceSnapshot, is_pre_draw: bool, plan: &mut TransitionPlan) -> Result<(), TransitionError> {
        let desc = *table.get_desc();

        // Whole resource transitions are planned with a single barrier
        if let (Some(current), Some(desired)) = (table.get_current_table().get_uniform(), table.get_desired_table().get_uniform()) {
            if let Some(desired) = (*desired).or_else(|| table.get_binding_transition(current)) {
                if desired.flags.is_eligible(is_pre_draw) {
                    let state = plan.plan_subresource(id, Subresources::All, &desc, current, &desired, fences)?;
                    plan.push_update(StateUpdate { resource: id, subresources: Subresources::All, state, queue: desired.queue })?;
                }
            }
            return Ok(());
        }

        for subresource in 0..desc.get_subresource_count() {
            let current = table.get_current_state(subresource);
            let desired = match table.get_desired_state(subresource).copied().or_else(|| table.get_binding_transition(current)) {
                Some(desired) if desired.flags.is_eligible(is_pre_draw) => desired,
                _ => continue,
            };
            let subresources = Subresources::Index(subresource);
            let state = plan.plan_subresource(id, subresources, &desc, current, &desired, fences)?;
            plan.push_update(StateUpdate { resource: id, subresources, state, queue: desired.queue })?;
        }
        Ok(())
    }

    fn submit(queues: &mut Queues, plan: &TransitionPlan) {
        for queue_type in QueueType::ALL {
            let barriers = plan.get_source_barriers(queue_type);
            if !barriers.is_empty() {
                if let Some(queue) = queues.get_mut(queue_type) {
                    queue.submit_barriers(barriers);
                }
            }
        }

        for queue_type in QueueType::ALL {
            if plan.is_flushed(queue_type) {
                if let Some(queue) = queues.get_mut(queue_type) {
                    queue.flush();
                }
            }
        }

        for (destination, source, fence_value) in plan.iter_waits() {
            if let Some(queue) = queues.get_mut(destination) {
                queue.insert_queue_wait(source, fence_value);
            }
        }

        for queue_type in QueueType::ALL {
            let barriers = plan.get_destination_barriers(queue_type);
            if !barriers.is_empty() {
                if let Some(queue) = queues.get_mut(queue_type) {
                    queue.submit_barriers(barriers);
                }
            }
        }
    }

    fn commit(&mut self, queues: &Queues, plan: &TransitionPlan) {
        for update in plan.get_updates() {
            let fence_value = queues.get(update.queue).map(|queue| queue.current_fence_value()).unwrap_or(0);
            let state = update.stamped(fence_value);

            if let Ok(table) = self.get_table_mut(update.resource) {
                match update.subresources {
                    Subresources::All => table.commit_all(state),
                    Subresources::Index(subresource) => table.commit_subresource(subresource, state),
                }
            }
        }

        for update in plan.get_updates() {
            if let Ok(table) = self.get_table_mut(update.resource) {
                table.try_collapse();
            }
        }
    }

    fn push_worklist(&mut self, id: ResourceId) {
        if let Ok(table) = self.get_table_mut(id) {
            if table.is_in_worklist() {
                return;
            }
            table.set_in_worklist(true);
            self.worklist.push(id);
        }
    }

    fn check_subresource(id: ResourceId, table: &ResourceStateTable, subresource: u32) -> Result<(), TransitionError> {
        if subresource < table.get_subresource_count() {
            Ok(())
        } else {
            Err(TransitionError::SubresourceOutOfRange(id))
        }
    }

    fn get_slot_mut(&mut self, id: ResourceId) -> Result<&mut ResourceSlot, TransitionError> {
        self.slots.get_mut(id.get_index() as usize)
            .filter(|slot| slot.generation == id.get_generation() && slot.table.is_some())
            .ok_or(TransitionError::UnknownResource(id))
    }

    fn get_table_mut(&mut self, id: ResourceId) -> Result<&mut ResourceStateTable, TransitionError> {
        self.get_slot_mut(id)?.table.as_mut().ok_or(TransitionError::UnknownResource(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::queue::HardwareQueue;
    use crate::state::{BindingState, SharedAccess};
    use crate::util::test::{EventLog, MockQueue, QueueEvent};
    use super::*;

    const PSR: ResourceState = ResourceState::PIXEL_SHADER_RESOURCE;
    const RT: ResourceState = ResourceState::RENDER_TARGET;

    struct MockQueues {
        graphics: MockQueue,
        compute: MockQueue,
        copy: MockQueue,
    }

    impl MockQueues {
        fn new(events: &EventLog) -> Self {
            Self {
                graphics: MockQueue::new(QueueType::Graphics, events.clone()),
                compute: MockQueue::new(QueueType::Compute, events.clone()),
                copy: MockQueue::new(QueueType::Copy, events.clone()),
            }
        }

        fn queues(&mut self) -> Queues {
            Queues::new()
                .with_queue(QueueType::Graphics, &mut self.graphics)
                .with_queue(QueueType::Compute, &mut self.compute)
                .with_queue(QueueType::Copy, &mut self.copy)
        }
    }

    fn barrier(id: ResourceId, subresources: Subresources, before: ResourceState, after: ResourceState) -> Barrier {
        Barrier::new(id, subresources, before, after)
    }

    #[test]
    fn test_read_to_write_same_queue() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);
        mock.graphics.set_fences(5, 4);

        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_texture(1, 1, 1)).unwrap();
        planner.transition_resource(id, PSR, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        events.clear();

        planner.transition_resource(id, RT, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        let stats = planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();

        assert_eq!(events.take(), vec![QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::All, PSR, RT)])]);
        assert_eq!(stats.waits, 0);
        assert_eq!(stats.flushes, 0);
        assert_eq!(*planner.get_current_state(id, 0).unwrap(), CurrentState::new_exclusive(RT, QueueType::Graphics, 5));
        assert!(!planner.has_pending_transitions());
    }

    #[test]
    fn test_cross_queue_handoff() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);
        mock.graphics.set_fences(6, 5);
        mock.compute.set_fences(3, 2);

        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_buffer(false)).unwrap();
        planner.transition_resource(id, RT, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        events.clear();

        planner.transition_resource(id, PSR, QueueType::Compute, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();

        assert_eq!(events.take(), vec![
            QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::All, RT, ResourceState::COMMON)]),
            QueueEvent::Flush(QueueType::Graphics),
            QueueEvent::Wait { queue: QueueType::Compute, source: QueueType::Graphics, fence_value: 6 },
            QueueEvent::Barriers(QueueType::Compute, vec![barrier(id, Subresources::All, ResourceState::COMMON, PSR)]),
        ]);
        assert_eq!(mock.graphics.current_fence_value(), 7);
        assert_eq!(*planner.get_current_state(id, 0).unwrap(), CurrentState::new_exclusive(PSR, QueueType::Compute, 3));
    }

    #[test]
    fn test_shared_read_then_write() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);
        mock.graphics.set_fences(4, 3);
        mock.compute.set_fences(9, 8);
        mock.copy.set_fences(2, 1);

        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_buffer(true)).unwrap();
        planner.transition_resource(id, PSR, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        planner.transition_resource(id, ResourceState::NON_PIXEL_SHADER_RESOURCE, QueueType::Compute, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();

        // Both reads are shared without any barrier or wait
        assert!(events.take().is_empty());
        let shared = *planner.get_shared_state(id, 0).unwrap().unwrap();
        assert_eq!(shared.get(QueueType::Graphics), Some(&SharedAccess { state: PSR, fence_value: 4 }));
        assert_eq!(shared.get(QueueType::Compute), Some(&SharedAccess { state: ResourceState::NON_PIXEL_SHADER_RESOURCE, fence_value: 9 }));

        mock.graphics.record_commands();
        mock.compute.set_fences(10, 9);
        planner.transition_resource(id, ResourceState::COPY_DEST, QueueType::Copy, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();

        // The compute read has completed, the graphics read is still being recorded
        assert_eq!(events.take(), vec![
            QueueEvent::Flush(QueueType::Graphics),
            QueueEvent::Wait { queue: QueueType::Copy, source: QueueType::Graphics, fence_value: 4 },
        ]);
        assert_eq!(*planner.get_current_state(id, 0).unwrap(), CurrentState::new_exclusive(ResourceState::COPY_DEST, QueueType::Copy, 2));
    }

    #[test]
    fn test_deferred_binding_resolves_on_draw() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);

        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_texture(1, 1, 1)).unwrap();

        planner.set_binding_state(id, PSR).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        planner.set_binding_state(id, PSR).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        planner.set_binding_state(id, PSR).unwrap();
        assert!(events.take().is_empty());
        assert!(planner.has_pending_transitions());

        planner.apply_all_resource_transitions(&mut mock.queues(), true).unwrap();
        assert_eq!(events.take(), vec![QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::All, ResourceState::COMMON, PSR)])]);
        assert!(!planner.has_pending_transitions());

        // Rebinding the same state again is not a change
        planner.set_binding_state(id, PSR).unwrap();
        assert!(!planner.has_pending_transitions());
    }

    #[test]
    fn test_read_accumulation_is_idempotent() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);

        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_buffer(false)).unwrap();
        planner.transition_resource(id, PSR, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        planner.transition_resource(id, ResourceState::COPY_SOURCE, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        events.clear();

        for state in [PSR, ResourceState::COPY_SOURCE, PSR | ResourceState::COPY_SOURCE] {
            planner.transition_resource(id, state, QueueType::Graphics, TransitionFlags::empty()).unwrap();
            let stats = planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
            assert_eq!(stats.barriers, 0);
        }
        assert!(events.take().is_empty());
        assert_eq!(planner.get_current_state(id, 0).unwrap().get_state_on(QueueType::Graphics), PSR | ResourceState::COPY_SOURCE);
    }

    #[test]
    fn test_subresource_transitions_collapse_again() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);

        let mut planner = TransitionPlanner::new();
        let desc = ResourceDesc::new_texture(2, 2, 1);
        let id = planner.register_resource(desc).unwrap();

        planner.transition_subresource(id, 1, ResourceState::COPY_DEST, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        assert!(!planner.get_resource(id).unwrap().is_current_uniform());
        assert_eq!(events.take(), vec![QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::Index(1), ResourceState::COMMON, ResourceState::COPY_DEST)])]);

        let rest = [0, 2, 3];
        for subresource in rest {
            planner.transition_subresource(id, subresource, ResourceState::COPY_DEST, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        }
        let stats = planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        assert_eq!(stats.barriers, 3);
        assert!(planner.get_resource(id).unwrap().is_current_uniform());
        assert!(planner.get_resource(id).unwrap().get_desired_table().is_uniform());

        // Collapsed resources transition with a single whole resource barrier
        planner.transition_resource(id, PSR, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        let events = events.take();
        assert_eq!(events.last(), Some(&QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::All, ResourceState::COPY_DEST, PSR)])));
    }

    #[test]
    fn test_subresource_range() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);

        let mut planner = TransitionPlanner::new();
        let desc = ResourceDesc::new_texture(3, 2, 1);
        let id = planner.register_resource(desc).unwrap();

        let range = SubresourceRange::new(1, 2, 1, 1, 0, 1);
        planner.transition_subresources(id, &range, ResourceState::COPY_SOURCE, QueueType::Copy, TransitionFlags::empty()).unwrap();
        let stats = planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        assert_eq!(stats.barriers, 2);

        for subresource in 0..6 {
            let expected = if subresource == 4 || subresource == 5 { ResourceState::COPY_SOURCE } else { ResourceState::COMMON };
            assert_eq!(planner.get_current_state(id, subresource).unwrap().get_state_on(QueueType::Copy), expected);
        }

        let out_of_range = SubresourceRange::new(2, 2, 0, 1, 0, 1);
        assert!(matches!(
            planner.transition_subresources(id, &out_of_range, ResourceState::COPY_SOURCE, QueueType::Copy, TransitionFlags::empty()),
            Err(TransitionError::SubresourceOutOfRange(_))
        ));
    }

    #[test]
    fn test_failed_plan_leaves_state_untouched() {
        let events = EventLog::default();
        let mut graphics = MockQueue::new(QueueType::Graphics, events.clone());

        let mut planner = TransitionPlanner::new();
        let first = planner.register_resource(ResourceDesc::new_buffer(false)).unwrap();
        let second = planner.register_resource(ResourceDesc::new_buffer(false)).unwrap();
        let bound = planner.register_resource(ResourceDesc::new_texture(2, 1, 1)).unwrap();
        planner.transition_resource(first, RT, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.transition_resource(second, PSR, QueueType::Compute, TransitionFlags::empty()).unwrap();
        planner.set_binding_state(bound, PSR).unwrap();

        let mut queues = Queues::new().with_queue(QueueType::Graphics, &mut graphics);
        let result = planner.apply_all_resource_transitions(&mut queues, false);

        assert!(matches!(result, Err(TransitionError::QueueUnavailable(QueueType::Compute))));
        assert!(events.take().is_empty());
        assert_eq!(*planner.get_current_state(first, 0).unwrap(), CurrentState::Common);
        assert_eq!(planner.get_worklist(), &[first, second, bound]);
        assert!(planner.get_desired_state(first, 0).unwrap().is_some());

        let table = planner.get_resource(bound).unwrap();
        assert_eq!(*table.get_binding_state(), BindingState { bound: PSR, asserted: ResourceState::COMMON });
        assert!(!table.has_desired_state());
    }

    #[test]
    fn test_binding_survives_explicit_transition() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);

        let mut planner = TransitionPlanner::default();
        let id = planner.register_resource(ResourceDesc::new_texture(1, 1, 1)).unwrap();
        planner.set_binding_state(id, PSR).unwrap();
        planner.transition_resource(id, ResourceState::COPY_DEST, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        assert_eq!(events.take(), vec![QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::All, ResourceState::COMMON, ResourceState::COPY_DEST)])]);
        assert!(planner.has_pending_transitions());

        planner.apply_all_resource_transitions(&mut mock.queues(), true).unwrap();
        assert_eq!(events.take(), vec![QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::All, ResourceState::COPY_DEST, PSR)])]);
        assert_eq!(planner.get_current_state(id, 0).unwrap().get_state_on(QueueType::Graphics), PSR);
        assert!(!planner.has_pending_transitions());
    }

    #[test]
    fn test_binding_restored_after_copy() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);

        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_texture(1, 1, 1)).unwrap();
        planner.set_binding_state(id, PSR).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), true).unwrap();
        events.clear();

        planner.transition_resource(id, ResourceState::COPY_DEST, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        planner.set_binding_state(id, PSR).unwrap();
        events.clear();

        planner.apply_all_resource_transitions(&mut mock.queues(), true).unwrap();
        assert_eq!(events.take(), vec![QueueEvent::Barriers(QueueType::Graphics, vec![barrier(id, Subresources::All, ResourceState::COPY_DEST, PSR)])]);
        assert!(!planner.has_pending_transitions());
    }

    #[test]
    fn test_unbinding_drops_deferred_transition() {
        let events = EventLog::default();
        let mut mock = MockQueues::new(&events);

        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_texture(1, 1, 1)).unwrap();
        planner.set_binding_state(id, PSR).unwrap();
        planner.apply_all_resource_transitions(&mut mock.queues(), false).unwrap();
        assert!(planner.get_desired_state(id, 0).unwrap().is_some());

        planner.set_binding_state(id, ResourceState::COMMON).unwrap();
        assert!(planner.get_desired_state(id, 0).unwrap().is_none());
        planner.apply_all_resource_transitions(&mut mock.queues(), true).unwrap();
        assert!(events.take().is_empty());
        assert!(!planner.has_pending_transitions());
    }

    #[test]
    fn test_invalid_descriptions_are_rejected() {
        let mut planner = TransitionPlanner::new();
        assert!(matches!(planner.register_resource(ResourceDesc::new_texture(1, 1, 4)), Err(TransitionError::InvalidDesc(_))));
        assert!(matches!(planner.register_resource(ResourceDesc::new_texture(0, 1, 1)), Err(TransitionError::InvalidDesc(_))));
        assert!(planner.register_resource(ResourceDesc::new_texture(1, 1, 3)).is_ok());
    }

    #[test]
    fn test_stale_handles_are_rejected() {
        let mut planner = TransitionPlanner::new();
        let id = planner.register_resource(ResourceDesc::new_buffer(false)).unwrap();
        planner.transition_resource(id, RT, QueueType::Graphics, TransitionFlags::empty()).unwrap();
        planner.unregister_resource(id).unwrap();
        assert!(!planner.has_pending_transitions());

        let reused = planner.register_resource(ResourceDesc::new_buffer(false)).unwrap();
        assert_eq!(reused.get_index(), id.get_index());
        assert_ne!(reused, id);
        assert!(matches!(planner.get_current_state(id, 0), Err(TransitionError::UnknownResource(_))));
        assert!(matches!(planner.unregister_resource(id), Err(TransitionError::UnknownResource(_))));
        assert!(planner.get_current_state(reused, 0).is_ok());
    }
}
