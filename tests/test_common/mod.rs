#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gpu_coordinator::prelude::*;
use gpu_coordinator::residency::{DeviceError, MemoryBudgetInfo, MemorySegment, ResidencyDevice};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    Barriers(QueueType, Vec<Barrier>),
    Wait(QueueType, QueueType, u64),
    Flush(QueueType),
}

/// A queue that appends everything it is asked to do to a log shared with other queues.
pub struct RecordingQueue {
    queue_type: QueueType,
    current: u64,
    completed: u64,
    pending: bool,
    log: Arc<Mutex<Vec<Event>>>,
}

impl RecordingQueue {
    pub fn new(queue_type: QueueType, log: Arc<Mutex<Vec<Event>>>) -> Self {
        Self {
            queue_type,
            current: 1,
            completed: 0,
            pending: false,
            log,
        }
    }

    /// Simulates the device catching up with everything submitted so far.
    pub fn complete_all(&mut self) {
        self.completed = self.current - 1;
    }

    pub fn record_draw(&mut self) {
        self.pending = true;
    }
}

impl HardwareQueue for RecordingQueue {
    fn current_fence_value(&self) -> u64 {
        self.current
    }

    fn completed_fence_value(&self) -> u64 {
        self.completed
    }

    fn submit_barriers(&mut self, barriers: &[Barrier]) {
        self.pending = true;
        self.log.lock().unwrap().push(Event::Barriers(self.queue_type, barriers.to_vec()));
    }

    fn insert_queue_wait(&mut self, queue: QueueType, fence_value: u64) {
        self.log.lock().unwrap().push(Event::Wait(self.queue_type, queue, fence_value));
    }

    fn flush(&mut self) {
        self.current += 1;
        self.pending = false;
        self.log.lock().unwrap().push(Event::Flush(self.queue_type));
    }

    fn has_pending_commands(&self) -> bool {
        self.pending
    }
}

pub struct Device {
    pub graphics: RecordingQueue,
    pub compute: RecordingQueue,
    pub copy: RecordingQueue,
    pub log: Arc<Mutex<Vec<Event>>>,
}

impl Device {
    pub fn new() -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        Self {
            graphics: RecordingQueue::new(QueueType::Graphics, log.clone()),
            compute: RecordingQueue::new(QueueType::Compute, log.clone()),
            copy: RecordingQueue::new(QueueType::Copy, log.clone()),
            log,
        }
    }

    pub fn queues(&mut self) -> Queues<'_> {
        Queues::new()
            .with_queue(QueueType::Graphics, &mut self.graphics)
            .with_queue(QueueType::Compute, &mut self.compute)
            .with_queue(QueueType::Copy, &mut self.copy)
    }

    pub fn take_log(&self) -> Vec<Event> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PagingEvent {
    MakeResident(Vec<AllocationHandle>, u64),
    Evict(Vec<AllocationHandle>),
}

/// A paging device with a fixed local budget. Usage is tracked from the calls it receives.
pub struct PagingDevice {
    budget: u64,
    sizes: Mutex<HashMap<AllocationHandle, (u64, bool)>>,
    events: Mutex<Vec<PagingEvent>>,
}

impl PagingDevice {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            sizes: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn allocate(&self, raw: u64, size: u64) -> AllocationHandle {
        let handle = AllocationHandle::from_raw(raw);
        self.sizes.lock().unwrap().insert(handle, (size, true));
        handle
    }

    pub fn is_resident(&self, handle: AllocationHandle) -> bool {
        self.sizes.lock().unwrap().get(&handle).map_or(false, |(_, resident)| *resident)
    }

    pub fn take_events(&self) -> Vec<PagingEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    fn set_resident(&self, allocations: &[AllocationHandle], resident: bool) {
        let mut sizes = self.sizes.lock().unwrap();
        for allocation in allocations {
            if let Some(entry) = sizes.get_mut(allocation) {
                entry.1 = resident;
            }
        }
    }
}

impl ResidencyDevice for PagingDevice {
    fn enqueue_make_resident(&self, allocations: &[AllocationHandle], paging_fence_value: u64) -> Result<(), DeviceError> {
        self.set_resident(allocations, true);
        self.events.lock().unwrap().push(PagingEvent::MakeResident(allocations.to_vec(), paging_fence_value));
        Ok(())
    }

    fn evict(&self, allocations: &[AllocationHandle]) -> Result<(), DeviceError> {
        self.set_resident(allocations, false);
        self.events.lock().unwrap().push(PagingEvent::Evict(allocations.to_vec()));
        Ok(())
    }

    fn query_memory_budget(&self, segment: MemorySegment) -> MemoryBudgetInfo {
        match segment {
            MemorySegment::Local => {
                let usage = self.sizes.lock().unwrap().values().filter(|(_, resident)| *resident).map(|(size, _)| *size).sum();
                MemoryBudgetInfo::new(usage, self.budget)
            }
            MemorySegment::NonLocal => MemoryBudgetInfo::new(0, 0),
        }
    }
}

/// Fences of the device as seen by the residency manager. Waiting completes the fence immediately.
pub struct Fences {
    values: Mutex<PerQueue<(u64, u64)>>,
    waits: Mutex<Vec<(QueueType, u64)>>,
}

impl Fences {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(PerQueue::splat((1, 0))),
            waits: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, queue: QueueType, current: u64, completed: u64) {
        self.values.lock().unwrap()[queue] = (current, completed);
    }

    /// Mirrors the fence values of a queue.
    pub fn sync(&self, queue_type: QueueType, queue: &dyn HardwareQueue) {
        self.set(queue_type, queue.current_fence_value(), queue.completed_fence_value());
    }

    pub fn take_waits(&self) -> Vec<(QueueType, u64)> {
        std::mem::take(&mut *self.waits.lock().unwrap())
    }
}

impl FenceMonitor for Fences {
    fn current_fence_value(&self, queue: QueueType) -> u64 {
        self.values.lock().unwrap()[queue].0
    }

    fn completed_fence_value(&self, queue: QueueType) -> u64 {
        self.values.lock().unwrap()[queue].1
    }

    fn wait_for_fence(&self, queue: QueueType, fence_value: u64) {
        let mut values = self.values.lock().unwrap();
        let entry = &mut values[queue];
        entry.1 = entry.1.max(fence_value);
        self.waits.lock().unwrap().push((queue, fence_value));
    }
}
