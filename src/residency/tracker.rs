//! Least recently used ordering of the resident managed objects.

use std::time::{Duration, Instant};

use crate::queue::{PerQueue, QueueType};
use crate::util::id::ObjectId;

use super::device::AllocationHandle;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ResidencyStatus {
    Resident,
    Evicted,
}

/// A device allocation whose residency is managed.
#[derive(Clone, Debug)]
pub struct ManagedObject {
    handle: AllocationHandle,
    size: u64,
    status: ResidencyStatus,
    pinned: bool,
    last_used_fences: PerQueue<u64>,
    last_used_time: Instant,
    last_referenced_pass: u64,
}

impl ManagedObject {
    fn new(handle: AllocationHandle, size: u64, now: Instant) -> Self {
        Self {
            handle,
            size,
            status: ResidencyStatus::Resident,
            pinned: false,
            last_used_fences: PerQueue::default(),
            last_used_time: now,
            last_referenced_pass: 0,
        }
    }

    pub fn get_handle(&self) -> AllocationHandle {
        self.handle
    }

    pub fn get_size(&self) -> u64 {
        self.size
    }

    pub fn get_status(&self) -> ResidencyStatus {
        self.status
    }

    pub fn is_resident(&self) -> bool {
        self.status == ResidencyStatus::Resident
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// The fence value of each queue at the time the object was last referenced on it.
    pub fn get_last_used_fences(&self) -> &PerQueue<u64> {
        &self.last_used_fences
    }

    pub fn get_last_used_time(&self) -> Instant {
        self.last_used_time
    }

    /// Returns true if every queue has completed the last use of this object.
    pub fn is_idle(&self, completed: &PerQueue<u64>) -> bool {
        self.last_used_fences.iter().all(|(queue, fence)| *fence <= completed[queue])
    }
}

struct TrackerSlot {
    generation: u32,
    object: Option<ManagedObject>,

    /// The next more recently used object
    prev: Option<u32>,

    /// The next less recently used object
    next: Option<u32>,
}

/// The result of [`ResidencyTracker::trim_to_budget_inclusive`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TrimResult {
    pub freed: u64,

    /// The least recently used object that could have been evicted if the device had completed
    /// its last use.
    pub blocked_on: Option<ObjectId>,
}

/// Stores all managed objects and keeps the resident ones in a intrusive list ordered from most
/// recently used (head) to least recently used (tail).
pub struct ResidencyTracker {
    slots: Vec<TrackerSlot>,
    free_slots: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    resident_size: u64,
    resident_count: usize,
}

impl ResidencyTracker {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            head: None,
            tail: None,
            resident_size: 0,
            resident_count: 0,
        }
    }

    /// Starts tracking a allocation. New allocations are resident and the most recently used
    /// object.
    pub fn begin_tracking(&mut self, handle: AllocationHandle, size: u64, now: Instant) -> ObjectId {
        let object = ManagedObject::new(handle, size, now);

        let index = if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = ObjectId::next_generation(slot.generation);
            slot.object = Some(object);
            index
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(TrackerSlot { generation: 1, object: Some(object), prev: None, next: None });
            index
        };

        self.link_head(index);
        self.resident_size += size;
        self.resident_count += 1;

        ObjectId::new(index, self.slots[index as usize].generation)
    }

    /// Stops tracking a object and returns its last state.
    pub fn end_tracking(&mut self, id: ObjectId) -> Option<ManagedObject> {
        let index = self.find(id)?;
        if self.is_resident_index(index) {
            self.unlink(index);
            self.remove_resident_size(index);
        }

        let object = self.slots[index as usize].object.take();
        self.free_slots.push(index);
        object
    }

    pub fn get(&self, id: ObjectId) -> Option<&ManagedObject> {
        self.find(id).and_then(|index| self.slots[index as usize].object.as_ref())
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.find(id).is_some()
    }

    pub fn set_pinned(&mut self, id: ObjectId, pinned: bool) -> bool {
        match self.get_object_mut(id) {
            Some(object) => {
                object.pinned = pinned;
                true
            }
            None => false,
        }
    }

    /// Marks a evicted object as resident and makes it the most recently used object.
    ///
    /// Returns false if the object was already resident.
    pub fn make_resident(&mut self, id: ObjectId) -> bool {
        let index = match self.find(id) {
            Some(index) if !self.is_resident_index(index) => index,
            _ => return false,
        };

        self.set_status(index, ResidencyStatus::Resident);
        self.link_head(index);
        self.add_resident_size(index);
        true
    }

    /// Marks a resident object as evicted and removes it from the lru list.
    ///
    /// Returns false if the object was not resident.
    pub fn evict(&mut self, id: ObjectId) -> bool {
        match self.find(id) {
            Some(index) if self.is_resident_index(index) => {
                self.evict_index(index);
                true
            }
            _ => false,
        }
    }

    /// Marks a object as resident again placing it at the least recently used end of the list.
    /// Used to undo a eviction decision that was never executed by the device.
    pub fn restore_at_tail(&mut self, id: ObjectId) -> bool {
        let index = match self.find(id) {
            Some(index) if !self.is_resident_index(index) => index,
            _ => return false,
        };

        self.set_status(index, ResidencyStatus::Resident);
        self.link_tail(index);
        self.add_resident_size(index);
        true
    }

    /// Records a use of the object on `queue` and moves it to the head of the lru list.
    pub fn object_referenced(&mut self, id: ObjectId, queue: QueueType, fence_value: u64, now: Instant, pass: u64) -> bool {
        let index = match self.find(id) {
            Some(index) => index,
            None => return false,
        };

        if let Some(object) = self.slots[index as usize].object.as_mut() {
            let fence = &mut object.last_used_fences[queue];
            *fence = (*fence).max(fence_value);
            object.last_used_time = now;
            object.last_referenced_pass = pass;
        }

        if self.is_resident_index(index) && self.head != Some(index) {
            self.unlink(index);
            self.link_head(index);
        }
        true
    }

    /// Evicts objects from the tail of the lru list that have been idle for at least `grace`
    /// until `bytes_to_free` bytes are freed.
    ///
    /// Pinned objects, objects referenced in `pass` and objects the device may still be using
    /// are skipped. Returns the number of freed bytes.
    pub fn trim_aged_allocations(&mut self, now: Instant, grace: Duration, pass: u64, completed: &PerQueue<u64>, bytes_to_free: u64, evicted: &mut Vec<ObjectId>) -> u64 {
        let mut freed = 0u64;
        let mut cursor = self.tail;

        while let Some(index) = cursor {
            if freed >= bytes_to_free {
                break;
            }
            cursor = self.slots[index as usize].prev;

            let object = match self.slots[index as usize].object.as_ref() {
                Some(object) => object,
                None => continue,
            };
            if now.saturating_duration_since(object.last_used_time) < grace {
                // Everything closer to the head was used even more recently
                break;
            }
            if object.pinned || object.last_referenced_pass == pass || !object.is_idle(completed) {
                continue;
            }

            freed += object.size;
            evicted.push(self.get_id(index));
            self.evict_index(index);
        }

        freed
    }

    /// Evicts objects from the tail of the lru list regardless of their age until `bytes_to_free`
    /// bytes are freed.
    ///
    /// Objects the device may still be using are skipped but the least recently used of them is
    /// reported so the caller can wait for it.
    pub fn trim_to_budget_inclusive(&mut self, pass: u64, completed: &PerQueue<u64>, bytes_to_free: u64, evicted: &mut Vec<ObjectId>) -> TrimResult {
        let mut result = TrimResult { freed: 0, blocked_on: None };
        let mut cursor = self.tail;

        while let Some(index) = cursor {
            if result.freed >= bytes_to_free {
                break;
            }
            cursor = self.slots[index as usize].prev;

            let object = match self.slots[index as usize].object.as_ref() {
                Some(object) => object,
                None => continue,
            };
            if object.pinned || object.last_referenced_pass == pass {
                continue;
            }
            if !object.is_idle(completed) {
                if result.blocked_on.is_none() {
                    result.blocked_on = Some(self.get_id(index));
                }
                continue;
            }

            result.freed += object.size;
            evicted.push(self.get_id(index));
            self.evict_index(index);
        }

        result
    }

    pub fn get_head(&self) -> Option<ObjectId> {
        self.head.map(|index| self.get_id(index))
    }

    pub fn get_tail(&self) -> Option<ObjectId> {
        self.tail.map(|index| self.get_id(index))
    }

    /// Iterates all resident objects from most to least recently used.
    pub fn iter(&self) -> LruIter {
        LruIter {
            tracker: self,
            cursor: self.head,
        }
    }

    /// The sum of the sizes of all resident objects.
    pub fn get_resident_size(&self) -> u64 {
        self.resident_size
    }

    pub fn get_resident_count(&self) -> usize {
        self.resident_count
    }

    pub fn get_tracked_count(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }

    fn find(&self, id: ObjectId) -> Option<u32> {
        let index = id.get_index();
        let slot = self.slots.get(index as usize)?;
        if slot.generation == id.get_generation() && slot.object.is_some() {
            Some(index)
        } else {
            None
        }
    }

    fn get_id(&self, index: u32) -> ObjectId {
        ObjectId::new(index, self.slots[index as usize].generation)
    }

    fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut ManagedObject> {
        let index = self.find(id)?;
        self.slots[index as usize].object.as_mut()
    }

    fn is_resident_index(&self, index: u32) -> bool {
        self.slots[index as usize].object.as_ref().map_or(false, ManagedObject::is_resident)
    }

    fn set_status(&mut self, index: u32, status: ResidencyStatus) {
        if let Some(object) = self.slots[index as usize].object.as_mut() {
            object.status = status;
        }
    }

    fn evict_index(&mut self, index: u32) {
        self.unlink(index);
        self.set_status(index, ResidencyStatus::Evicted);
        self.remove_resident_size(index);
    }

    fn add_resident_size(&mut self, index: u32) {
        let size = self.slots[index as usize].object.as_ref().map_or(0, ManagedObject::get_size);
        self.resident_size += size;
        self.resident_count += 1;
    }

    fn remove_resident_size(&mut self, index: u32) {
        let size = self.slots[index as usize].object.as_ref().map_or(0, ManagedObject::get_size);
        self.resident_size -= size;
        self.resident_count -= 1;
    }

    fn link_head(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.prev = None;
        slot.next = self.head;

        if let Some(head) = self.head {
            self.slots[head as usize].prev = Some(index);
        } else {
            self.tail = Some(index);
        }
        self.head = Some(index);
    }

    fn link_tail(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.prev = self.tail;
        slot.next = None;

        if let Some(tail) = self.tail {
            self.slots[tail as usize].next = Some(index);
        } else {
            self.head = Some(index);
        }
        self.tail = Some(index);
    }

    fn unlink(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        let prev = slot.prev.take();
        let next = slot.next.take();

        match prev {
            Some(prev) => self.slots[prev as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next as usize].prev = prev,
            None => self.tail = prev,
        }
    }
}

pub struct LruIter<'a> {
    tracker: &'a ResidencyTracker,
    cursor: Option<u32>,
}

impl<'a> Iterator for LruIter<'a> {
    type Item = (ObjectId, &'a ManagedObject);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.cursor?;
            let slot = &self.tracker.slots[index as usize];
            self.cursor = slot.next;
            if let Some(object) = slot.object.as_ref() {
                return Some((self.tracker.get_id(index), object));
            }
        }
    }
}
