//! Hardware queue types and the interfaces the coordinator consumes from the command submission
//! layer.

use std::fmt::{Debug, Formatter};
use std::ops::{Index, IndexMut};

use crate::transition::Barrier;

/// The hardware queue types work can be submitted to.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum QueueType {
    Graphics,
    Compute,
    Copy,
    VideoDecode,
    VideoProcess,
}

impl QueueType {
    pub const COUNT: usize = 5;

    pub const ALL: [QueueType; Self::COUNT] = [
        QueueType::Graphics,
        QueueType::Compute,
        QueueType::Copy,
        QueueType::VideoDecode,
        QueueType::VideoProcess,
    ];

    #[inline]
    pub const fn get_index(&self) -> usize {
        match self {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Copy => 2,
            QueueType::VideoDecode => 3,
            QueueType::VideoProcess => 4,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueType::Graphics => "Graphics",
            QueueType::Compute => "Compute",
            QueueType::Copy => "Copy",
            QueueType::VideoDecode => "VideoDecode",
            QueueType::VideoProcess => "VideoProcess",
        }
    }
}

/// A fixed capacity map with one entry for every [`QueueType`].
///
/// Lookups are a single match on the enum so they can never go out of bounds.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct PerQueue<T> {
    entries: [T; QueueType::COUNT],
}

impl<T> PerQueue<T> {
    pub fn from_fn<F: FnMut(QueueType) -> T>(mut f: F) -> Self {
        Self {
            entries: QueueType::ALL.map(|queue| f(queue)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item=(QueueType, &T)> {
        QueueType::ALL.into_iter().zip(self.entries.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item=(QueueType, &mut T)> {
        QueueType::ALL.into_iter().zip(self.entries.iter_mut())
    }

    pub fn map<U, F: FnMut(QueueType, &T) -> U>(&self, mut f: F) -> PerQueue<U> {
        PerQueue::from_fn(|queue| f(queue, &self[queue]))
    }
}

impl<T: Clone> PerQueue<T> {
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

impl<T> Index<QueueType> for PerQueue<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: QueueType) -> &Self::Output {
        &self.entries[index.get_index()]
    }
}

impl<T> IndexMut<QueueType> for PerQueue<T> {
    #[inline]
    fn index_mut(&mut self, index: QueueType) -> &mut Self::Output {
        &mut self.entries[index.get_index()]
    }
}

impl<T: Debug> Debug for PerQueue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter().map(|(queue, value)| (queue.as_str(), value))).finish()
    }
}

/// A hardware queue as seen by the transition planner.
///
/// Fence values follow timeline semaphore semantics. The current fence value is the value that
/// will be signaled once the commands currently being recorded are flushed, the completed fence
/// value is the last value the device has finished executing.
pub trait HardwareQueue {
    fn current_fence_value(&self) -> u64;

    fn completed_fence_value(&self) -> u64;

    /// Records barriers into the currently open command batch.
    fn submit_barriers(&mut self, barriers: &[Barrier]);

    /// Makes all following work on this queue wait until `queue` has signaled `fence_value`.
    fn insert_queue_wait(&mut self, queue: QueueType, fence_value: u64);

    /// Submits the currently open command batch. This increments the current fence value.
    fn flush(&mut self);

    fn has_pending_commands(&self) -> bool;
}

/// The set of hardware queues available to a apply pass.
pub struct Queues<'a> {
    queues: PerQueue<Option<&'a mut dyn HardwareQueue>>,
}

impl<'a> Default for Queues<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Queues<'a> {
    pub fn new() -> Self {
        Self {
            queues: PerQueue::default(),
        }
    }

    pub fn with_queue(mut self, queue_type: QueueType, queue: &'a mut dyn HardwareQueue) -> Self {
        self.queues[queue_type] = Some(queue);
        self
    }

    pub fn is_available(&self, queue_type: QueueType) -> bool {
        self.queues[queue_type].is_some()
    }

    pub fn get(&self, queue_type: QueueType) -> Option<&dyn HardwareQueue> {
        match &self.queues[queue_type] {
            Some(queue) => Some(&**queue),
            None => None,
        }
    }

    pub fn get_mut(&mut self, queue_type: QueueType) -> Option<&mut (dyn HardwareQueue + 'a)> {
        match &mut self.queues[queue_type] {
            Some(queue) => Some(&mut **queue),
            None => None,
        }
    }
}

/// Thread safe access to queue fences used by the residency manager.
///
/// The paging pass may run on a submission thread concurrently to command recording so this is
/// a separate interface from [`HardwareQueue`].
pub trait FenceMonitor: Send + Sync {
    fn current_fence_value(&self, queue: QueueType) -> u64;

    fn completed_fence_value(&self, queue: QueueType) -> u64;

    /// Blocks the calling thread until `queue` has signaled `fence_value`.
    fn wait_for_fence(&self, queue: QueueType, fence_value: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_queue_index() {
        let mut values = PerQueue::splat(0u64);
        values[QueueType::Copy] = 7;
        values[QueueType::VideoProcess] = 3;

        assert_eq!(values[QueueType::Graphics], 0);
        assert_eq!(values[QueueType::Copy], 7);
        assert_eq!(values[QueueType::VideoProcess], 3);

        let collected: Vec<_> = values.iter().map(|(queue, value)| (queue, *value)).collect();
        assert_eq!(collected.len(), QueueType::COUNT);
        assert_eq!(collected[2], (QueueType::Copy, 7));
    }

    #[test]
    fn test_queue_indices_are_unique() {
        for (i, queue) in QueueType::ALL.iter().enumerate() {
            assert_eq!(queue.get_index(), i);
        }
    }

    #[test]
    fn test_default_queues_are_empty() {
        let queues = Queues::default();
        for queue in QueueType::ALL {
            assert!(!queues.is_available(queue));
            assert!(queues.get(queue).is_none());
        }
    }
}
