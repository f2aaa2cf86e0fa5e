use ash::vk;

use crate::residency::{MemoryBudgetInfo, MemorySegment};

/// Returns the segment a memory heap belongs to.
pub fn get_heap_segment(heap: &vk::MemoryHeap) -> MemorySegment {
    if heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL) {
        MemorySegment::Local
    } else {
        MemorySegment::NonLocal
    }
}

/// Sums the `VK_EXT_memory_budget` values of all heaps in a segment.
pub fn sum_memory_budget(properties: &vk::PhysicalDeviceMemoryProperties, budget: &vk::PhysicalDeviceMemoryBudgetPropertiesEXT, segment: MemorySegment) -> MemoryBudgetInfo {
    let heap_count = (properties.memory_heap_count as usize).min(vk::MAX_MEMORY_HEAPS);

    let mut info = MemoryBudgetInfo::default();
    for (index, heap) in properties.memory_heaps[..heap_count].iter().enumerate() {
        if get_heap_segment(heap) == segment {
            info.usage += budget.heap_usage[index];
            info.budget += budget.heap_budget[index];
        }
    }
    info
}
