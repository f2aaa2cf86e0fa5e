use ash::vk;

use crate::state::ResourceDesc;
use crate::transition::{Barrier, Subresources};

use super::state::VkResourceState;

/// The vulkan object backing a resource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum VkResource {
    Buffer(vk::Buffer),

    /// A image and the aspects of its single plane. Multi planar images address planes through
    /// the plane aspects instead.
    Image(vk::Image, vk::ImageAspectFlags),
}

/// Collects the vulkan barriers for the barrier list of one queue.
///
/// Resources must be created with `VK_SHARING_MODE_CONCURRENT`. No queue family ownership transfer
/// is recorded, moving between queues is handled by the common state and semaphore waits.
#[derive(Default)]
pub struct BarrierBatch {
    buffer_barriers: Vec<vk::BufferMemoryBarrier2>,
    image_barriers: Vec<vk::ImageMemoryBarrier2>,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, barrier: &Barrier, resource: &VkResource, desc: &ResourceDesc) {
        match resource {
            VkResource::Buffer(buffer) => self.buffer_barriers.push(make_buffer_barrier(barrier, *buffer)),
            VkResource::Image(image, aspect_mask) => self.image_barriers.push(make_image_barrier(barrier, *image, *aspect_mask, desc)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer_barriers.is_empty() && self.image_barriers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer_barriers.clear();
        self.image_barriers.clear();
    }

    pub fn get_buffer_barriers(&self) -> &[vk::BufferMemoryBarrier2] {
        &self.buffer_barriers
    }

    pub fn get_image_barriers(&self) -> &[vk::ImageMemoryBarrier2] {
        &self.image_barriers
    }

    /// Creates the dependency info for `vkCmdPipelineBarrier2`.
    pub fn get_dependency_info(&self) -> vk::DependencyInfoBuilder<'_> {
        vk::DependencyInfo::builder()
            .buffer_memory_barriers(&self.buffer_barriers)
            .image_memory_barriers(&self.image_barriers)
    }
}

pub fn make_buffer_barrier(barrier: &Barrier, buffer: vk::Buffer) -> vk::BufferMemoryBarrier2 {
    let src = VkResourceState::from_state(barrier.before);
    let dst = VkResourceState::from_state(barrier.after);

    vk::BufferMemoryBarrier2::builder()
        .src_stage_mask(src.stage_mask)
        .src_access_mask(src.access_mask)
        .dst_stage_mask(dst.stage_mask)
        .dst_access_mask(dst.access_mask)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
        .build()
}

pub fn make_image_barrier(barrier: &Barrier, image: vk::Image, aspect_mask: vk::ImageAspectFlags, desc: &ResourceDesc) -> vk::ImageMemoryBarrier2 {
    let src = VkResourceState::from_state(barrier.before);
    let dst = VkResourceState::from_state(barrier.after);

    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(src.stage_mask)
        .src_access_mask(src.access_mask)
        .dst_stage_mask(dst.stage_mask)
        .dst_access_mask(dst.access_mask)
        .old_layout(src.layout)
        .new_layout(dst.layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(make_subresource_range(barrier.subresources, aspect_mask, desc))
        .build()
}

/// Builds the vulkan range of a barrier.
///
/// `desc` must be valid, which [`crate::transition::TransitionPlanner::register_resource`]
/// guarantees for every registered resource. Plane counts above
/// [`ResourceDesc::MAX_PLANE_COUNT`] panic.
pub fn make_subresource_range(subresources: Subresources, aspect_mask: vk::ImageAspectFlags, desc: &ResourceDesc) -> vk::ImageSubresourceRange {
    match subresources {
        Subresources::All => {
            let aspect_mask = if desc.plane_count > 1 {
                (0..desc.plane_count).fold(vk::ImageAspectFlags::empty(), |mask, plane| mask | get_plane_aspect(plane))
            } else {
                aspect_mask
            };

            vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: desc.array_size,
            }
        }
        Subresources::Index(index) => {
            let (mip, array_slice, plane) = desc.decompose_subresource(index);
            let aspect_mask = if desc.plane_count > 1 {
                get_plane_aspect(plane)
            } else {
                aspect_mask
            };

            vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: mip,
                level_count: 1,
                base_array_layer: array_slice,
                layer_count: 1,
            }
        }
    }
}

fn get_plane_aspect(plane: u32) -> vk::ImageAspectFlags {
    match plane {
        0 => vk::ImageAspectFlags::PLANE_0,
        1 => vk::ImageAspectFlags::PLANE_1,
        2 => vk::ImageAspectFlags::PLANE_2,
        _ => {
            log::error!("Image plane {} out of range", plane);
            panic!()
        }
    }
}
