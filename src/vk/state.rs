use ash::vk;

use crate::state::ResourceState;

/// The vulkan synchronization scope and image layout of a [`ResourceState`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct VkResourceState {
    pub stage_mask: vk::PipelineStageFlags2,
    pub access_mask: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl VkResourceState {
    pub fn from_state(state: ResourceState) -> Self {
        if state.is_common() {
            return Self {
                stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
                access_mask: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                layout: vk::ImageLayout::GENERAL,
            };
        }

        let mut stage_mask = vk::PipelineStageFlags2::NONE;
        let mut access_mask = vk::AccessFlags2::NONE;
        for (bit, stage, access) in BIT_SCOPES.iter() {
            if state.contains(*bit) {
                stage_mask |= *stage;
                access_mask |= *access;
            }
        }

        // Present only requires the layout, the semaphore handles the rest
        if stage_mask == vk::PipelineStageFlags2::NONE {
            stage_mask = vk::PipelineStageFlags2::BOTTOM_OF_PIPE;
        }

        Self {
            stage_mask,
            access_mask,
            layout: get_image_layout(state),
        }
    }
}

const fn stages(a: vk::PipelineStageFlags2, b: vk::PipelineStageFlags2) -> vk::PipelineStageFlags2 {
    vk::PipelineStageFlags2::from_raw(a.as_raw() | b.as_raw())
}

const fn access(a: vk::AccessFlags2, b: vk::AccessFlags2) -> vk::AccessFlags2 {
    vk::AccessFlags2::from_raw(a.as_raw() | b.as_raw())
}

const SHADER_STAGES: vk::PipelineStageFlags2 = stages(
    stages(vk::PipelineStageFlags2::VERTEX_SHADER, vk::PipelineStageFlags2::FRAGMENT_SHADER),
    vk::PipelineStageFlags2::COMPUTE_SHADER,
);

const DEPTH_STAGES: vk::PipelineStageFlags2 = stages(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS);

/// The synchronization scope of every state bit.
const BIT_SCOPES: [(ResourceState, vk::PipelineStageFlags2, vk::AccessFlags2); 19] = [
    (ResourceState::VERTEX_AND_CONSTANT_BUFFER, stages(vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, SHADER_STAGES), access(vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, vk::AccessFlags2::UNIFORM_READ)),
    (ResourceState::INDEX_BUFFER, vk::PipelineStageFlags2::INDEX_INPUT, vk::AccessFlags2::INDEX_READ),
    (ResourceState::RENDER_TARGET, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, access(vk::AccessFlags2::COLOR_ATTACHMENT_READ, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)),
    (ResourceState::UNORDERED_ACCESS, SHADER_STAGES, access(vk::AccessFlags2::SHADER_STORAGE_READ, vk::AccessFlags2::SHADER_STORAGE_WRITE)),
    (ResourceState::DEPTH_WRITE, DEPTH_STAGES, access(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)),
    (ResourceState::DEPTH_READ, DEPTH_STAGES, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ),
    (ResourceState::NON_PIXEL_SHADER_RESOURCE, stages(vk::PipelineStageFlags2::PRE_RASTERIZATION_SHADERS, vk::PipelineStageFlags2::COMPUTE_SHADER), vk::AccessFlags2::SHADER_SAMPLED_READ),
    (ResourceState::PIXEL_SHADER_RESOURCE, vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_SAMPLED_READ),
    (ResourceState::STREAM_OUT, vk::PipelineStageFlags2::PRE_RASTERIZATION_SHADERS, vk::AccessFlags2::SHADER_WRITE),
    (ResourceState::INDIRECT_ARGUMENT, vk::PipelineStageFlags2::DRAW_INDIRECT, vk::AccessFlags2::INDIRECT_COMMAND_READ),
    (ResourceState::COPY_DEST, vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
    (ResourceState::COPY_SOURCE, vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
    (ResourceState::RESOLVE_DEST, vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
    (ResourceState::RESOLVE_SOURCE, vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
    (ResourceState::PRESENT, vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
    (ResourceState::VIDEO_DECODE_READ, vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_READ),
    (ResourceState::VIDEO_DECODE_WRITE, vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_WRITE),
    (ResourceState::VIDEO_PROCESS_READ, vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_READ),
    (ResourceState::VIDEO_PROCESS_WRITE, vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_WRITE),
];

/// Selects the image layout for a state. States without a dedicated layout use `GENERAL` if they
/// may write and `READ_ONLY_OPTIMAL` otherwise.
pub fn get_image_layout(state: ResourceState) -> vk::ImageLayout {
    let depth = ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ;

    if state.is_common() || state.contains(ResourceState::UNORDERED_ACCESS) {
        vk::ImageLayout::GENERAL
    } else if state == ResourceState::RENDER_TARGET {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if state.contains(ResourceState::DEPTH_WRITE) && depth.contains(state) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if state == ResourceState::COPY_DEST || state == ResourceState::RESOLVE_DEST {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if state.is_write() {
        vk::ImageLayout::GENERAL
    } else if state == ResourceState::PRESENT {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else if ResourceState::ALL_SHADER_RESOURCE.contains(state) {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else if (ResourceState::DEPTH_READ | ResourceState::ALL_SHADER_RESOURCE).contains(state) {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else if (ResourceState::COPY_SOURCE | ResourceState::RESOLVE_SOURCE).contains(state) {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    } else {
        vk::ImageLayout::READ_ONLY_OPTIMAL
    }
}
