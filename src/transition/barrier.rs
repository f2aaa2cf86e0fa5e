use crate::state::ResourceState;
use crate::util::id::ResourceId;

/// The subresources a barrier or state update applies to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Subresources {
    All,
    Index(u32),
}

/// A single state transition of one or all subresources of a resource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Barrier {
    pub resource: ResourceId,
    pub subresources: Subresources,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl Barrier {
    pub fn new(resource: ResourceId, subresources: Subresources, before: ResourceState, after: ResourceState) -> Self {
        debug_assert_ne!(before, after, "Barrier without state change");
        Self {
            resource,
            subresources,
            before,
            after,
        }
    }

    /// Returns true if this barrier moves a subresource into the common state. These are emitted
    /// on the source queue of a ownership transfer.
    pub fn is_release(&self) -> bool {
        self.after.is_common()
    }
}
