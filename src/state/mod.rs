//! Per resource current and desired state records.

mod resource_state;
mod subresource;
mod table;

pub use resource_state::{ResourceState, TransitionFlags};
pub use subresource::{ResourceDesc, SubresourceRange, SubresourceTable};
pub use table::{BindingState, CurrentState, DesiredState, ExclusiveState, ResourceStateTable, SharedAccess, SharedState};
