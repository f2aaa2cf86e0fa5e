use bitflags::bitflags;

bitflags! {
    /// The access states a subresource can be in.
    ///
    /// An empty set is the common state. It is the only state that is meaningful on every queue
    /// type and the state all resources start in.
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    pub struct ResourceState: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const DEPTH_READ = 1 << 5;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        const STREAM_OUT = 1 << 8;
        const INDIRECT_ARGUMENT = 1 << 9;
        const COPY_DEST = 1 << 10;
        const COPY_SOURCE = 1 << 11;
        const RESOLVE_DEST = 1 << 12;
        const RESOLVE_SOURCE = 1 << 13;
        const PRESENT = 1 << 14;
        const VIDEO_DECODE_READ = 1 << 15;
        const VIDEO_DECODE_WRITE = 1 << 16;
        const VIDEO_PROCESS_READ = 1 << 17;
        const VIDEO_PROCESS_WRITE = 1 << 18;

        const ALL_SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits() | Self::PIXEL_SHADER_RESOURCE.bits();

        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
    }
}

impl ResourceState {
    pub const COMMON: Self = Self::empty();

    /// Every state bit that allows the device to modify the subresource.
    ///
    /// This is the single source of truth for what counts as a write. Every transition decision
    /// goes through [`ResourceState::is_write`].
    pub const WRITE_STATES: Self = Self::from_bits_truncate(
        Self::RENDER_TARGET.bits()
            | Self::UNORDERED_ACCESS.bits()
            | Self::DEPTH_WRITE.bits()
            | Self::STREAM_OUT.bits()
            | Self::COPY_DEST.bits()
            | Self::RESOLVE_DEST.bits()
            | Self::VIDEO_DECODE_WRITE.bits()
            | Self::VIDEO_PROCESS_WRITE.bits()
    );

    #[inline]
    pub const fn is_common(&self) -> bool {
        self.is_empty()
    }

    #[inline]
    pub const fn is_write(&self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// Returns true if the state is a non common state that only reads.
    #[inline]
    pub const fn is_read(&self) -> bool {
        !self.is_empty() && !self.is_write()
    }

    /// Returns true if a subresource in `self` can be used as `desired` without a transition.
    ///
    /// The common state is only implied by itself.
    #[inline]
    pub const fn implies(&self, desired: ResourceState) -> bool {
        if desired.is_empty() {
            self.is_empty()
        } else {
            self.contains(desired)
        }
    }

    /// Returns true if both states are read states and can be merged into one.
    #[inline]
    pub const fn can_accumulate(&self, other: ResourceState) -> bool {
        self.is_read() && other.is_read()
    }
}

bitflags! {
    /// Modifiers of a desired state request.
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
    pub struct TransitionFlags: u32 {
        /// The request is only resolved by the next draw preparation pass. Binding calls use this
        /// so multiple binds can be merged into a single barrier.
        const DEFER_TO_DRAW = 1 << 0;

        /// The destination queue takes exclusive ownership even for read only access of a
        /// shareable resource.
        const EXCLUSIVE = 1 << 1;

        /// Do not merge the requested read state with a already present read state.
        const NO_ACCUMULATE = 1 << 2;
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::COMMON
    }
}

impl TransitionFlags {
    /// Returns true if a request with these flags may be resolved in the current pass.
    #[inline]
    pub const fn is_eligible(&self, is_pre_draw: bool) -> bool {
        is_pre_draw || !self.contains(Self::DEFER_TO_DRAW)
    }
}
