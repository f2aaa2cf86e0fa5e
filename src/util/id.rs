//! Generational handles used to refer to slots in the state and residency tables.

use std::fmt::{Debug, Formatter};
use std::num::NonZeroU64;

use static_assertions::const_assert_eq;

pub struct HandleType;

// TODO replace the u8 tags with a enum const parameter once adt_const_params is stable.
impl HandleType {
    pub const fn as_str(ty: u8) -> &'static str {
        match ty {
            Self::RESOURCE => "Resource",
            Self::MANAGED_OBJECT => "ManagedObject",
            _ => "Invalid",
        }
    }

    pub const RESOURCE: u8 = 1u8;
    pub const MANAGED_OBJECT: u8 = 2u8;
}

/// A index into a slot table together with the generation of the slot at the time the handle was
/// created.
///
/// Slots are reused after they are freed. The generation is bumped every time this happens so
/// stale handles can be detected instead of silently aliasing a new entry.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle<const TYPE: u8>(NonZeroU64);

impl<const TYPE: u8> Handle<TYPE> {
    const INDEX_BITS: u32 = 32u32;
    const INDEX_OFFSET: u32 = 0u32;
    pub const INDEX_MAX: u64 = (1u64 << Self::INDEX_BITS) - 1u64;
    const INDEX_MASK: u64 = Self::INDEX_MAX << Self::INDEX_OFFSET;

    const GENERATION_BITS: u32 = 24u32;
    const GENERATION_OFFSET: u32 = Self::INDEX_OFFSET + Self::INDEX_BITS;
    pub const GENERATION_MAX: u32 = ((1u64 << Self::GENERATION_BITS) - 1u64) as u32;
    const GENERATION_MASK: u64 = (Self::GENERATION_MAX as u64) << Self::GENERATION_OFFSET;

    const TYPE_OFFSET: u32 = Self::GENERATION_OFFSET + Self::GENERATION_BITS;
    const TYPE_MASK: u64 = (u8::MAX as u64) << Self::TYPE_OFFSET;

    /// Creates a new handle.
    ///
    /// The type bits are never zero so the packed value is never zero either.
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        if generation > Self::GENERATION_MAX {
            panic!("Handle generation out of range");
        }

        let raw = ((index as u64) << Self::INDEX_OFFSET)
            | ((generation as u64) << Self::GENERATION_OFFSET)
            | ((TYPE as u64) << Self::TYPE_OFFSET);

        match NonZeroU64::new(raw) {
            Some(raw) => Self(raw),
            None => panic!("Zero handle"),
        }
    }

    pub const fn get_raw(&self) -> u64 {
        self.0.get()
    }

    pub const fn get_index(&self) -> u32 {
        ((self.0.get() & Self::INDEX_MASK) >> Self::INDEX_OFFSET) as u32
    }

    pub const fn get_generation(&self) -> u32 {
        ((self.0.get() & Self::GENERATION_MASK) >> Self::GENERATION_OFFSET) as u32
    }

    pub const fn get_type(&self) -> u8 {
        ((self.0.get() & Self::TYPE_MASK) >> Self::TYPE_OFFSET) as u8
    }

    /// Returns the generation following `generation`, wrapping around but skipping 0.
    pub(crate) const fn next_generation(generation: u32) -> u32 {
        if generation >= Self::GENERATION_MAX {
            1
        } else {
            generation + 1
        }
    }
}

impl<const TYPE: u8> Debug for Handle<TYPE> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}({}v{})", HandleType::as_str(self.get_type()), self.get_index(), self.get_generation()))
    }
}

pub type ResourceId = Handle<{ HandleType::RESOURCE }>;
pub type ObjectId = Handle<{ HandleType::MANAGED_OBJECT }>;

// Make sure we didnt mess up the bitmasks
const_assert_eq!(ResourceId::INDEX_MASK & ResourceId::GENERATION_MASK, 0u64);
const_assert_eq!(ResourceId::GENERATION_MASK & ResourceId::TYPE_MASK, 0u64);
const_assert_eq!(ResourceId::INDEX_MASK | ResourceId::GENERATION_MASK | ResourceId::TYPE_MASK, u64::MAX);
