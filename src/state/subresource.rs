//! Subresource addressing and the collapsed/expanded per subresource storage.

/// Describes the subresource layout of a resource.
///
/// Subresources are indexed as `mip + array_slice * mip_levels + plane * mip_levels * array_size`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ResourceDesc {
    pub mip_levels: u32,
    pub array_size: u32,
    pub plane_count: u32,

    /// Shareable resources support simultaneous read access from multiple queue types and do not
    /// need barriers to move between queues.
    pub shareable: bool,
}

impl ResourceDesc {
    /// A resource with a single subresource. Buffers are always described this way.
    pub const fn new_buffer(shareable: bool) -> Self {
        Self {
            mip_levels: 1,
            array_size: 1,
            plane_count: 1,
            shareable,
        }
    }

    pub const fn new_texture(mip_levels: u32, array_size: u32, plane_count: u32) -> Self {
        Self {
            mip_levels,
            array_size,
            plane_count,
            shareable: false,
        }
    }

    pub const fn set_shareable(mut self, shareable: bool) -> Self {
        self.shareable = shareable;
        self
    }

    /// The most planes a multi planar format can have.
    pub const MAX_PLANE_COUNT: u32 = 3;

    /// Returns true if the description has at least one subresource, no more planes than any
    /// format supports and a subresource count that fits into a u32.
    pub const fn is_valid(&self) -> bool {
        if self.mip_levels == 0 || self.array_size == 0 || self.plane_count == 0 || self.plane_count > Self::MAX_PLANE_COUNT {
            return false;
        }
        match self.mip_levels.checked_mul(self.array_size) {
            Some(count) => count.checked_mul(self.plane_count).is_some(),
            None => false,
        }
    }

    pub const fn get_subresource_count(&self) -> u32 {
        self.mip_levels * self.array_size * self.plane_count
    }

    pub const fn calc_subresource(&self, mip: u32, array_slice: u32, plane: u32) -> u32 {
        mip + (array_slice * self.mip_levels) + (plane * self.mip_levels * self.array_size)
    }

    /// Splits a subresource index into its `(mip, array_slice, plane)` components.
    pub const fn decompose_subresource(&self, subresource: u32) -> (u32, u32, u32) {
        let mip = subresource % self.mip_levels;
        let array_slice = (subresource / self.mip_levels) % self.array_size;
        let plane = subresource / (self.mip_levels * self.array_size);
        (mip, array_slice, plane)
    }

    pub const fn full_range(&self) -> SubresourceRange {
        SubresourceRange {
            base_mip: 0,
            mip_count: self.mip_levels,
            base_array_slice: 0,
            array_count: self.array_size,
            base_plane: 0,
            plane_count: self.plane_count,
        }
    }
}

/// A box of subresources.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_array_slice: u32,
    pub array_count: u32,
    pub base_plane: u32,
    pub plane_count: u32,
}

impl SubresourceRange {
    pub const fn new(base_mip: u32, mip_count: u32, base_array_slice: u32, array_count: u32, base_plane: u32, plane_count: u32) -> Self {
        Self {
            base_mip,
            mip_count,
            base_array_slice,
            array_count,
            base_plane,
            plane_count,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.mip_count == 0 || self.array_count == 0 || self.plane_count == 0
    }

    /// Returns true if every subresource in this range exists in `desc`.
    pub const fn fits(&self, desc: &ResourceDesc) -> bool {
        (self.base_mip + self.mip_count) <= desc.mip_levels
            && (self.base_array_slice + self.array_count) <= desc.array_size
            && (self.base_plane + self.plane_count) <= desc.plane_count
    }

    pub fn covers(&self, desc: &ResourceDesc) -> bool {
        *self == desc.full_range()
    }

    /// Iterates all subresource indices of the range in ascending order.
    pub fn iter_indices<'a>(&'a self, desc: &'a ResourceDesc) -> impl Iterator<Item=u32> + 'a {
        (self.base_plane..(self.base_plane + self.plane_count)).flat_map(move |plane| {
            (self.base_array_slice..(self.base_array_slice + self.array_count)).flat_map(move |array_slice| {
                (self.base_mip..(self.base_mip + self.mip_count)).map(move |mip| desc.calc_subresource(mip, array_slice, plane))
            })
        })
    }
}

/// Per subresource storage that is collapsed into a single entry while all subresources agree.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SubresourceTable<T> {
    Uniform(T),
    PerSubresource(Box<[T]>),
}

impl<T: Clone + PartialEq> SubresourceTable<T> {
    pub fn new(value: T) -> Self {
        Self::Uniform(value)
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self, Self::Uniform(_))
    }

    /// Returns the entry of a subresource. For collapsed tables this is the single shared entry.
    pub fn get(&self, subresource: u32) -> &T {
        match self {
            Self::Uniform(value) => value,
            Self::PerSubresource(values) => &values[subresource as usize],
        }
    }

    /// Returns the single shared entry if the table is collapsed.
    pub fn get_uniform(&self) -> Option<&T> {
        match self {
            Self::Uniform(value) => Some(value),
            Self::PerSubresource(_) => None,
        }
    }

    /// Overwrites every subresource and collapses the table.
    pub fn set_all(&mut self, value: T) {
        *self = Self::Uniform(value);
    }

    /// Sets the entry of one subresource expanding the table if necessary.
    pub fn set(&mut self, subresource_count: u32, subresource: u32, value: T) {
        if let Self::Uniform(current) = self {
            if *current == value {
                return;
            }
            if subresource_count == 1 {
                *current = value;
                return;
            }
        }
        self.expand(subresource_count)[subresource as usize] = value;
    }

    /// Converts the table to the per subresource representation and returns the entries.
    pub fn expand(&mut self, subresource_count: u32) -> &mut [T] {
        if let Self::Uniform(value) = self {
            let values: Box<[T]> = std::iter::repeat(value.clone()).take(subresource_count as usize).collect();
            *self = Self::PerSubresource(values);
        }
        match self {
            Self::PerSubresource(values) => &mut values[..],
            Self::Uniform(_) => unreachable!(),
        }
    }

    /// Collapses the table back to a single entry if all subresources hold the same value.
    ///
    /// Returns true if the table is collapsed afterwards.
    pub fn try_collapse(&mut self) -> bool {
        let collapsed = match self {
            Self::Uniform(_) => return true,
            Self::PerSubresource(values) => {
                match values.split_first() {
                    Some((first, rest)) if rest.iter().all(|value| value == first) => first.clone(),
                    _ => return false,
                }
            }
        };
        *self = Self::Uniform(collapsed);
        true
    }

    pub fn iter<'a>(&'a self, subresource_count: u32) -> impl Iterator<Item=(u32, &'a T)> + 'a {
        (0..subresource_count).map(move |index| (index, self.get(index)))
    }
}
