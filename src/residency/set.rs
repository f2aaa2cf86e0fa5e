use std::collections::HashSet;

use crate::util::id::ObjectId;

/// The objects referenced by a command list. Built while recording and consumed by the paging pass
/// of its submission.
#[derive(Clone, Debug, Default)]
pub struct ResidencySet {
    objects: Vec<ObjectId>,
    contained: HashSet<ObjectId>,
}

impl ResidencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a object. Objects already in the set are ignored.
    ///
    /// Returns true if the object was not in the set yet.
    pub fn insert(&mut self, object: ObjectId) -> bool {
        if self.contained.insert(object) {
            self.objects.push(object);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.contained.contains(&object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates the objects in insertion order.
    pub fn iter(&self) -> impl Iterator<Item=ObjectId> + '_ {
        self.objects.iter().copied()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.contained.clear();
    }
}

impl Extend<ObjectId> for ResidencySet {
    fn extend<T: IntoIterator<Item=ObjectId>>(&mut self, iter: T) {
        for object in iter {
            self.insert(object);
        }
    }
}

impl FromIterator<ObjectId> for ResidencySet {
    fn from_iter<T: IntoIterator<Item=ObjectId>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_ignored() {
        let a = ObjectId::new(0, 1);
        let b = ObjectId::new(1, 1);

        let mut set = ResidencySet::new();
        assert!(set.insert(b));
        assert!(set.insert(a));
        assert!(!set.insert(b));

        assert_eq!(set.len(), 2);
        assert!(set.contains(a));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![b, a]);
    }
}
