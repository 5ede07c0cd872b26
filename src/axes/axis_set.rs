use std::ops::Range;

use smallvec::SmallVec;

use super::{AxisError, AxisId, AxisRegistry, Role};

/// An ordered sequence of unique axes, describing the shape of a value.
///
/// The order is significant and matches the physical layout of the value.
/// Axis sets are never modified after construction. Operations such as
/// [`insert`](AxisSet::insert) or [`without`](AxisSet::without) return new
/// sets.
///
/// Lengths are not stored in the set itself but in the [`AxisRegistry`] that
/// owns the axes. See [`AxisRegistry::lengths`].
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct AxisSet {
    axes: SmallVec<[AxisId; 5]>,
}

impl AxisSet {
    /// Create an axis set from a sequence of axes.
    ///
    /// Fails with [`AxisError::DuplicateAxis`] if an axis appears more than
    /// once.
    pub fn new(axes: impl IntoIterator<Item = AxisId>) -> Result<AxisSet, AxisError> {
        let mut set: SmallVec<[AxisId; 5]> = SmallVec::new();
        for axis in axes {
            if set.contains(&axis) {
                return Err(AxisError::DuplicateAxis(axis));
            }
            set.push(axis);
        }
        Ok(AxisSet { axes: set })
    }

    /// Create an axis set with no axes, for scalar values.
    pub fn scalar() -> AxisSet {
        AxisSet::default()
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = AxisId> + ExactSizeIterator + '_ {
        self.axes.iter().copied()
    }

    pub fn as_slice(&self) -> &[AxisId] {
        &self.axes
    }

    pub fn get(&self, index: usize) -> Option<AxisId> {
        self.axes.get(index).copied()
    }

    pub fn first(&self) -> Option<AxisId> {
        self.axes.first().copied()
    }

    pub fn last(&self) -> Option<AxisId> {
        self.axes.last().copied()
    }

    /// Return the position of `axis` in this set.
    pub fn position(&self, axis: AxisId) -> Option<usize> {
        self.axes.iter().position(|a| *a == axis)
    }

    pub fn contains(&self, axis: AxisId) -> bool {
        self.axes.contains(&axis)
    }

    /// Find the first axis in this set which has a given role.
    pub fn find_role(&self, registry: &AxisRegistry, role: Role) -> Option<AxisId> {
        self.iter().find(|id| registry.get(*id).has_role(role))
    }

    /// Return true if `self` and `other` contain the same axes in the same
    /// order.
    pub fn same_order(&self, other: &AxisSet) -> bool {
        self.axes == other.axes
    }

    /// Return true if `self` and `other` contain the same axes, in any order.
    pub fn same_axes(&self, other: &AxisSet) -> bool {
        self.len() == other.len() && self.iter().all(|a| other.contains(a))
    }

    /// Return true if every axis in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &AxisSet) -> bool {
        self.iter().all(|a| other.contains(a))
    }

    /// Return the sub-sequence of axes in `range`.
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> AxisSet {
        AxisSet {
            axes: self.axes[range].into(),
        }
    }

    /// Return the axes of `self` that are not in `other`, preserving order.
    pub fn without(&self, other: &AxisSet) -> AxisSet {
        AxisSet {
            axes: self.iter().filter(|a| !other.contains(*a)).collect(),
        }
    }

    /// Return the axes of `self` that do not have `role`, preserving order.
    ///
    /// For example this can be used to get all axes of a filter except its
    /// output feature axis.
    pub fn without_role(&self, registry: &AxisRegistry, role: Role) -> AxisSet {
        AxisSet {
            axes: self
                .iter()
                .filter(|a| !registry.get(*a).has_role(role))
                .collect(),
        }
    }

    /// Return a new set with `axis` inserted at `index`.
    ///
    /// Fails if `index > self.len()` or if `axis` is already in the set.
    pub fn insert(&self, index: usize, axis: AxisId) -> Result<AxisSet, AxisError> {
        if index > self.len() {
            return Err(AxisError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        if self.contains(axis) {
            return Err(AxisError::DuplicateAxis(axis));
        }
        let mut axes = self.axes.clone();
        axes.insert(index, axis);
        Ok(AxisSet { axes })
    }

    /// Return a new set with the axis at `index` removed.
    pub fn remove(&self, index: usize) -> Result<AxisSet, AxisError> {
        if index >= self.len() {
            return Err(AxisError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        let mut axes = self.axes.clone();
        axes.remove(index);
        Ok(AxisSet { axes })
    }

    /// Return the positions in `self` of each axis in `order`.
    ///
    /// Returns `None` if any axis in `order` is not in `self`.
    pub fn permutation_to(&self, order: &AxisSet) -> Option<SmallVec<[usize; 5]>> {
        order.iter().map(|a| self.position(a)).collect()
    }
}

impl<'a> IntoIterator for &'a AxisSet {
    type Item = AxisId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, AxisId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.axes.iter().copied()
    }
}
