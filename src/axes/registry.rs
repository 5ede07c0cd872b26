use smallvec::SmallVec;

use super::{Axis, AxisError, AxisId, AxisLength, AxisSet, AxisSpec, Role};

/// Arena which creates axes and owns their names, roles and lengths.
///
/// Every axis ID is minted by exactly one registry and is only meaningful
/// together with it. A [`Graph`](crate::Graph) owns the registry for all axes
/// used by its values.
///
/// Lengths follow a resolve-once rule. An axis may be created without a length
/// and have it assigned later, typically via [`set_shape`](Self::set_shape).
/// Once resolved, a length can only be re-assigned the same value.
#[derive(Clone, Debug, Default)]
pub struct AxisRegistry {
    axes: Vec<Axis>,
}

impl AxisRegistry {
    pub fn new() -> AxisRegistry {
        AxisRegistry { axes: Vec::new() }
    }

    /// Return the number of axes created so far.
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Create a new axis.
    pub fn make_axis(&mut self, spec: AxisSpec) -> Result<AxisId, AxisError> {
        let axis = spec.into_axis()?;
        let id = AxisId::from_u32(self.axes.len() as u32);
        self.axes.push(axis);
        Ok(id)
    }

    /// Create an axis set from existing axes, preserving order.
    pub fn make_axes(
        &self,
        axes: impl IntoIterator<Item = AxisId>,
    ) -> Result<AxisSet, AxisError> {
        let set = AxisSet::new(axes)?;
        for id in &set {
            self.try_get(id)?;
        }
        Ok(set)
    }

    /// Look up an axis by ID.
    ///
    /// Panics if the ID was not created by this registry. Use
    /// [`try_get`](Self::try_get) for a fallible version.
    pub fn get(&self, id: AxisId) -> &Axis {
        &self.axes[id.as_usize()]
    }

    pub fn try_get(&self, id: AxisId) -> Result<&Axis, AxisError> {
        self.axes.get(id.as_usize()).ok_or(AxisError::UnknownAxis(id))
    }

    /// Return the debug name of an axis.
    pub fn name(&self, id: AxisId) -> String {
        self.try_get(id)
            .ok()
            .and_then(|axis| axis.name())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("[axis {}]", id))
    }

    /// Return the resolved length of an axis.
    pub fn length(&self, id: AxisId) -> Result<usize, AxisError> {
        self.try_get(id)?
            .length
            .get()
            .ok_or(AxisError::UnresolvedLength(id))
    }

    /// Assign the length of an axis.
    ///
    /// Assigning the same length to an already-resolved axis is allowed and
    /// has no effect.
    pub fn set_length(&mut self, id: AxisId, length: usize) -> Result<(), AxisError> {
        if length == 0 {
            return Err(AxisError::Configuration("axis length must be positive"));
        }
        let axis = self
            .axes
            .get_mut(id.as_usize())
            .ok_or(AxisError::UnknownAxis(id))?;
        match axis.length {
            AxisLength::Unresolved => {
                axis.length = AxisLength::Resolved(length);
                Ok(())
            }
            AxisLength::Resolved(current) if current == length => Ok(()),
            AxisLength::Resolved(current) => Err(AxisError::LengthConflict {
                axis: id,
                current,
                new: length,
            }),
        }
    }

    /// Assign lengths to the axes in `axes` positionally.
    ///
    /// All lengths are validated before any are assigned, so on failure no
    /// axis is modified.
    pub fn set_shape(&mut self, axes: &AxisSet, lengths: &[usize]) -> Result<(), AxisError> {
        if axes.len() != lengths.len() {
            return Err(AxisError::ShapeMismatch {
                expected: axes.len(),
                actual: lengths.len(),
            });
        }
        for (id, &len) in axes.iter().zip(lengths) {
            if len == 0 {
                return Err(AxisError::Configuration("axis length must be positive"));
            }
            match self.try_get(id)?.length {
                AxisLength::Resolved(current) if current != len => {
                    return Err(AxisError::LengthConflict {
                        axis: id,
                        current,
                        new: len,
                    });
                }
                _ => {}
            }
        }
        for (id, &len) in axes.iter().zip(lengths) {
            self.set_length(id, len)?;
        }
        Ok(())
    }

    /// Return the resolved lengths of all axes in `axes`.
    pub fn lengths(&self, axes: &AxisSet) -> Result<SmallVec<[usize; 5]>, AxisError> {
        axes.iter().map(|id| self.length(id)).collect()
    }

    /// Return the total number of elements in a value with shape `axes`.
    pub fn size(&self, axes: &AxisSet) -> Result<usize, AxisError> {
        Ok(self.lengths(axes)?.iter().product())
    }

    /// Return true if both axes have `role`.
    pub fn role_equal(&self, a: AxisId, b: AxisId, role: Role) -> bool {
        self.get(a).has_role(role) && self.get(b).has_role(role)
    }

    /// Return the names of `axes`, for use in error messages.
    pub fn describe(&self, axes: &AxisSet) -> String {
        let names: Vec<String> = axes
            .iter()
            .map(|id| match self.try_get(id).map(|a| a.length) {
                Ok(AxisLength::Resolved(len)) => format!("{}={}", self.name(id), len),
                _ => format!("{}=?", self.name(id)),
            })
            .collect();
        format!("[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use rten_lower_testing::TestCases;

    use super::AxisRegistry;
    use crate::axes::{AxisError, AxisLength, AxisSpec, Role};

    #[test]
    fn test_make_axis() {
        let mut reg = AxisRegistry::new();
        let a = reg.make_axis(AxisSpec::new().name("C").role(Role::Channel)).unwrap();
        let b = reg.make_axis(AxisSpec::new().length(3)).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(a).name(), Some("C"));
        assert_eq!(reg.length(a), Err(AxisError::UnresolvedLength(a)));
        assert_eq!(reg.length(b), Ok(3));
    }

    #[test]
    fn test_set_shape() {
        let mut reg = AxisRegistry::new();
        let ids: Vec<_> = (0..4)
            .map(|_| reg.make_axis(AxisSpec::new()).unwrap())
            .collect();
        let axes = reg.make_axes(ids.iter().copied()).unwrap();

        reg.set_shape(&axes, &[128, 3, 32, 32]).unwrap();
        assert_eq!(reg.lengths(&axes).unwrap().as_slice(), &[128, 3, 32, 32]);
        assert_eq!(reg.size(&axes), Ok(128 * 3 * 32 * 32));
        assert_eq!(reg.get(ids[1]).length(), AxisLength::Resolved(3));

        // Re-assigning the same shape is allowed.
        reg.set_shape(&axes, &[128, 3, 32, 32]).unwrap();
    }

    #[test]
    fn test_set_shape_errors() {
        #[derive(Debug)]
        struct Case {
            lengths: Vec<usize>,
            expected: AxisError,
        }

        let cases = [
            Case {
                lengths: vec![1, 2],
                expected: AxisError::ShapeMismatch {
                    expected: 3,
                    actual: 2,
                },
            },
            Case {
                lengths: vec![1, 2, 3, 4],
                expected: AxisError::ShapeMismatch {
                    expected: 3,
                    actual: 4,
                },
            },
            Case {
                lengths: vec![1, 0, 3],
                expected: AxisError::Configuration("axis length must be positive"),
            },
        ];

        cases.test_each(|case| {
            let mut reg = AxisRegistry::new();
            let ids: Vec<_> = (0..3)
                .map(|_| reg.make_axis(AxisSpec::new()).unwrap())
                .collect();
            let axes = reg.make_axes(ids).unwrap();
            assert_eq!(reg.set_shape(&axes, &case.lengths), Err(case.expected.clone()));
            assert!(axes.iter().all(|id| reg.length(id).is_err()));
        })
    }

    #[test]
    fn test_length_conflict() {
        let mut reg = AxisRegistry::new();
        let a = reg.make_axis(AxisSpec::new().length(2)).unwrap();
        let b = reg.make_axis(AxisSpec::new()).unwrap();
        let axes = reg.make_axes([b, a]).unwrap();

        assert_eq!(
            reg.set_shape(&axes, &[5, 3]),
            Err(AxisError::LengthConflict {
                axis: a,
                current: 2,
                new: 3
            })
        );
        // `b` is unchanged because validation happens before assignment.
        assert_eq!(reg.length(b), Err(AxisError::UnresolvedLength(b)));
    }

    #[test]
    fn test_role_equal() {
        let mut reg = AxisRegistry::new();
        let h1 = reg.make_axis(AxisSpec::new().role(Role::Height)).unwrap();
        let h2 = reg.make_axis(AxisSpec::new().role(Role::Height)).unwrap();
        let w = reg.make_axis(AxisSpec::new().role(Role::Width)).unwrap();
        assert!(reg.role_equal(h1, h2, Role::Height));
        assert!(!reg.role_equal(h1, w, Role::Height));
    }

    #[test]
    fn test_describe() {
        let mut reg = AxisRegistry::new();
        let n = reg.make_axis(AxisSpec::new().batch().length(8)).unwrap();
        let c = reg.make_axis(AxisSpec::new().name("C")).unwrap();
        let axes = reg.make_axes([n, c]).unwrap();
        assert_eq!(reg.describe(&axes), "[N=8, C=?]");
    }
}
