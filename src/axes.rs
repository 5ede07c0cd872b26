//! Named, role-tagged axes and ordered axis sets.
//!
//! Each dimension of a value in a [`Graph`](crate::Graph) is described by an
//! [`Axis`]. Axes have an identity, an optional name, a set of semantic
//! [`Role`]s and a length that may be resolved after the axis is created. The
//! shape of a value is an [`AxisSet`], an ordered sequence of axes.
//!
//! Axes are created by an [`AxisRegistry`], which owns them and hands out
//! [`AxisId`] handles. An axis may appear in many axis sets. For example the
//! batch axis of a convolution input is also the batch axis of its output.

use std::error::Error;
use std::fmt;

mod axis;
mod axis_set;
mod registry;

pub use axis::{Axis, AxisId, AxisLength, AxisSpec, Role};
pub use axis_set::AxisSet;
pub use registry::AxisRegistry;

/// Errors when creating axes and axis sets or assigning lengths.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AxisError {
    /// An axis specification is inconsistent.
    Configuration(&'static str),

    /// An axis appears more than once in an axis set.
    DuplicateAxis(AxisId),

    /// The number of lengths does not match the number of axes.
    ShapeMismatch { expected: usize, actual: usize },

    /// An axis was used in a shape computation before its length was
    /// resolved.
    UnresolvedLength(AxisId),

    /// An axis with a resolved length was assigned a different length.
    LengthConflict {
        axis: AxisId,
        current: usize,
        new: usize,
    },

    /// An axis ID does not belong to the registry.
    UnknownAxis(AxisId),

    /// A position is outside the valid range for an axis set.
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for AxisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisError::Configuration(details) => write!(f, "invalid axis: {}", details),
            AxisError::DuplicateAxis(id) => write!(f, "axis {} appears more than once", id),
            AxisError::ShapeMismatch { expected, actual } => write!(
                f,
                "shape has {} lengths but axis set has {} axes",
                actual, expected
            ),
            AxisError::UnresolvedLength(id) => write!(f, "length of axis {} is unresolved", id),
            AxisError::LengthConflict { axis, current, new } => write!(
                f,
                "axis {} already has length {}, cannot set it to {}",
                axis, current, new
            ),
            AxisError::UnknownAxis(id) => write!(f, "unknown axis {}", id),
            AxisError::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range for {} axes", index, len)
            }
        }
    }
}

impl Error for AxisError {}
