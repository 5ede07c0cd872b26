//! Primitive operators which make up a lowered [`Graph`](crate::Graph).
//!
//! The functions in this module add a single validated operator node to a
//! graph. Reference kernels used by [`Graph::run`](crate::Graph::run) live
//! alongside each builder.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::axes::AxisError;
use crate::canonicalize::LayoutError;
use crate::spatial::SpatialError;

mod binary;
mod conv;
pub(crate) mod layout;
mod pooling;

pub use binary::{add, dot, scale, squared_l2, sub};
pub(crate) use binary::{add_kernel, dot_kernel, scale_kernel, squared_l2_kernel, sub_kernel};
pub use conv::{ConvParams, conv_backprop_data, convolution};
pub(crate) use conv::{conv_backprop_data_kernel, conv_kernel};
pub use pooling::{PoolKind, PoolParams, pooling, pooling_backprop};
pub(crate) use pooling::{pool_backprop_kernel, pool_kernel};

/// The operation performed by an operator node.
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    /// Relabel the axes of a value positionally. The data is unchanged.
    Cast,

    /// Insert a length-1 axis at `position`.
    ExpandDims { position: usize },

    /// Permute the axes of a value.
    Reorder,

    /// Repeat a value along axes that it does not have.
    Broadcast,

    /// Select index `index` of the axis at `axis`, removing that axis.
    Slice { axis: usize, index: usize },

    /// Inverse of [`OpKind::Slice`]. Inserts an axis at `axis` which is zero
    /// everywhere except at `index`.
    Unslice { axis: usize, index: usize },

    /// Sum over the axes of the input which are not in the output.
    SumTo,

    Pooling(PoolParams),

    /// Gradient of [`OpKind::Pooling`] with respect to its input.
    PoolingBackprop(PoolParams),

    Convolution(ConvParams),

    /// Gradient of [`OpKind::Convolution`] with respect to its input.
    ConvBackpropData(ConvParams),

    /// Elementwise addition, broadcasting the second input.
    Add,

    /// Elementwise subtraction, broadcasting the second input.
    Sub,

    /// Contract the axes shared by both inputs.
    Dot,

    /// Sum of squares over all non-batch axes.
    SquaredL2,

    /// Multiply by a constant.
    Scale(f32),
}

impl OpKind {
    /// Return the operator name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Cast => "Cast",
            OpKind::ExpandDims { .. } => "ExpandDims",
            OpKind::Reorder => "Reorder",
            OpKind::Broadcast => "Broadcast",
            OpKind::Slice { .. } => "Slice",
            OpKind::Unslice { .. } => "Unslice",
            OpKind::SumTo => "SumTo",
            OpKind::Pooling(_) => "Pooling",
            OpKind::PoolingBackprop(_) => "PoolingBackprop",
            OpKind::Convolution(_) => "Convolution",
            OpKind::ConvBackpropData(_) => "ConvBackpropData",
            OpKind::Add => "Add",
            OpKind::Sub => "Sub",
            OpKind::Dot => "Dot",
            OpKind::SquaredL2 => "SquaredL2",
            OpKind::Scale(_) => "Scale",
        }
    }
}

/// Errors when building or running an operator.
#[derive(Clone, Debug, PartialEq)]
pub enum OpError {
    /// An input or attribute has a value that is incorrect.
    InvalidValue(Cow<'static, str>),

    /// An input or attribute has a value that is valid, but not currently
    /// supported.
    UnsupportedValue(Cow<'static, str>),

    /// Input shapes are not compatible with each other or operator
    /// attributes.
    IncompatibleInputShapes(Cow<'static, str>),

    /// The operator was given the wrong number of inputs.
    IncorrectInputCount { expected: usize, actual: usize },

    Axis(AxisError),
    Layout(LayoutError),
    Spatial(SpatialError),
}

impl OpError {
    pub(crate) fn invalid(msg: impl Into<Cow<'static, str>>) -> OpError {
        OpError::InvalidValue(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<Cow<'static, str>>) -> OpError {
        OpError::UnsupportedValue(msg.into())
    }

    pub(crate) fn incompatible(msg: impl Into<Cow<'static, str>>) -> OpError {
        OpError::IncompatibleInputShapes(msg.into())
    }
}

impl From<AxisError> for OpError {
    fn from(val: AxisError) -> OpError {
        OpError::Axis(val)
    }
}

impl From<LayoutError> for OpError {
    fn from(val: LayoutError) -> OpError {
        OpError::Layout(val)
    }
}

impl From<SpatialError> for OpError {
    fn from(val: SpatialError) -> OpError {
        match val {
            SpatialError::Axis(err) => OpError::Axis(err),
            other => OpError::Spatial(other),
        }
    }
}

impl Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::InvalidValue(details) => {
                write!(f, "input or attribute has invalid value: {}", details)
            }
            OpError::UnsupportedValue(details) => {
                write!(f, "unsupported input or attribute value: {}", details)
            }
            OpError::IncompatibleInputShapes(details) => {
                write!(f, "incompatible input shapes: {}", details)
            }
            OpError::IncorrectInputCount { expected, actual } => {
                write!(f, "expected {} inputs but got {}", expected, actual)
            }
            OpError::Axis(err) => write!(f, "{}", err),
            OpError::Layout(err) => write!(f, "{}", err),
            OpError::Spatial(err) => write!(f, "{}", err),
        }
    }
}

impl Error for OpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OpError::Axis(err) => Some(err),
            OpError::Layout(err) => Some(err),
            OpError::Spatial(err) => Some(err),
            _ => None,
        }
    }
}

/// Check that an operator received the expected number of inputs.
pub(crate) fn check_input_count(inputs: &[impl Sized], expected: usize) -> Result<(), OpError> {
    if inputs.len() != expected {
        return Err(OpError::IncorrectInputCount {
            expected,
            actual: inputs.len(),
        });
    }
    Ok(())
}
