//! Layout transforms which bring values into the axis order that a primitive
//! operator expects.
//!
//! Importers receive tensors in framework layouts such as NCHW. Primitive
//! operators expect canonical layouts such as CDHWN. The functions here add
//! the graph nodes that convert between the two: [`cast`] relabels axes,
//! [`expand_dims`] inserts length-1 axes and [`reorder`] permutes axes.
//! [`broadcast`], [`slice`], [`unslice`] and [`sum_to`] convert back or
//! implement gradients.

use std::error::Error;
use std::fmt;

use tracing::trace;

use crate::axes::{AxisError, AxisId, AxisSet};
use crate::graph::{Graph, NodeId};
use crate::ops::OpKind;

/// Errors when adding a layout transform to a graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LayoutError {
    /// Axis lengths differ in a cast. Contains descriptions of the source and
    /// target axes.
    CastMismatch { from: String, to: String },

    /// An axis insertion position is greater than the number of axes.
    InvalidPosition { position: usize, len: usize },

    /// The target of a reorder is not a permutation of the source axes.
    NotPermutation { from: String, to: String },

    /// The axes of a value are not a subset of the target axes.
    NotBroadcastable { from: String, to: String },

    /// A slice index or axis position is out of range.
    IndexOutOfRange { index: usize, len: usize },

    Axis(AxisError),
}

impl From<AxisError> for LayoutError {
    fn from(err: AxisError) -> LayoutError {
        LayoutError::Axis(err)
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::CastMismatch { from, to } => {
                write!(f, "cannot cast axes {} to {}", from, to)
            }
            LayoutError::InvalidPosition { position, len } => write!(
                f,
                "cannot insert axis at position {} in value with {} axes",
                position, len
            ),
            LayoutError::NotPermutation { from, to } => {
                write!(f, "axes {} are not a permutation of {}", to, from)
            }
            LayoutError::NotBroadcastable { from, to } => {
                write!(f, "cannot broadcast axes {} to {}", from, to)
            }
            LayoutError::IndexOutOfRange { index, len } => {
                write!(f, "index {} is out of range for length {}", index, len)
            }
            LayoutError::Axis(err) => write!(f, "{}", err),
        }
    }
}

impl Error for LayoutError {}

/// Relabel the axes of `value` as `target`, positionally.
///
/// The data is unchanged. Each target axis must have the same length as the
/// source axis at the same position. Target axes whose length is unresolved
/// take the length of the source axis.
pub fn cast(graph: &mut Graph, value: NodeId, target: &AxisSet) -> Result<NodeId, LayoutError> {
    let source = graph.value_axes(value).clone();
    if source.same_order(target) {
        return Ok(value);
    }

    let mismatch = |graph: &Graph| LayoutError::CastMismatch {
        from: graph.axes().describe(&source),
        to: graph.axes().describe(target),
    };
    if source.len() != target.len() {
        return Err(mismatch(graph));
    }

    let lengths = graph.axes().lengths(&source)?;
    for (dst, len) in target.iter().zip(lengths.iter().copied()) {
        match graph.axes().try_get(dst)?.length().get() {
            Some(dst_len) if dst_len != len => return Err(mismatch(graph)),
            _ => {}
        }
    }
    graph.axes_mut().set_shape(target, &lengths)?;

    trace!(
        from = %graph.axes().describe(&source),
        to = %graph.axes().describe(target),
        "cast"
    );
    Ok(graph.add_op(OpKind::Cast, &[value], target.clone()))
}

/// Insert a new length-1 axis into `value` at `position`.
///
/// `position` may be equal to the number of axes, to append. The length of
/// `axis` is set to 1.
pub fn expand_dims(
    graph: &mut Graph,
    value: NodeId,
    axis: AxisId,
    position: usize,
) -> Result<NodeId, LayoutError> {
    let source = graph.value_axes(value).clone();
    if position > source.len() {
        return Err(LayoutError::InvalidPosition {
            position,
            len: source.len(),
        });
    }
    let target = source.insert(position, axis)?;
    graph.axes_mut().set_length(axis, 1)?;

    trace!(
        axis = %graph.axes().name(axis),
        position,
        "expand_dims"
    );
    Ok(graph.add_op(OpKind::ExpandDims { position }, &[value], target))
}

/// Permute the axes of `value` into the order given by `target`.
///
/// `target` must contain exactly the axes of `value`.
pub fn reorder(graph: &mut Graph, value: NodeId, target: &AxisSet) -> Result<NodeId, LayoutError> {
    let source = graph.value_axes(value);
    if !source.same_axes(target) {
        return Err(LayoutError::NotPermutation {
            from: graph.axes().describe(source),
            to: graph.axes().describe(target),
        });
    }
    if source.same_order(target) {
        return Ok(value);
    }

    trace!(
        from = %graph.axes().describe(source),
        to = %graph.axes().describe(target),
        "reorder"
    );
    Ok(graph.add_op(OpKind::Reorder, &[value], target.clone()))
}

/// Broadcast `value` to the axes `target`.
///
/// The axes of `value` must be a subset of `target`. They may appear in a
/// different order. All target axes must have resolved lengths.
pub fn broadcast(
    graph: &mut Graph,
    value: NodeId,
    target: &AxisSet,
) -> Result<NodeId, LayoutError> {
    let source = graph.value_axes(value);
    if !source.is_subset_of(target) {
        return Err(LayoutError::NotBroadcastable {
            from: graph.axes().describe(source),
            to: graph.axes().describe(target),
        });
    }
    graph.axes().lengths(target)?;
    if source.same_order(target) {
        return Ok(value);
    }

    trace!(
        from = %graph.axes().describe(source),
        to = %graph.axes().describe(target),
        "broadcast"
    );
    Ok(graph.add_op(OpKind::Broadcast, &[value], target.clone()))
}

/// Select index `index` of the axis at position `axis`, removing the axis.
pub fn slice(
    graph: &mut Graph,
    value: NodeId,
    axis: usize,
    index: usize,
) -> Result<NodeId, LayoutError> {
    let source = graph.value_axes(value);
    let axis_id = source.get(axis).ok_or(LayoutError::IndexOutOfRange {
        index: axis,
        len: source.len(),
    })?;
    let len = graph.axes().length(axis_id)?;
    if index >= len {
        return Err(LayoutError::IndexOutOfRange { index, len });
    }
    let target = source.remove(axis)?;

    trace!(axis = %graph.axes().name(axis_id), index, "slice");
    Ok(graph.add_op(OpKind::Slice { axis, index }, &[value], target))
}

/// Insert `axis` at `position`, with `value` at index `index` of the new axis
/// and zeros elsewhere.
pub fn unslice(
    graph: &mut Graph,
    value: NodeId,
    axis: AxisId,
    position: usize,
    index: usize,
) -> Result<NodeId, LayoutError> {
    let source = graph.value_axes(value);
    if position > source.len() {
        return Err(LayoutError::InvalidPosition {
            position,
            len: source.len(),
        });
    }
    let len = graph.axes().length(axis)?;
    if index >= len {
        return Err(LayoutError::IndexOutOfRange { index, len });
    }
    let target = source.insert(position, axis)?;

    trace!(
        axis = %graph.axes().name(axis),
        position,
        index,
        "unslice"
    );
    Ok(graph.add_op(
        OpKind::Unslice {
            axis: position,
            index,
        },
        &[value],
        target,
    ))
}

/// Sum `value` over all of its axes which are not in `target`.
///
/// The result has axes `target`, which must be a subset of the axes of
/// `value`.
pub fn sum_to(graph: &mut Graph, value: NodeId, target: &AxisSet) -> Result<NodeId, LayoutError> {
    let source = graph.value_axes(value);
    if !target.is_subset_of(source) {
        return Err(LayoutError::NotBroadcastable {
            from: graph.axes().describe(target),
            to: graph.axes().describe(source),
        });
    }
    if source.same_order(target) {
        return Ok(value);
    }

    trace!(
        from = %graph.axes().describe(source),
        to = %graph.axes().describe(target),
        "sum_to"
    );
    Ok(graph.add_op(OpKind::SumTo, &[value], target.clone()))
}

#[cfg(test)]
mod tests {
    use rten_tensor::Tensor;
    use rten_tensor::prelude::*;
    use rten_tensor::rng::XorShiftRng;

    use super::{LayoutError, broadcast, cast, expand_dims, reorder, slice, sum_to, unslice};
    use crate::axes::{AxisError, AxisSet, AxisSpec, Role};
    use crate::graph::Graph;
    use crate::test_util::{fresh_axes, role_axes};

    #[test]
    fn test_cast() {
        let mut g = Graph::new();
        let src = fresh_axes(&mut g, &[2, 3]);
        let x = g.add_value(None, src.clone()).unwrap();

        // Casting to the same axes is a no-op.
        assert_eq!(cast(&mut g, x, &src), Ok(x));

        let dst = role_axes(&mut g, &[Role::Channel, Role::Height]);
        let y = cast(&mut g, x, &dst).unwrap();
        assert_eq!(g.value_axes(y), &dst);
        assert_eq!(g.value_shape(y).unwrap().as_slice(), &[2, 3]);

        let wrong = fresh_axes(&mut g, &[3, 2]);
        assert!(matches!(
            cast(&mut g, x, &wrong),
            Err(LayoutError::CastMismatch { .. })
        ));

        let too_few = fresh_axes(&mut g, &[2]);
        assert!(matches!(
            cast(&mut g, x, &too_few),
            Err(LayoutError::CastMismatch { .. })
        ));
    }

    #[test]
    fn test_expand_dims() {
        let mut g = Graph::new();
        let src = fresh_axes(&mut g, &[4, 5]);
        let x = g.add_value(None, src.clone()).unwrap();

        for position in 0..=2 {
            let d = g.axes_mut().make_axis(AxisSpec::new().role(Role::Depth)).unwrap();
            let y = expand_dims(&mut g, x, d, position).unwrap();
            assert_eq!(g.value_axes(y).position(d), Some(position));
            assert_eq!(g.axes().length(d), Ok(1));
        }

        let d = g.axes_mut().make_axis(AxisSpec::new()).unwrap();
        assert_eq!(
            expand_dims(&mut g, x, d, 3),
            Err(LayoutError::InvalidPosition {
                position: 3,
                len: 2
            })
        );

        let long = g.axes_mut().make_axis(AxisSpec::new().length(2)).unwrap();
        assert!(matches!(
            expand_dims(&mut g, x, long, 0),
            Err(LayoutError::Axis(AxisError::LengthConflict { .. }))
        ));
    }

    #[test]
    fn test_reorder() {
        let mut g = Graph::new();
        let src = fresh_axes(&mut g, &[2, 3, 4]);
        let x = g.add_value(None, src.clone()).unwrap();

        let reversed = AxisSet::new(src.iter().rev()).unwrap();
        let y = reorder(&mut g, x, &reversed).unwrap();
        assert_eq!(g.value_shape(y).unwrap().as_slice(), &[4, 3, 2]);
        assert_eq!(reorder(&mut g, x, &src), Ok(x));

        assert!(matches!(
            reorder(&mut g, x, &src.slice(0..2)),
            Err(LayoutError::NotPermutation { .. })
        ));
    }

    #[test]
    fn test_broadcast_and_sum_to() {
        let mut g = Graph::new();
        let all = fresh_axes(&mut g, &[2, 3]);
        let part = all.slice(1..2);
        let x = g.add_value(None, part.clone()).unwrap();

        let y = broadcast(&mut g, x, &all).unwrap();
        assert_eq!(g.value_shape(y).unwrap().as_slice(), &[2, 3]);
        assert!(matches!(
            broadcast(&mut g, y, &part),
            Err(LayoutError::NotBroadcastable { .. })
        ));

        let z = sum_to(&mut g, y, &part).unwrap();
        assert_eq!(g.value_axes(z), &part);
        assert!(sum_to(&mut g, x, &all).is_err());
    }

    #[test]
    fn test_slice_unslice() {
        let mut g = Graph::new();
        let src = fresh_axes(&mut g, &[1, 3]);
        let x = g.add_value(None, src.clone()).unwrap();

        let y = slice(&mut g, x, 0, 0).unwrap();
        assert_eq!(g.value_axes(y), &src.slice(1..2));
        assert_eq!(
            slice(&mut g, x, 0, 1),
            Err(LayoutError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(
            slice(&mut g, x, 2, 0),
            Err(LayoutError::IndexOutOfRange { index: 2, len: 2 })
        );

        let z = unslice(&mut g, y, src.get(0).unwrap(), 0, 0).unwrap();
        assert_eq!(g.value_axes(z), &src);
    }

    #[test]
    fn test_cast_reorder_round_trip() {
        let mut g = Graph::new();
        let src = fresh_axes(&mut g, &[2, 3, 4]);
        let x = g.add_value(None, src.clone()).unwrap();

        let renamed = fresh_axes(&mut g, &[2, 3, 4]);
        let y = cast(&mut g, x, &renamed).unwrap();
        let permuted = AxisSet::new([2, 0, 1].map(|i| renamed.get(i).unwrap())).unwrap();
        let y = reorder(&mut g, y, &permuted).unwrap();
        let y = reorder(&mut g, y, &renamed).unwrap();
        let y = cast(&mut g, y, &src).unwrap();

        let mut rng = XorShiftRng::new(1234);
        let input = Tensor::<f32>::rand(&[2, 3, 4], &mut rng);
        let result = g.run(&[(x, &input)], &[y]).unwrap();
        assert_eq!(result[0].shape(), input.shape());
        assert_eq!(result[0].to_vec(), input.to_vec());
    }

    #[test]
    fn test_expand_slice_round_trip() {
        let mut g = Graph::new();
        let src = fresh_axes(&mut g, &[3, 2]);
        let x = g.add_value(None, src).unwrap();
        let d = g.axes_mut().make_axis(AxisSpec::new().role(Role::Depth)).unwrap();

        let y = expand_dims(&mut g, x, d, 1).unwrap();
        let y = slice(&mut g, y, 1, 0).unwrap();

        let input = Tensor::from_data(&[3, 2], vec![1., 2., 3., 4., 5., 6.]);
        let result = g.run(&[(x, &input)], &[y]).unwrap();
        assert_eq!(result[0].to_vec(), input.to_vec());
    }
}
