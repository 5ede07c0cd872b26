use std::error::Error;
use std::fmt;

use rustc_hash::FxHashMap;
use tracing::trace;

use super::{Graph, NodeId};
use crate::canonicalize::{broadcast, cast, reorder, slice, sum_to, unslice};
use crate::ops::{OpError, OpKind, add, conv_backprop_data, pooling_backprop, scale};

/// Errors when building the gradient of a value.
#[derive(Clone, Debug, PartialEq)]
pub enum DerivError {
    /// The output does not depend on the value that the gradient is taken
    /// with respect to.
    NotDependent,

    /// The axes of the output gradient are not the axes of the output.
    DeltaMismatch,

    /// The gradient of an operator input cannot be computed.
    Unsupported { op: &'static str, input: usize },

    /// An error occurred when adding a gradient operator.
    Op(OpError),
}

impl From<OpError> for DerivError {
    fn from(err: OpError) -> DerivError {
        DerivError::Op(err)
    }
}

impl From<crate::canonicalize::LayoutError> for DerivError {
    fn from(err: crate::canonicalize::LayoutError) -> DerivError {
        DerivError::Op(err.into())
    }
}

impl fmt::Display for DerivError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivError::NotDependent => write!(f, "output does not depend on value"),
            DerivError::DeltaMismatch => {
                write!(f, "gradient axes do not match output axes")
            }
            DerivError::Unsupported { op, input } => {
                write!(f, "gradient of {} input {} is not supported", op, input)
            }
            DerivError::Op(err) => write!(f, "{}", err),
        }
    }
}

impl Error for DerivError {}

impl Graph {
    /// Add nodes which compute the gradient of `output` with respect to
    /// `wrt`, given the gradient `delta` of some scalar loss with respect to
    /// `output`.
    ///
    /// `delta` must have the same axes as `output`, in any order. The result
    /// has the axes of `wrt`.
    pub fn deriv(
        &mut self,
        output: NodeId,
        wrt: NodeId,
        delta: NodeId,
    ) -> Result<NodeId, DerivError> {
        if !self.value_axes(delta).same_axes(self.value_axes(output)) {
            return Err(DerivError::DeltaMismatch);
        }
        if wrt > output {
            return Err(DerivError::NotDependent);
        }

        // Mark nodes between `wrt` and `output` which depend on `wrt`.
        let first = wrt.as_usize();
        let mut depends = vec![false; output.as_usize() + 1 - first];
        depends[0] = true;
        for i in first + 1..=output.as_usize() {
            if let Some(op_node) = self.nodes[i].as_operator() {
                depends[i - first] = op_node
                    .inputs
                    .iter()
                    .any(|id| id.as_usize() >= first && depends[id.as_usize() - first]);
            }
        }
        if !depends[output.as_usize() - first] {
            return Err(DerivError::NotDependent);
        }

        let output_axes = self.value_axes(output).clone();
        let mut grads: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        grads.insert(output, reorder(self, delta, &output_axes)?);

        for i in (first + 1..=output.as_usize()).rev() {
            let id = NodeId::from_u32(i as u32);
            let Some(&grad) = grads.get(&id) else {
                continue;
            };
            let Some(op_node) = self.nodes[i].as_operator() else {
                continue;
            };
            let op = op_node.op.clone();
            let inputs = op_node.inputs.clone();

            for (input_index, &input) in inputs.iter().enumerate() {
                if input.as_usize() < first || !depends[input.as_usize() - first] {
                    continue;
                }
                let input_grad = self.input_grad(&op, &inputs, input_index, grad)?;
                trace!(op = op.name(), input_index, "added gradient");
                let total = match grads.get(&input) {
                    Some(&prev) => add(self, prev, input_grad)?,
                    None => input_grad,
                };
                grads.insert(input, total);
            }
        }

        grads.get(&wrt).copied().ok_or(DerivError::NotDependent)
    }

    /// Add nodes computing the gradient of one input of an operator, given
    /// the gradient of its output.
    fn input_grad(
        &mut self,
        op: &OpKind,
        inputs: &[NodeId],
        input_index: usize,
        grad: NodeId,
    ) -> Result<NodeId, DerivError> {
        let input = inputs[input_index];
        let input_axes = self.value_axes(input).clone();

        let input_grad = match (op, input_index) {
            (OpKind::Cast, _) => cast(self, grad, &input_axes)?,
            (OpKind::ExpandDims { position }, _) => slice(self, grad, *position, 0)?,
            (OpKind::Reorder, _) => reorder(self, grad, &input_axes)?,
            (OpKind::Broadcast, _) => sum_to(self, grad, &input_axes)?,
            (OpKind::Slice { axis, index }, _) => {
                let removed = input_axes
                    .get(*axis)
                    .ok_or(DerivError::Unsupported { op: op.name(), input: 0 })?;
                unslice(self, grad, removed, *axis, *index)?
            }
            (OpKind::Unslice { axis, index }, _) => slice(self, grad, *axis, *index)?,
            (OpKind::SumTo, _) => broadcast(self, grad, &input_axes)?,
            (OpKind::Pooling(params), 0) => pooling_backprop(self, params, grad, input)?,
            (OpKind::Convolution(params), 0) => {
                conv_backprop_data(self, params, grad, inputs[1], input)?
            }
            (OpKind::Add, 0) | (OpKind::Sub, 0) => grad,
            (OpKind::Add, 1) => sum_to(self, grad, &input_axes)?,
            (OpKind::Sub, 1) => {
                let neg = scale(self, grad, -1.);
                sum_to(self, neg, &input_axes)?
            }
            (OpKind::Scale(factor), _) => scale(self, grad, *factor),
            _ => {
                return Err(DerivError::Unsupported {
                    op: op.name(),
                    input: input_index,
                });
            }
        };
        Ok(input_grad)
    }
}
