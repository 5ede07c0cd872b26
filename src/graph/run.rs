use rten_tensor::Tensor;
use rten_tensor::prelude::*;
// Hash keys are `NodeId`s which we allocate ourselves, so DOS resistance is
// not a concern.
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use super::{Graph, Node, NodeId, OperatorNode, RunError};
use crate::ops::layout::{broadcast_axes, permute, reshape, select, sum_axes, unselect};
use crate::ops::{
    OpError, OpKind, add_kernel, conv_backprop_data_kernel, conv_kernel, dot_kernel,
    pool_backprop_kernel, pool_kernel, scale_kernel, squared_l2_kernel, sub_kernel,
};

impl Graph {
    /// Compute the values of `outputs` given values for the graph's inputs.
    ///
    /// Only value nodes that `outputs` depend on need to be supplied. Each
    /// input tensor must have the lengths of its node's axes, in order.
    /// Outputs are returned in the same order as `outputs`.
    ///
    /// This uses straightforward reference kernels and is intended for
    /// checking lowered graphs, not for fast inference.
    pub fn run(
        &self,
        inputs: &[(NodeId, &Tensor<f32>)],
        outputs: &[NodeId],
    ) -> Result<Vec<Tensor<f32>>, RunError> {
        let mut values: FxHashMap<NodeId, Tensor<f32>> = FxHashMap::default();
        for (id, tensor) in inputs {
            let expected = self.value_shape(*id).map_err(|_| RunError::invalid_node_id())?;
            if !matches!(self.get_node(*id), Some(Node::Value(_))) {
                return Err(RunError::invalid_node_id());
            }
            if tensor.shape() != expected.as_slice() {
                return Err(RunError::input_mismatch(
                    self.node_name(*id),
                    expected.to_vec(),
                    tensor.shape().to_vec(),
                ));
            }
            values.insert(*id, (*tensor).clone());
        }

        let plan = self.create_plan(&values, outputs)?;
        trace!(steps = plan.len(), "running graph");

        for id in plan {
            let value = match &self.nodes[id.as_usize()] {
                Node::Value(_) => return Err(RunError::missing_input(self.node_name(id))),
                Node::Constant(constant) => constant.data.clone(),
                Node::Operator(op_node) => {
                    let op_inputs: Vec<&Tensor<f32>> = op_node
                        .inputs
                        .iter()
                        .map(|input_id| &values[input_id])
                        .collect();
                    self.run_op(op_node, &op_inputs).map_err(|err| {
                        RunError::op_error_in(self.node_name(id), op_node.op.name(), err)
                    })?
                }
            };
            values.insert(id, value);
        }

        outputs
            .iter()
            .map(|id| values.get(id).cloned().ok_or_else(RunError::invalid_node_id))
            .collect()
    }

    /// Return the IDs of nodes that must be evaluated to compute `outputs`,
    /// in execution order.
    fn create_plan(
        &self,
        known: &FxHashMap<NodeId, Tensor<f32>>,
        outputs: &[NodeId],
    ) -> Result<Vec<NodeId>, RunError> {
        let mut needed: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack: Vec<NodeId> = Vec::new();
        for &id in outputs {
            if self.get_node(id).is_none() {
                return Err(RunError::invalid_node_id());
            }
            stack.push(id);
        }

        while let Some(id) = stack.pop() {
            if known.contains_key(&id) || !needed.insert(id) {
                continue;
            }
            if let Some(op_node) = self.nodes[id.as_usize()].as_operator() {
                stack.extend(op_node.inputs.iter().copied());
            }
        }

        // Inputs of a node always have smaller IDs, so ascending ID order is
        // a valid execution order.
        let mut plan: Vec<NodeId> = needed.into_iter().collect();
        plan.sort();
        Ok(plan)
    }

    fn run_op(&self, node: &OperatorNode, inputs: &[&Tensor<f32>]) -> Result<Tensor<f32>, OpError> {
        let out_axes = &node.axes;
        let out_shape = self.axes.lengths(out_axes)?;
        let in_axes = |i: usize| self.value_axes(node.inputs[i]);
        let x = inputs[0];

        let output = match &node.op {
            OpKind::Cast | OpKind::ExpandDims { .. } => reshape(x, &out_shape),
            OpKind::Reorder => {
                let perm = in_axes(0).permutation_to(out_axes).ok_or_else(|| {
                    OpError::incompatible("reorder target is not a permutation of its input")
                })?;
                permute(x, &perm)
            }
            OpKind::Broadcast => broadcast_axes(x, in_axes(0), out_axes, &out_shape),
            OpKind::Slice { axis, index } => select(x, *axis, *index),
            OpKind::Unslice { axis, index } => unselect(x, *axis, *index, out_shape[*axis]),
            OpKind::SumTo => sum_axes(x, in_axes(0), out_axes),
            OpKind::Pooling(params) => pool_kernel(x, params, &out_shape),
            OpKind::PoolingBackprop(params) => pool_backprop_kernel(x, inputs[1], params),
            OpKind::Convolution(params) => conv_kernel(x, inputs[1], params, &out_shape),
            OpKind::ConvBackpropData(params) => {
                conv_backprop_data_kernel(x, inputs[1], params, &out_shape)
            }
            OpKind::Add => add_kernel(x, in_axes(0), inputs[1], in_axes(1)),
            OpKind::Sub => sub_kernel(x, in_axes(0), inputs[1], in_axes(1)),
            OpKind::Dot => dot_kernel(x, in_axes(0), inputs[1], in_axes(1)),
            OpKind::SquaredL2 => squared_l2_kernel(x, in_axes(0), out_axes),
            OpKind::Scale(factor) => scale_kernel(x, *factor),
        };
        Ok(output)
    }
}
