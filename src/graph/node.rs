use rten_tensor::Tensor;
use smallvec::SmallVec;

use super::NodeId;
use crate::axes::AxisSet;
use crate::ops::OpKind;

#[derive(Debug)]
pub enum Node {
    Operator(OperatorNode),
    Constant(Constant),
    /// A value supplied when the graph is run.
    Value(ValueNode),
}

impl Node {
    /// Return the debug name of this node
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Operator(node) => node.name.as_deref(),
            Node::Constant(node) => node.name.as_deref(),
            Node::Value(node) => node.name.as_deref(),
        }
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        match self {
            Node::Operator(node) => node.name = name,
            Node::Constant(node) => node.name = name,
            Node::Value(node) => node.name = name,
        }
    }

    /// Return the axes of the value produced by this node.
    pub fn axes(&self) -> &AxisSet {
        match self {
            Node::Operator(node) => &node.axes,
            Node::Constant(node) => &node.axes,
            Node::Value(node) => &node.axes,
        }
    }

    /// Return the contained operator, if this an operator node.
    pub fn as_operator(&self) -> Option<&OperatorNode> {
        match self {
            Node::Operator(op) => Some(op),
            _ => None,
        }
    }

    /// Return the contained constant, if this a constant node.
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Node::Constant(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct OperatorNode {
    pub(super) name: Option<String>,
    pub(super) op: OpKind,
    pub(super) inputs: SmallVec<[NodeId; 2]>,
    pub(super) axes: AxisSet,
}

impl OperatorNode {
    pub fn op(&self) -> &OpKind {
        &self.op
    }

    /// IDs of the operator's inputs, in order.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn axes(&self) -> &AxisSet {
        &self.axes
    }
}

#[derive(Debug)]
pub struct Constant {
    pub(super) name: Option<String>,
    pub(super) axes: AxisSet,
    pub(super) data: Tensor<f32>,
}

impl Constant {
    /// Return the tensor data. Its shape matches the lengths of the
    /// constant's axes.
    pub fn data(&self) -> &Tensor<f32> {
        &self.data
    }
}

#[derive(Debug)]
pub struct ValueNode {
    pub(super) name: Option<String>,
    pub(super) axes: AxisSet,
}
