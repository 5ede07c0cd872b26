use rten_tensor::Tensor;
use rten_tensor::prelude::*;
use smallvec::SmallVec;

use crate::axes::{AxisError, AxisRegistry, AxisSet};
use crate::ops::{OpError, OpKind};

mod deriv;
mod node;
mod node_id;
mod run;
mod run_error;

pub use deriv::DerivError;
pub use node::{Constant, Node, OperatorNode, ValueNode};
pub use node_id::NodeId;
pub use run_error::{RunError, RunErrorKind};

/// A computation graph whose values are described by axis sets.
///
/// The graph owns the [`AxisRegistry`] for all axes used by its values. Nodes
/// are appended in topological order: an operator's inputs always have
/// smaller IDs than the operator itself.
#[derive(Debug, Default)]
pub struct Graph {
    axes: AxisRegistry,
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Return the registry which owns the axes of this graph's values.
    pub fn axes(&self) -> &AxisRegistry {
        &self.axes
    }

    pub fn axes_mut(&mut self) -> &mut AxisRegistry {
        &mut self.axes
    }

    /// Return the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a value node, which is supplied as an input when the graph is run.
    ///
    /// All axes must have resolved lengths.
    pub fn add_value(&mut self, name: Option<&str>, axes: AxisSet) -> Result<NodeId, AxisError> {
        self.axes.lengths(&axes)?;
        Ok(self.push(Node::Value(ValueNode {
            name: name.map(|s| s.to_owned()),
            axes,
        })))
    }

    /// Add a constant node.
    ///
    /// The shape of `data` must match the lengths of `axes`.
    pub fn add_constant(
        &mut self,
        name: Option<&str>,
        axes: AxisSet,
        data: Tensor<f32>,
    ) -> Result<NodeId, OpError> {
        let lengths = self.axes.lengths(&axes)?;
        if data.shape() != lengths.as_slice() {
            return Err(OpError::incompatible(format!(
                "constant shape {:?} does not match axes {}",
                data.shape(),
                self.axes.describe(&axes)
            )));
        }
        Ok(self.push(Node::Constant(Constant {
            name: name.map(|s| s.to_owned()),
            axes,
            data,
        })))
    }

    /// Add an operator node.
    ///
    /// Callers are responsible for validating that `axes` is the correct
    /// output shape for `op` applied to `inputs`.
    pub(crate) fn add_op(&mut self, op: OpKind, inputs: &[NodeId], axes: AxisSet) -> NodeId {
        debug_assert!(inputs.iter().all(|id| id.as_usize() < self.nodes.len()));
        self.push(Node::Operator(OperatorNode {
            name: None,
            op,
            inputs: SmallVec::from_slice(inputs),
            axes,
        }))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId::from_u32(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Retrieve a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_usize())
    }

    /// Return the axes of the value produced by a node.
    ///
    /// Panics if the node does not belong to this graph.
    pub fn value_axes(&self, id: NodeId) -> &AxisSet {
        self.nodes[id.as_usize()].axes()
    }

    /// Return the lengths of the value produced by a node.
    pub fn value_shape(&self, id: NodeId) -> Result<SmallVec<[usize; 5]>, AxisError> {
        self.axes.lengths(self.value_axes(id))
    }

    /// Return the debug name for a node.
    pub fn node_name(&self, id: NodeId) -> String {
        self.get_node(id)
            .and_then(|node| node.name())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("[ID: {}]", id))
    }

    /// Set or replace the name of a node.
    pub fn set_node_name(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.nodes.get_mut(id.as_usize()) {
            node.set_name(Some(name.to_string()));
        }
    }

    /// Find a node in the graph by name.
    pub fn get_node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.name() == Some(name))
            .map(|pos| NodeId::from_u32(pos as u32))
    }

    /// Return the IDs of value nodes, which must be supplied when running the
    /// graph.
    pub fn input_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, Node::Value(_)))
            .map(|(pos, _)| NodeId::from_u32(pos as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rten_tensor::Tensor;
    use rten_tensor::prelude::*;

    use super::{Graph, Node};
    use crate::axes::{AxisError, AxisSpec, Role};
    use crate::ops::{OpError, OpKind, scale};

    #[test]
    fn test_add_value() {
        let mut g = Graph::new();
        let n = g.axes_mut().make_axis(AxisSpec::new().batch().length(2)).unwrap();
        let c = g.axes_mut().make_axis(AxisSpec::new().role(Role::Channel)).unwrap();

        let axes = g.axes().make_axes([n, c]).unwrap();
        assert_eq!(
            g.add_value(Some("x"), axes.clone()),
            Err(AxisError::UnresolvedLength(c))
        );

        g.axes_mut().set_length(c, 3).unwrap();
        let x = g.add_value(Some("x"), axes.clone()).unwrap();
        assert_eq!(g.value_axes(x), &axes);
        assert_eq!(g.value_shape(x).unwrap().as_slice(), &[2, 3]);
        assert_eq!(g.get_node_id("x"), Some(x));
        assert_eq!(g.input_ids(), [x]);
        assert!(matches!(g.get_node(x), Some(Node::Value(_))));
    }

    #[test]
    fn test_add_constant() {
        let mut g = Graph::new();
        let c = g.axes_mut().make_axis(AxisSpec::new().length(3)).unwrap();
        let axes = g.axes().make_axes([c]).unwrap();

        let err = g
            .add_constant(None, axes.clone(), Tensor::from_data(&[2], vec![1., 2.]))
            .err()
            .unwrap();
        assert!(matches!(err, OpError::IncompatibleInputShapes(_)));

        let id = g
            .add_constant(None, axes, Tensor::from_data(&[3], vec![1., 2., 3.]))
            .unwrap();
        let constant = g.get_node(id).and_then(|n| n.as_constant()).unwrap();
        assert_eq!(constant.data().to_vec(), [1., 2., 3.]);
        assert_eq!(g.node_name(id), format!("[ID: {}]", id));

        g.set_node_name(id, "bias");
        assert_eq!(g.node_name(id), "bias");
    }

    #[test]
    fn test_operator_node() {
        let mut g = Graph::new();
        let c = g.axes_mut().make_axis(AxisSpec::new().length(3)).unwrap();
        let axes = g.axes().make_axes([c]).unwrap();
        let x = g.add_value(Some("x"), axes.clone()).unwrap();
        let y = scale(&mut g, x, 2.);

        assert!(g.get_node(x).unwrap().as_operator().is_none());
        let op = g.get_node(y).and_then(|n| n.as_operator()).unwrap();
        assert_eq!(op.op(), &OpKind::Scale(2.));
        assert_eq!(op.inputs(), [x]);
        assert_eq!(op.axes(), &axes);
    }
}
