use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::import_error::{ImportError, ImportErrorImpl};
use crate::attrs::OperatorDef;
use crate::graph::{Graph, NodeId};
use crate::lower;
use crate::ops::OpError;

/// Function which lowers one operator, given the graph values of its inputs.
pub type LowerFn = fn(&mut Graph, &OperatorDef, &[NodeId]) -> Result<NodeId, OpError>;

/// Operator types which can be imported.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub enum OpType {
    Conv,
    MaxPool,
    AveragePool,
    FC,
    SquaredL2Distance,
}

impl OpType {
    /// All supported operator types.
    pub const ALL: [OpType; 5] = [
        OpType::Conv,
        OpType::MaxPool,
        OpType::AveragePool,
        OpType::FC,
        OpType::SquaredL2Distance,
    ];

    /// Return the operator type name, as used in model files.
    pub fn name(self) -> &'static str {
        match self {
            OpType::Conv => "Conv",
            OpType::MaxPool => "MaxPool",
            OpType::AveragePool => "AveragePool",
            OpType::FC => "FC",
            OpType::SquaredL2Distance => "SquaredL2Distance",
        }
    }

    /// Return the function which lowers this operator type.
    pub fn lower_fn(self) -> LowerFn {
        match self {
            OpType::Conv => lower::conv,
            OpType::MaxPool => max_pool,
            OpType::AveragePool => average_pool,
            OpType::FC => lower::fc,
            OpType::SquaredL2Distance => lower::squared_l2_distance,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for OpType {
    type Err = ImportError;

    fn from_str(name: &str) -> Result<OpType, ImportError> {
        OpType::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| {
                ImportError::for_node(None, name, ImportErrorImpl::UnknownOperator(name.into()))
            })
    }
}

fn max_pool(graph: &mut Graph, def: &OperatorDef, inputs: &[NodeId]) -> Result<NodeId, OpError> {
    lower::pool(graph, def, inputs, "max")
}

fn average_pool(
    graph: &mut Graph,
    def: &OperatorDef,
    inputs: &[NodeId],
) -> Result<NodeId, OpError> {
    lower::pool(graph, def, inputs, "avg")
}

/// Lower an operator into `graph`, dispatching on its type name.
pub fn lower_op(
    graph: &mut Graph,
    def: &OperatorDef,
    inputs: &[NodeId],
) -> Result<NodeId, ImportError> {
    let name = def.name.as_deref();
    let op_type: OpType = def.op_type.parse().map_err(|_| {
        ImportError::for_node(
            name,
            &def.op_type,
            ImportErrorImpl::UnknownOperator(def.op_type.clone()),
        )
    })?;

    debug!(op_type = %op_type, name = name.unwrap_or(""), "lowering operator");

    op_type.lower_fn()(graph, def, inputs).map_err(|err| {
        ImportError::for_node(name, op_type.name(), ImportErrorImpl::OperatorError(err))
    })
}
