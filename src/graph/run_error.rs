use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::ops::OpError;

/// Errors that occur when running a graph.
#[derive(Debug)]
pub struct RunError(RunErrorImpl);

impl RunError {
    /// Name of the node that this error relates to, if any.
    pub fn node_name(&self) -> Option<&str> {
        self.0.node_name()
    }

    /// Return the general category of error.
    pub fn kind(&self) -> RunErrorKind {
        self.0.kind()
    }

    /// Return the operator error, if this error was raised while running an
    /// operator.
    pub fn op_error(&self) -> Option<&OpError> {
        match &self.0 {
            RunErrorImpl::OperatorError { error, .. } => Some(error),
            _ => None,
        }
    }

    pub(crate) fn invalid_node_id() -> Self {
        RunErrorImpl::InvalidNodeId.into()
    }

    pub(crate) fn missing_input(name: String) -> Self {
        RunErrorImpl::MissingInput(name).into()
    }

    pub(crate) fn input_mismatch(name: String, expected: Vec<usize>, actual: Vec<usize>) -> Self {
        RunErrorImpl::InputMismatch {
            name,
            expected,
            actual,
        }
        .into()
    }

    pub(crate) fn op_error_in(name: String, op: &'static str, error: OpError) -> Self {
        RunErrorImpl::OperatorError { name, op, error }.into()
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.0 {
            RunErrorImpl::OperatorError { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<RunErrorImpl> for RunError {
    fn from(inner: RunErrorImpl) -> Self {
        Self(inner)
    }
}

/// The category of graph execution error. See [`RunError::kind`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum RunErrorKind {
    /// An input or output node was not found.
    NodeNotFound,
    /// An input was missing or did not match the shape of its value node.
    InputMismatch,
    /// An error occurred when running an operator.
    OperatorError,
}

/// Internal implementation of [`RunError`].
#[derive(Debug)]
enum RunErrorImpl {
    /// An input or output node ID is invalid
    InvalidNodeId,

    /// A value node needed to compute the outputs was not supplied.
    MissingInput(String),

    /// A supplied input has a different shape than its value node.
    InputMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Execution of an operator failed
    OperatorError {
        /// Name of the operator node.
        name: String,
        op: &'static str,
        error: OpError,
    },
}

impl RunErrorImpl {
    fn kind(&self) -> RunErrorKind {
        type Kind = RunErrorKind;

        match self {
            Self::InvalidNodeId => Kind::NodeNotFound,
            Self::MissingInput(_) | Self::InputMismatch { .. } => Kind::InputMismatch,
            Self::OperatorError { .. } => Kind::OperatorError,
        }
    }

    fn node_name(&self) -> Option<&str> {
        match self {
            Self::InvalidNodeId => None,
            Self::MissingInput(name) => Some(name),
            Self::InputMismatch { name, .. } => Some(name),
            Self::OperatorError { name, .. } => Some(name),
        }
    }
}

impl Display for RunErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNodeId => write!(f, "node ID is invalid"),
            Self::MissingInput(name) => write!(f, "no value supplied for input \"{}\"", name),
            Self::InputMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "input \"{}\" has shape {:?} but expected {:?}",
                name, actual, expected
            ),
            Self::OperatorError { name, op, error } => {
                write!(f, "operator \"{}\" ({}) failed: {}", name, op, error)
            }
        }
    }
}
