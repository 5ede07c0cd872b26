use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::axes::AxisError;
use crate::ops::OpError;

/// Errors that occur when importing operators into a graph.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportError {
    inner: ImportErrorImpl,
    node: Option<String>,
    op_type: Option<String>,
}

impl ImportError {
    pub(crate) fn new(kind: ImportErrorImpl) -> Self {
        Self {
            inner: kind,
            node: None,
            op_type: None,
        }
    }

    pub(crate) fn for_value(name: &str, kind: ImportErrorImpl) -> Self {
        Self {
            inner: kind,
            node: Some(name.to_string()),
            op_type: None,
        }
    }

    pub(crate) fn for_node(node: Option<&str>, op_type: &str, kind: ImportErrorImpl) -> Self {
        Self {
            inner: kind,
            node: node.map(|n| n.to_string()),
            op_type: Some(op_type.to_string()),
        }
    }

    /// The name of the operator or value that this error relates to.
    ///
    /// This can be `None` if the operator doesn't have a name.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// The type of the operator that this error relates to, if any.
    pub fn op_type(&self) -> Option<&str> {
        self.op_type.as_deref()
    }

    /// Return the category of error.
    pub fn kind(&self) -> ImportErrorKind {
        self.inner.kind()
    }

    /// Return the operator error, if this error was raised while lowering an
    /// operator.
    pub fn op_error(&self) -> Option<&OpError> {
        match &self.inner {
            ImportErrorImpl::OperatorError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.node.as_deref(), self.op_type.as_deref()) {
            (Some(node), Some(op_type)) => {
                write!(f, "in node \"{}\" ({}): {}", node, op_type, self.inner)
            }
            (Some(node), None) => write!(f, "in node \"{}\": {}", node, self.inner),
            (None, Some(op_type)) => write!(f, "in {} operator: {}", op_type, self.inner),
            (None, None) => self.inner.fmt(f),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}

impl From<ImportErrorImpl> for ImportError {
    fn from(val: ImportErrorImpl) -> Self {
        Self::new(val)
    }
}

/// Categories of error when importing operators.
///
/// See [`ImportError::kind`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ImportErrorKind {
    /// The operator type has no lowering.
    UnknownOperator,

    /// An operator input names a value which has not been defined.
    MissingInput,

    /// The operator declares an unsupported number of outputs.
    InvalidOutputs,

    /// A graph input or constant could not be created.
    InvalidValue,

    /// Lowering the operator failed.
    OperatorError,
}

/// The internal implementation of [`ImportError`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ImportErrorImpl {
    UnknownOperator(String),
    MissingInput(String),
    OutputCount(usize),
    InvalidShape(AxisError),
    InvalidConstant(OpError),
    OperatorError(OpError),
}

impl ImportErrorImpl {
    fn kind(&self) -> ImportErrorKind {
        match self {
            Self::UnknownOperator(_) => ImportErrorKind::UnknownOperator,
            Self::MissingInput(_) => ImportErrorKind::MissingInput,
            Self::OutputCount(_) => ImportErrorKind::InvalidOutputs,
            Self::InvalidShape(_) | Self::InvalidConstant(_) => ImportErrorKind::InvalidValue,
            Self::OperatorError(_) => ImportErrorKind::OperatorError,
        }
    }
}

impl Display for ImportErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOperator(op_type) => write!(f, "unknown operator type \"{}\"", op_type),
            Self::MissingInput(name) => write!(f, "input \"{}\" is not defined", name),
            Self::OutputCount(count) => {
                write!(f, "operator must have at most one output, found {}", count)
            }
            Self::InvalidShape(err) => write!(f, "invalid shape: {}", err),
            Self::InvalidConstant(err) => write!(f, "invalid constant: {}", err),
            Self::OperatorError(err) => write!(f, "{}", err),
        }
    }
}

impl Error for ImportErrorImpl {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidShape(err) => Some(err),
            Self::InvalidConstant(err) | Self::OperatorError(err) => Some(err),
            _ => None,
        }
    }
}
