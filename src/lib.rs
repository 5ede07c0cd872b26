//! rten-lower builds axis-aware computation graphs from imported neural
//! network operators.
//!
//! Model-format front-ends (eg. a caffe2 net parser) describe each operator as
//! an [`OperatorDef`](attrs::OperatorDef): a type name, input and output names
//! and a list of arguments. This crate lowers those operators into a small set
//! of primitive operators whose values are described by named, role-tagged
//! axes rather than by bare shapes.
//!
//! # Axes
//!
//! Every dimension of every value is an [`Axis`](axes::Axis) owned by the
//! graph's [`AxisRegistry`](axes::AxisRegistry). Axes have an identity, an
//! optional name, a set of [`Role`](axes::Role)s (batch, channel, height ...)
//! and a length which may be unresolved until it is first assigned. The shape
//! of a value is an [`AxisSet`](axes::AxisSet), an ordered set of axes.
//!
//! # Lowering
//!
//! Spatial operators such as convolution and pooling expect their inputs in a
//! fixed internal `[C, D, H, W, N]` axis order. The functions in [`lower`]
//! read operator arguments, use the [`canonicalize`] transforms to convert
//! inputs from their external `NCHW` or `NHWC` layout, derive output axes with
//! [`spatial`] and convert results back to the external layout.
//!
//! # Importing
//!
//! [`import::Importer`] wires a sequence of operator definitions into one
//! [`Graph`], dispatching on the operator type name. The supported operator
//! types are `Conv`, `MaxPool`, `AveragePool`, `FC` and `SquaredL2Distance`.
//!
//! # Running and gradients
//!
//! [`Graph::run`] evaluates a graph with reference kernels, and
//! [`Graph::deriv`] adds nodes computing the gradient of a value. These are
//! used to check lowered graphs numerically.
//!
//! # Logging
//!
//! The crate emits [tracing](https://docs.rs/tracing) events when operators are
//! lowered and imported. No subscriber is installed.

pub mod attrs;
pub mod axes;
pub mod canonicalize;
pub mod graph;
pub mod import;
pub mod lower;
pub mod ops;
pub mod spatial;

#[cfg(test)]
mod test_util;

pub use graph::{Graph, NodeId};
