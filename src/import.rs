//! Import of operators from model-format front-ends.
//!
//! Front-ends parse model files into [`OperatorDef`](crate::attrs::OperatorDef)s.
//! [`lower_op`] maps an operator's type name to its lowering and
//! [`Importer`] wires a sequence of operators into one [`Graph`](crate::Graph),
//! resolving their inputs by name.
//!
//! ```
//! use rten_lower::attrs::OperatorDef;
//! use rten_lower::import::Importer;
//!
//! let mut importer = Importer::new();
//! importer.add_input("data", &[8, 3, 32, 32]).unwrap();
//!
//! let pool = OperatorDef::new("MaxPool")
//!     .with_name("pool1")
//!     .with_input("data")
//!     .with_output("pool1")
//!     .with_arg("kernel", 2i64)
//!     .with_arg("stride", 2i64);
//! importer.import_op(&pool).unwrap();
//!
//! let id = importer.get_op_by_name("pool1").unwrap();
//! let shape = importer.graph().value_shape(id).unwrap();
//! assert_eq!(shape.as_slice(), &[8, 3, 16, 16]);
//! ```

mod dispatch;
mod import_error;
mod importer;

pub use dispatch::{LowerFn, OpType, lower_op};
pub use import_error::{ImportError, ImportErrorKind};
pub use importer::{ErrorPolicy, ImportOptions, Importer};
