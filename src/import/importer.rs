use rten_tensor::Tensor;
use rten_tensor::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::dispatch::lower_op;
use super::import_error::{ImportError, ImportErrorImpl};
use crate::attrs::OperatorDef;
use crate::axes::{AxisSet, AxisSpec};
use crate::graph::{Graph, NodeId};

/// How the importer handles an operator which cannot be imported.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ErrorPolicy {
    /// Stop and return the error.
    #[default]
    Abort,

    /// Log the error, record the operator as skipped and continue with the
    /// next operator. Operators which consume outputs of a skipped operator
    /// fail in turn.
    SkipNode,
}

/// Options which customize how operators are imported.
#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    error_policy: ErrorPolicy,
}

impl ImportOptions {
    pub fn new() -> ImportOptions {
        ImportOptions::default()
    }

    /// Set how operators which fail to import are handled.
    pub fn error_policy(&mut self, policy: ErrorPolicy) -> &mut Self {
        self.error_policy = policy;
        self
    }

    /// Create an importer with these options.
    pub fn importer(&self) -> Importer {
        Importer {
            graph: Graph::new(),
            values: FxHashMap::default(),
            options: self.clone(),
            skipped: Vec::new(),
        }
    }
}

/// Builds a [`Graph`] from a sequence of operator definitions.
///
/// Values are referred to by name. Graph inputs and constants are added
/// first, then operators are imported in order. Each operator's inputs must
/// name values defined earlier, and its result is registered under its
/// output name (or its operator name, if it has no outputs). Defining a name
/// again replaces the earlier value, as operators in a net may update a
/// value in place.
#[derive(Debug)]
pub struct Importer {
    graph: Graph,
    values: FxHashMap<String, NodeId>,
    options: ImportOptions,
    skipped: Vec<ImportError>,
}

impl Default for Importer {
    fn default() -> Self {
        Self::new()
    }
}

impl Importer {
    /// Create an importer with default options.
    pub fn new() -> Importer {
        ImportOptions::default().importer()
    }

    /// Add a graph input with new axes of the given lengths.
    pub fn add_input(&mut self, name: &str, lengths: &[usize]) -> Result<NodeId, ImportError> {
        let invalid = |err| ImportError::for_value(name, ImportErrorImpl::InvalidShape(err));
        let axes = self.make_axes(lengths).map_err(invalid)?;
        let id = self.graph.add_value(Some(name), axes).map_err(invalid)?;
        self.values.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add a constant, such as a trained weight, with new axes matching the
    /// shape of `data`.
    pub fn add_constant(&mut self, name: &str, data: Tensor<f32>) -> Result<NodeId, ImportError> {
        let axes = self
            .make_axes(data.shape())
            .map_err(|err| ImportError::for_value(name, ImportErrorImpl::InvalidShape(err)))?;
        let id = self
            .graph
            .add_constant(Some(name), axes, data)
            .map_err(|err| ImportError::for_value(name, ImportErrorImpl::InvalidConstant(err)))?;
        self.values.insert(name.to_string(), id);
        Ok(id)
    }

    fn make_axes(&mut self, lengths: &[usize]) -> Result<AxisSet, crate::axes::AxisError> {
        let ids = lengths
            .iter()
            .map(|&len| self.graph.axes_mut().make_axis(AxisSpec::new().length(len)))
            .collect::<Result<Vec<_>, _>>()?;
        AxisSet::new(ids)
    }

    /// Lower one operator and register its result.
    ///
    /// Errors are returned regardless of the error policy.
    pub fn import_op(&mut self, def: &OperatorDef) -> Result<NodeId, ImportError> {
        let name = def.name.as_deref();
        let fail = |kind| ImportError::for_node(name, &def.op_type, kind);

        if def.outputs.len() > 1 {
            return Err(fail(ImportErrorImpl::OutputCount(def.outputs.len())));
        }
        let inputs = def
            .inputs
            .iter()
            .map(|input| {
                self.values
                    .get(input)
                    .copied()
                    .ok_or_else(|| fail(ImportErrorImpl::MissingInput(input.clone())))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = lower_op(&mut self.graph, def, &inputs)?;

        let output_name = def.outputs.first().map(|s| s.as_str()).or(name);
        if let Some(result_name) = name.or(output_name) {
            self.graph.set_node_name(output, result_name);
        }
        if let Some(output_name) = output_name {
            self.values.insert(output_name.to_string(), output);
        }
        debug!(
            op_type = %def.op_type,
            output = output_name.unwrap_or(""),
            shape = ?self.graph.value_shape(output).ok(),
            "imported operator"
        );

        Ok(output)
    }

    /// Import a sequence of operators in order.
    ///
    /// With [`ErrorPolicy::SkipNode`], failed operators are recorded in
    /// [`skipped`](Importer::skipped) and importing continues.
    pub fn import_ops<'a>(
        &mut self,
        defs: impl IntoIterator<Item = &'a OperatorDef>,
    ) -> Result<(), ImportError> {
        for def in defs {
            match self.import_op(def) {
                Ok(_) => {}
                Err(err) if self.options.error_policy == ErrorPolicy::SkipNode => {
                    warn!(error = %err, "skipping operator");
                    self.skipped.push(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Return the errors of operators skipped under [`ErrorPolicy::SkipNode`].
    pub fn skipped(&self) -> &[ImportError] {
        &self.skipped
    }

    /// Look up the value registered under `name`.
    pub fn get_op_by_name(&self, name: &str) -> Option<NodeId> {
        self.values.get(name).copied()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use rten_lower_testing::TestCases;
    use rten_tensor::Tensor;
    use rten_tensor::prelude::*;
    use rten_tensor::rng::XorShiftRng;

    use super::{ErrorPolicy, ImportOptions, Importer};
    use crate::attrs::OperatorDef;
    use crate::import::ImportErrorKind;

    fn lenet_ops() -> Vec<OperatorDef> {
        vec![
            OperatorDef::new("Conv")
                .with_name("conv1")
                .with_input("data")
                .with_input("conv1_w")
                .with_input("conv1_b")
                .with_output("conv1")
                .with_arg("order", "NCHW")
                .with_arg("stride", 1i64),
            OperatorDef::new("MaxPool")
                .with_name("pool1")
                .with_input("conv1")
                .with_output("pool1")
                .with_arg("kernel", 2i64)
                .with_arg("stride", 2i64),
        ]
    }

    fn lenet_importer(options: &ImportOptions) -> Importer {
        let mut rng = XorShiftRng::new(1);
        let mut importer = options.importer();
        importer.add_input("data", &[4, 1, 13, 13]).unwrap();
        importer
            .add_constant("conv1_w", Tensor::rand(&[6, 1, 2, 2], &mut rng))
            .unwrap();
        importer
            .add_constant("conv1_b", Tensor::rand(&[6], &mut rng))
            .unwrap();
        importer
    }

    #[test]
    fn test_import_ops() {
        let mut importer = lenet_importer(&ImportOptions::new());
        importer.import_ops(&lenet_ops()).unwrap();

        let pool = importer.get_op_by_name("pool1").unwrap();
        let graph = importer.graph();
        assert_eq!(graph.value_shape(pool).unwrap().as_slice(), &[4, 6, 6, 6]);
        assert_eq!(graph.node_name(pool), "pool1");
        assert_eq!(graph.get_node_id("conv1"), importer.get_op_by_name("conv1"));
        assert!(importer.skipped().is_empty());

        let data = importer.get_op_by_name("data").unwrap();
        let input = Tensor::<f32>::zeros(&[4, 1, 13, 13]);
        let graph = importer.into_graph();
        let out = graph.run(&[(data, &input)], &[pool]).unwrap();
        assert_eq!(out[0].shape(), &[4, 6, 6, 6]);
    }

    #[test]
    fn test_import_errors() {
        #[derive(Debug)]
        struct Case {
            def: OperatorDef,
            expected: ImportErrorKind,
        }

        let cases = [
            Case {
                def: OperatorDef::new("Softmax").with_input("data"),
                expected: ImportErrorKind::UnknownOperator,
            },
            Case {
                def: OperatorDef::new("MaxPool").with_input("missing"),
                expected: ImportErrorKind::MissingInput,
            },
            Case {
                def: OperatorDef::new("MaxPool")
                    .with_input("data")
                    .with_output("a")
                    .with_output("b"),
                expected: ImportErrorKind::InvalidOutputs,
            },
            Case {
                def: OperatorDef::new("MaxPool").with_input("data"),
                expected: ImportErrorKind::OperatorError,
            },
        ];

        cases.test_each(|case| {
            let mut importer = Importer::new();
            importer.add_input("data", &[1, 1, 4, 4]).unwrap();
            let err = importer.import_op(&case.def).unwrap_err();
            assert_eq!(err.kind(), case.expected);
        })
    }

    #[test]
    fn test_invalid_input() {
        let mut importer = Importer::new();
        let err = importer.add_input("data", &[1, 0, 4, 4]).unwrap_err();
        assert_eq!(err.kind(), ImportErrorKind::InvalidValue);
        assert_eq!(err.node(), Some("data"));
        assert!(importer.get_op_by_name("data").is_none());
    }

    #[test]
    fn test_error_policy() {
        let mut ops = lenet_ops();
        ops[0] = ops[0].clone().with_arg("stride", 1i64);

        // Abort on the first failure.
        let mut importer = lenet_importer(&ImportOptions::new());
        let err = importer.import_ops(&ops).unwrap_err();
        assert_eq!(err.node(), Some("conv1"));
        assert!(importer.get_op_by_name("pool1").is_none());

        // Skip the failed operator and operators which depend on it.
        let mut options = ImportOptions::new();
        options.error_policy(ErrorPolicy::SkipNode);
        let mut importer = lenet_importer(&options);
        importer.import_ops(&ops).unwrap();

        let skipped: Vec<_> = importer
            .skipped()
            .iter()
            .map(|err| (err.node(), err.kind()))
            .collect();
        assert_eq!(
            skipped,
            [
                (Some("conv1"), ImportErrorKind::OperatorError),
                (Some("pool1"), ImportErrorKind::MissingInput),
            ]
        );
    }
}
