use tracing::debug;

use crate::attrs::OperatorDef;
use crate::axes::AxisSet;
use crate::canonicalize::cast;
use crate::graph::{Graph, NodeId};
use crate::ops::{OpError, add, check_input_count, dot, scale, squared_l2, sub};

/// Lower a fully connected layer with inputs `(x, w, bias)`.
///
/// `x` has shape `[batch, features]` and `w` has shape `[outputs, features]`.
/// The result has shape `[batch, outputs]`.
pub fn fc(graph: &mut Graph, _def: &OperatorDef, inputs: &[NodeId]) -> Result<NodeId, OpError> {
    check_input_count(inputs, 3)?;
    let [x, w, bias] = [inputs[0], inputs[1], inputs[2]];

    let x_axes = graph.value_axes(x);
    let w_axes = graph.value_axes(w);
    let (&[x_batch, x_features], &[_, w_features]) = (x_axes.as_slice(), w_axes.as_slice())
    else {
        return Err(OpError::invalid(format!(
            "FC inputs must be 2D, got {} and {}",
            graph.axes().describe(x_axes),
            graph.axes().describe(w_axes)
        )));
    };
    let reg = graph.axes();
    if reg.length(x_features)? != reg.length(w_features)? {
        return Err(OpError::incompatible(format!(
            "FC input features {} do not match weights {}",
            graph.axes().describe(x_axes),
            graph.axes().describe(w_axes)
        )));
    }

    // Share the feature axis so `dot` contracts over it.
    let x = cast(graph, x, &AxisSet::new([x_batch, w_features])?)?;
    let y = dot(graph, x, w)?;

    let bias_axes = AxisSet::new(graph.value_axes(y).last())?;
    let bias = cast(graph, bias, &bias_axes)?;
    let y = add(graph, y, bias)?;

    debug!(output = %graph.axes().describe(graph.value_axes(y)), "lowered FC");

    Ok(y)
}

/// Lower `SquaredL2Distance` with inputs `(x, y)`.
///
/// Computes `sum((x - y)^2) / 2` over all non-batch axes. `y` must have the
/// same shape as `x`.
pub fn squared_l2_distance(
    graph: &mut Graph,
    _def: &OperatorDef,
    inputs: &[NodeId],
) -> Result<NodeId, OpError> {
    check_input_count(inputs, 2)?;
    let [x, y] = [inputs[0], inputs[1]];

    let x_axes = graph.value_axes(x).clone();
    let y = cast(graph, y, &x_axes)?;
    let diff = sub(graph, x, y)?;
    let dist = squared_l2(graph, diff)?;
    Ok(scale(graph, dist, 0.5))
}

#[cfg(test)]
mod tests {
    use rten_lower_testing::TestCases;
    use rten_tensor::Tensor;
    use rten_tensor::prelude::*;
    use rten_tensor::rng::XorShiftRng;
    use rten_tensor::test_util::expect_equal_with_tolerance;

    use super::{fc, squared_l2_distance};
    use crate::attrs::OperatorDef;
    use crate::axes::{AxisSet, AxisSpec};
    use crate::graph::Graph;
    use crate::ops::OpError;
    use crate::test_util::fresh_axes;

    #[test]
    fn test_fc() {
        let mut g = Graph::new();
        let x_axes = fresh_axes(&mut g, &[2, 3]);
        let w_axes = fresh_axes(&mut g, &[4, 3]);
        let bias_axes = fresh_axes(&mut g, &[4]);
        let x = g.add_value(Some("x"), x_axes).unwrap();
        let w = g.add_value(Some("w"), w_axes).unwrap();
        let bias = g.add_value(Some("bias"), bias_axes).unwrap();

        let y = fc(&mut g, &OperatorDef::new("FC"), &[x, w, bias]).unwrap();
        assert_eq!(g.value_shape(y).unwrap().as_slice(), &[2, 4]);

        let mut rng = XorShiftRng::new(99);
        let x_val = Tensor::<f32>::rand(&[2, 3], &mut rng);
        let w_val = Tensor::<f32>::rand(&[4, 3], &mut rng);
        let bias_val = Tensor::<f32>::rand(&[4], &mut rng);
        let result = g
            .run(&[(x, &x_val), (w, &w_val), (bias, &bias_val)], &[y])
            .unwrap()
            .remove(0);

        let mut expected = Tensor::<f32>::zeros(&[2, 4]);
        for i in 0..2 {
            for j in 0..4 {
                expected[[i, j]] =
                    bias_val[[j]] + (0..3).map(|k| x_val[[i, k]] * w_val[[j, k]]).sum::<f32>();
            }
        }
        expect_equal_with_tolerance(&result, &expected, 1e-5, 0.).unwrap();
    }

    #[test]
    fn test_fc_errors() {
        #[derive(Debug)]
        struct Case {
            x_shape: Vec<usize>,
            w_shape: Vec<usize>,
            inputs: usize,
        }

        let cases = [
            // Feature mismatch
            Case {
                x_shape: vec![2, 3],
                w_shape: vec![4, 5],
                inputs: 3,
            },
            Case {
                x_shape: vec![2, 3, 1],
                w_shape: vec![4, 3],
                inputs: 3,
            },
            Case {
                x_shape: vec![2, 3],
                w_shape: vec![4, 3],
                inputs: 2,
            },
        ];

        cases.test_each(|case| {
            let mut g = Graph::new();
            let x_axes = fresh_axes(&mut g, &case.x_shape);
            let w_axes = fresh_axes(&mut g, &case.w_shape);
            let bias_axes = fresh_axes(&mut g, &[4]);
            let inputs = [
                g.add_value(None, x_axes).unwrap(),
                g.add_value(None, w_axes).unwrap(),
                g.add_value(None, bias_axes).unwrap(),
            ];
            let result = fc(&mut g, &OperatorDef::new("FC"), &inputs[..case.inputs]);
            assert!(result.is_err());
        })
    }

    #[test]
    fn test_squared_l2_distance() {
        let mut g = Graph::new();
        let batch = g
            .axes_mut()
            .make_axis(AxisSpec::new().batch().length(2))
            .unwrap();
        let feature = fresh_axes(&mut g, &[3]).first().unwrap();
        let x = g
            .add_value(Some("x"), AxisSet::new([batch, feature]).unwrap())
            .unwrap();
        let y_axes = fresh_axes(&mut g, &[2, 3]);
        let y = g.add_value(Some("y"), y_axes).unwrap();

        let dist = squared_l2_distance(&mut g, &OperatorDef::new("SquaredL2Distance"), &[x, y])
            .unwrap();
        assert_eq!(g.value_axes(dist), &AxisSet::new([batch]).unwrap());

        let x_val = Tensor::from_data(&[2, 3], vec![1., 2., 3., 0., 0., 0.]);
        let y_val = Tensor::from_data(&[2, 3], vec![1., 0., 0., 1., 1., 1.]);
        let out = g.run(&[(x, &x_val), (y, &y_val)], &[dist]).unwrap();
        assert_eq!(out[0].to_vec(), [6.5, 1.5]);

        let short_axes = fresh_axes(&mut g, &[2, 2]);
        let short = g.add_value(None, short_axes).unwrap();
        let err = squared_l2_distance(&mut g, &OperatorDef::new("SquaredL2Distance"), &[x, short]);
        assert!(matches!(err, Err(OpError::Layout(_))));
    }
}
