use rten_tensor::Tensor;
use rten_tensor::prelude::*;

use crate::axes::{AxisSet, Role};
use crate::graph::{Graph, NodeId};
use crate::ops::layout::{broadcast_axes, permute, sum_axes};
use crate::ops::{OpError, OpKind};

/// Check that `b` can be broadcast to `a` and return the output axes.
fn broadcast_output(graph: &Graph, a: NodeId, b: NodeId) -> Result<AxisSet, OpError> {
    let a_axes = graph.value_axes(a);
    let b_axes = graph.value_axes(b);
    if !b_axes.is_subset_of(a_axes) {
        return Err(OpError::incompatible(format!(
            "cannot broadcast {} to {}",
            graph.axes().describe(b_axes),
            graph.axes().describe(a_axes)
        )));
    }
    Ok(a_axes.clone())
}

/// Add `a + b`, where the axes of `b` are a subset of the axes of `a`.
pub fn add(graph: &mut Graph, a: NodeId, b: NodeId) -> Result<NodeId, OpError> {
    let axes = broadcast_output(graph, a, b)?;
    Ok(graph.add_op(OpKind::Add, &[a, b], axes))
}

/// Add `a - b`, where the axes of `b` are a subset of the axes of `a`.
pub fn sub(graph: &mut Graph, a: NodeId, b: NodeId) -> Result<NodeId, OpError> {
    let axes = broadcast_output(graph, a, b)?;
    Ok(graph.add_op(OpKind::Sub, &[a, b], axes))
}

/// Add a dot product which contracts the axes that `a` and `b` have in
/// common.
///
/// The output axes are the remaining axes of `a` followed by the remaining
/// axes of `b`.
pub fn dot(graph: &mut Graph, a: NodeId, b: NodeId) -> Result<NodeId, OpError> {
    let a_axes = graph.value_axes(a);
    let b_axes = graph.value_axes(b);
    let a_free = a_axes.without(b_axes);
    let b_free = b_axes.without(a_axes);
    let out_axes = AxisSet::new(a_free.iter().chain(b_free.iter()))?;
    Ok(graph.add_op(OpKind::Dot, &[a, b], out_axes))
}

/// Add a sum of squares over all axes of `x` except batch axes.
pub fn squared_l2(graph: &mut Graph, x: NodeId) -> Result<NodeId, OpError> {
    let x_axes = graph.value_axes(x);
    let batch_axes: Vec<_> = x_axes
        .iter()
        .filter(|axis| graph.axes().get(*axis).has_role(Role::Batch))
        .collect();
    let out_axes = AxisSet::new(batch_axes)?;
    Ok(graph.add_op(OpKind::SquaredL2, &[x], out_axes))
}

/// Multiply `x` by a constant.
pub fn scale(graph: &mut Graph, x: NodeId, factor: f32) -> NodeId {
    let axes = graph.value_axes(x).clone();
    graph.add_op(OpKind::Scale(factor), &[x], axes)
}

fn zip_broadcast(
    a: &Tensor<f32>,
    a_axes: &AxisSet,
    b: &Tensor<f32>,
    b_axes: &AxisSet,
    op: impl Fn(f32, f32) -> f32,
) -> Tensor<f32> {
    let b = broadcast_axes(b, b_axes, a_axes, a.shape());
    let data: Vec<f32> = a.iter().zip(b.iter()).map(|(x, y)| op(*x, *y)).collect();
    Tensor::from_data(a.shape(), data)
}

pub fn add_kernel(
    a: &Tensor<f32>,
    a_axes: &AxisSet,
    b: &Tensor<f32>,
    b_axes: &AxisSet,
) -> Tensor<f32> {
    zip_broadcast(a, a_axes, b, b_axes, |x, y| x + y)
}

pub fn sub_kernel(
    a: &Tensor<f32>,
    a_axes: &AxisSet,
    b: &Tensor<f32>,
    b_axes: &AxisSet,
) -> Tensor<f32> {
    zip_broadcast(a, a_axes, b, b_axes, |x, y| x - y)
}

/// Reference kernel for [`dot`].
pub fn dot_kernel(
    a: &Tensor<f32>,
    a_axes: &AxisSet,
    b: &Tensor<f32>,
    b_axes: &AxisSet,
) -> Tensor<f32> {
    let a_free = a_axes.without(b_axes);
    let b_free = b_axes.without(a_axes);
    let shared = a_axes.without(&a_free);

    let concat = |x: &AxisSet, y: &AxisSet| {
        AxisSet::new(x.iter().chain(y.iter())).expect("axes should be unique")
    };
    let a_perm = a_axes
        .permutation_to(&concat(&a_free, &shared))
        .expect("permutation should be valid");
    let b_perm = b_axes
        .permutation_to(&concat(&shared, &b_free))
        .expect("permutation should be valid");
    let a = permute(a, &a_perm);
    let b = permute(b, &b_perm);

    let rows: usize = a.shape()[..a_free.len()].iter().product();
    let depth: usize = a.shape()[a_free.len()..].iter().product();
    let cols: usize = b.shape()[shared.len()..].iter().product();
    let a_data = a.to_vec();
    let b_data = b.to_vec();

    let mut out = vec![0.; rows * cols];
    for i in 0..rows {
        for k in 0..depth {
            let a_ik = a_data[i * depth + k];
            for j in 0..cols {
                out[i * cols + j] += a_ik * b_data[k * cols + j];
            }
        }
    }

    let out_shape: Vec<usize> = a.shape()[..a_free.len()]
        .iter()
        .chain(&b.shape()[shared.len()..])
        .copied()
        .collect();
    Tensor::from_data(&out_shape, out)
}

/// Reference kernel for [`squared_l2`].
pub fn squared_l2_kernel(x: &Tensor<f32>, x_axes: &AxisSet, out_axes: &AxisSet) -> Tensor<f32> {
    let squares = Tensor::from_data(x.shape(), x.iter().map(|v| v * v).collect::<Vec<_>>());
    sum_axes(&squares, x_axes, out_axes)
}

pub fn scale_kernel(x: &Tensor<f32>, factor: f32) -> Tensor<f32> {
    x.map(|v| v * factor)
}

#[cfg(test)]
mod tests {
    use rten_tensor::Tensor;
    use rten_tensor::prelude::*;

    use super::{add, dot, dot_kernel, squared_l2, squared_l2_kernel, sub};
    use crate::axes::{AxisSet, AxisSpec};
    use crate::graph::Graph;
    use crate::ops::OpError;
    use crate::test_util::fresh_axes;

    #[test]
    fn test_add_sub_axes() {
        let mut g = Graph::new();
        let axes = fresh_axes(&mut g, &[2, 3]);
        let a = g.add_value(None, axes.clone()).unwrap();
        let b = g.add_value(None, axes.slice(1..2)).unwrap();

        let sum = add(&mut g, a, b).unwrap();
        assert_eq!(g.value_axes(sum), &axes);
        let diff = sub(&mut g, a, b).unwrap();
        assert_eq!(g.value_axes(diff), &axes);

        assert!(matches!(
            add(&mut g, b, a),
            Err(OpError::IncompatibleInputShapes(_))
        ));
    }

    #[test]
    fn test_dot() {
        let mut g = Graph::new();
        let ids = fresh_axes(&mut g, &[2, 3, 4]);
        let [m, k, n] = [0, 1, 2].map(|i| ids.get(i).unwrap());
        let a = g.add_value(None, AxisSet::new([m, k]).unwrap()).unwrap();
        let b = g.add_value(None, AxisSet::new([k, n]).unwrap()).unwrap();

        let y = dot(&mut g, a, b).unwrap();
        assert_eq!(g.value_axes(y).as_slice(), &[m, n]);

        let a_data = Tensor::from_data(&[2, 3], vec![1., 2., 3., 4., 5., 6.]);
        let b_data = Tensor::from_data(&[3, 4], (0..12).map(|x| x as f32).collect::<Vec<_>>());
        let out = g.run(&[(a, &a_data), (b, &b_data)], &[y]).unwrap();
        assert_eq!(out[0].shape(), &[2, 4]);
        assert_eq!(out[0].to_vec(), [32., 38., 44., 50., 68., 83., 98., 113.]);

        // Contracting over axes that appear in a different order.
        let b_axes = AxisSet::new([n, k]).unwrap();
        let b_t = Tensor::from_data(&[4, 3], b_data.permuted(&[1, 0]).to_vec());
        let out = dot_kernel(&a_data, g.value_axes(a), &b_t, &b_axes);
        assert_eq!(out.to_vec(), [32., 38., 44., 50., 68., 83., 98., 113.]);
    }

    #[test]
    fn test_squared_l2() {
        let mut g = Graph::new();
        let n = g
            .axes_mut()
            .make_axis(AxisSpec::new().batch().length(2))
            .unwrap();
        let c = g.axes_mut().make_axis(AxisSpec::new().length(3)).unwrap();
        let axes = AxisSet::new([c, n]).unwrap();
        let x = g.add_value(None, axes.clone()).unwrap();

        let y = squared_l2(&mut g, x).unwrap();
        assert_eq!(g.value_axes(y).as_slice(), &[n]);

        // `x[c, n]`
        let data = Tensor::from_data(&[3, 2], vec![1., 2., 3., 4., 5., 6.]);
        let out = squared_l2_kernel(&data, &axes, g.value_axes(y));
        assert_eq!(out.to_vec(), [35., 56.]);
    }
}
