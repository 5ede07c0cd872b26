//! Reference kernels for layout transforms.
//!
//! Inputs and outputs are contiguous tensors whose dimensions follow the
//! order of the value's axis set.

use rten_tensor::Tensor;
use rten_tensor::prelude::*;

use crate::axes::AxisSet;

/// Permute the dimensions of `x` so that output dimension `i` is input
/// dimension `perm[i]`.
pub fn permute(x: &Tensor<f32>, perm: &[usize]) -> Tensor<f32> {
    x.permuted(perm).to_tensor()
}

/// Return a copy of `x` with a new shape with the same number of elements.
pub fn reshape(x: &Tensor<f32>, shape: &[usize]) -> Tensor<f32> {
    Tensor::from_data(shape, x.to_vec())
}

/// Broadcast `x`, whose dimensions follow `from`, to the axes `to`.
///
/// `from` must be a subset of `to`.
pub fn broadcast_axes(
    x: &Tensor<f32>,
    from: &AxisSet,
    to: &AxisSet,
    to_shape: &[usize],
) -> Tensor<f32> {
    // Reorder the input so its axes appear in the same relative order as in
    // the output, then insert size-1 dims for the missing axes.
    let ordered: AxisSet = to.without(&to.without(from));
    let perm = from
        .permutation_to(&ordered)
        .expect("broadcast source should be a subset of target");
    let x = permute(x, &perm);

    let expanded_shape: Vec<usize> = to
        .iter()
        .zip(to_shape)
        .map(|(axis, &len)| if from.contains(axis) { len } else { 1 })
        .collect();
    let x = reshape(&x, &expanded_shape);
    x.broadcast(to_shape).to_tensor()
}

/// Sum `x`, whose dimensions follow `from`, over the axes not in `to`.
///
/// `to` must be a subset of `from`. The output dimensions follow `to`.
pub fn sum_axes(x: &Tensor<f32>, from: &AxisSet, to: &AxisSet) -> Tensor<f32> {
    let rest = from.without(to);
    let order: Vec<_> = to.iter().chain(rest.iter()).collect();
    let order = AxisSet::new(order).expect("axes should be unique");
    let perm = from
        .permutation_to(&order)
        .expect("sum target should be a subset of source");
    let x = permute(x, &perm);

    let out_shape = &x.shape()[..to.len()];
    let out_len: usize = out_shape.iter().product();
    let chunk_len: usize = x.shape()[to.len()..].iter().product();
    let data = x.to_vec();
    let sums: Vec<f32> = (0..out_len)
        .map(|i| data[i * chunk_len..(i + 1) * chunk_len].iter().sum())
        .collect();
    Tensor::from_data(out_shape, sums)
}

/// Select index `index` of dimension `axis`, removing the dimension.
pub fn select(x: &Tensor<f32>, axis: usize, index: usize) -> Tensor<f32> {
    let shape = x.shape();
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();
    let len = shape[axis];

    let data = x.to_vec();
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        let start = (o * len + index) * inner;
        out.extend_from_slice(&data[start..start + inner]);
    }

    let mut out_shape = shape.to_vec();
    out_shape.remove(axis);
    Tensor::from_data(&out_shape, out)
}

/// Inverse of [`select`]. Inserts a dimension of size `len` at `axis`, with
/// `x` at `index` and zeros elsewhere.
pub fn unselect(x: &Tensor<f32>, axis: usize, index: usize, len: usize) -> Tensor<f32> {
    let shape = x.shape();
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis..].iter().product();

    let data = x.to_vec();
    let mut out = vec![0.; outer * len * inner];
    for o in 0..outer {
        let start = (o * len + index) * inner;
        out[start..start + inner].copy_from_slice(&data[o * inner..(o + 1) * inner]);
    }

    let mut out_shape = shape.to_vec();
    out_shape.insert(axis, len);
    Tensor::from_data(&out_shape, out)
}
