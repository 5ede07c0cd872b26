use std::ops::Range;
use std::str::FromStr;

use rayon::prelude::*;
use rten_tensor::Tensor;
use rten_tensor::prelude::*;

use crate::axes::AxisSet;
use crate::graph::{Graph, NodeId};
use crate::ops::{OpError, OpKind};
use crate::spatial::output_length;

/// Reduction applied over each pooling window.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PoolKind {
    #[default]
    Max,
    Avg,
}

impl FromStr for PoolKind {
    type Err = OpError;

    fn from_str(op: &str) -> Result<PoolKind, OpError> {
        match op {
            "max" => Ok(PoolKind::Max),
            "avg" => Ok(PoolKind::Avg),
            _ => Err(OpError::invalid(format!(
                "Unsupported pooling type: {op}. Only max and avg pooling currently supported. "
            ))),
        }
    }
}

/// Parameters of a pooling operator.
///
/// Pooling operates on values with axes `[C, D, H, W, N]`. The window covers
/// `kernel_c` channels, `kernel_d` depth slices and `kernel_h x kernel_w`
/// spatial positions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolParams {
    pub op: PoolKind,
    pub pad_c: usize,
    pub pad_d: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub str_c: usize,
    pub str_d: usize,
    pub str_h: usize,
    pub str_w: usize,
    pub kernel_c: usize,
    pub kernel_d: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
}

impl Default for PoolParams {
    fn default() -> PoolParams {
        PoolParams {
            op: PoolKind::Max,
            pad_c: 0,
            pad_d: 0,
            pad_h: 0,
            pad_w: 0,
            str_c: 1,
            str_d: 1,
            str_h: 1,
            str_w: 1,
            kernel_c: 1,
            kernel_d: 1,
            kernel_h: 1,
            kernel_w: 1,
        }
    }
}

impl PoolParams {
    fn kernel(&self) -> [usize; 4] {
        [self.kernel_c, self.kernel_d, self.kernel_h, self.kernel_w]
    }

    fn strides(&self) -> [usize; 4] {
        [self.str_c, self.str_d, self.str_h, self.str_w]
    }

    fn pads(&self) -> [usize; 4] {
        [self.pad_c, self.pad_d, self.pad_h, self.pad_w]
    }

    /// Return the output lengths of the `[C, D, H, W]` axes for an input with
    /// the given lengths.
    pub fn output_shape(&self, in_shape: [usize; 4]) -> Result<[usize; 4], OpError> {
        let kernel = self.kernel();
        let strides = self.strides();
        let pads = self.pads();
        let mut out_shape = [0; 4];
        for i in 0..4 {
            out_shape[i] = output_length(in_shape[i], kernel[i], pads[i].into(), strides[i], 1)?;
        }
        Ok(out_shape)
    }
}

/// Check that a pooling input or output has the `[C, D, H, W, N]` axes and
/// return its lengths.
fn pool_shape(graph: &Graph, axes: &AxisSet, what: &str) -> Result<[usize; 5], OpError> {
    if axes.len() != 5 {
        return Err(OpError::invalid(format!(
            "pooling {what} shape must be length 5, found {}",
            axes.len()
        )));
    }
    let lengths = graph.axes().lengths(axes)?;
    let mut shape = [0; 5];
    shape.copy_from_slice(&lengths);
    Ok(shape)
}

/// Add a pooling operator.
///
/// `input` must have axes `[C, D, H, W, N]`. `output_axes` are the
/// `[C, D, H, W, N]` axes of the result. The batch axis must be the same as
/// the input's, and other axes must have the lengths implied by the window
/// parameters. Unresolved output axes are assigned those lengths.
pub fn pooling(
    graph: &mut Graph,
    params: &PoolParams,
    input: NodeId,
    output_axes: &AxisSet,
) -> Result<NodeId, OpError> {
    let in_axes = graph.value_axes(input).clone();
    let [c, d, h, w, n] = pool_shape(graph, &in_axes, "input")?;
    if output_axes.len() != 5 {
        return Err(OpError::invalid(format!(
            "pooling output shape must be length 5, found {}",
            output_axes.len()
        )));
    }
    if in_axes.get(4) != output_axes.get(4) {
        return Err(OpError::incompatible(
            "pooling output must have the same batch axis as its input",
        ));
    }

    let [oc, od, oh, ow] = params.output_shape([c, d, h, w])?;
    let expected = [oc, od, oh, ow, n];
    for (axis, len) in output_axes.iter().zip(expected) {
        match graph.axes().length(axis) {
            Ok(actual) if actual != len => {
                return Err(OpError::incompatible(format!(
                    "pooling output axes {} do not match expected lengths {:?}",
                    graph.axes().describe(output_axes),
                    expected
                )));
            }
            _ => {}
        }
    }
    graph.axes_mut().set_shape(output_axes, &expected)?;

    Ok(graph.add_op(
        OpKind::Pooling(params.clone()),
        &[input],
        output_axes.clone(),
    ))
}

/// Add an operator which computes the gradient of [`pooling`] with respect to
/// its input, given the gradient `delta` of its output.
pub fn pooling_backprop(
    graph: &mut Graph,
    params: &PoolParams,
    delta: NodeId,
    input: NodeId,
) -> Result<NodeId, OpError> {
    let in_axes = graph.value_axes(input).clone();
    let [c, d, h, w, n] = pool_shape(graph, &in_axes, "input")?;
    let delta_shape = pool_shape(graph, graph.value_axes(delta), "output")?;
    let [oc, od, oh, ow] = params.output_shape([c, d, h, w])?;
    if delta_shape != [oc, od, oh, ow, n] {
        return Err(OpError::incompatible(format!(
            "pooling gradient shape {:?} does not match output shape {:?}",
            delta_shape,
            [oc, od, oh, ow, n]
        )));
    }
    Ok(graph.add_op(
        OpKind::PoolingBackprop(params.clone()),
        &[delta, input],
        in_axes,
    ))
}

/// Return the range of input positions covered by the window at `out_pos`.
pub(crate) fn window_range(
    out_pos: usize,
    stride: usize,
    pad: usize,
    kernel: usize,
    in_len: usize,
) -> Range<usize> {
    let start = (out_pos * stride) as isize - pad as isize;
    let end = (start + kernel as isize).clamp(0, in_len as isize) as usize;
    let start = start.clamp(0, in_len as isize) as usize;
    start..end
}

fn dims5(shape: &[usize]) -> [usize; 5] {
    let mut dims = [0; 5];
    dims.copy_from_slice(shape);
    dims
}

/// Compute the offset of an element in a contiguous `[C, D, H, W, N]` buffer.
#[inline]
fn offset(shape: &[usize; 5], c: usize, d: usize, h: usize, w: usize, n: usize) -> usize {
    let [_, sd, sh, sw, sn] = *shape;
    (((c * sd + d) * sh + h) * sw + w) * sn + n
}

/// Input positions covered by one output element, ignoring the batch axis.
struct Window {
    c: Range<usize>,
    d: Range<usize>,
    h: Range<usize>,
    w: Range<usize>,
}

impl Window {
    fn new(params: &PoolParams, in_shape: &[usize; 5], out_pos: [usize; 4]) -> Window {
        let kernel = params.kernel();
        let strides = params.strides();
        let pads = params.pads();
        let range = |i: usize| window_range(out_pos[i], strides[i], pads[i], kernel[i], in_shape[i]);
        Window {
            c: range(0),
            d: range(1),
            h: range(2),
            w: range(3),
        }
    }

    fn count(&self) -> usize {
        self.c.len() * self.d.len() * self.h.len() * self.w.len()
    }

    /// Visit the `[C, D, H, W]` coordinates in the window, in row-major order.
    fn for_each(&self, mut f: impl FnMut(usize, usize, usize, usize)) {
        for c in self.c.clone() {
            for d in self.d.clone() {
                for h in self.h.clone() {
                    for w in self.w.clone() {
                        f(c, d, h, w);
                    }
                }
            }
        }
    }

    /// Return the offset of the first maximum value in the window.
    fn argmax(&self, data: &[f32], shape: &[usize; 5], n: usize) -> Option<usize> {
        let mut max: Option<(usize, f32)> = None;
        self.for_each(|c, d, h, w| {
            let idx = offset(shape, c, d, h, w, n);
            let val = data[idx];
            match max {
                Some((_, max_val)) if val <= max_val => {}
                _ => max = Some((idx, val)),
            }
        });
        max.map(|(idx, _)| idx)
    }
}

/// Reference pooling kernel. `input` has dimensions `[C, D, H, W, N]`.
///
/// Average pooling divides by the number of window elements that lie inside
/// the input.
pub fn pool_kernel(input: &Tensor<f32>, params: &PoolParams, out_shape: &[usize]) -> Tensor<f32> {
    let in_shape = dims5(input.shape());
    let out_shape = dims5(out_shape);
    let [out_c, out_d, out_h, out_w, batch] = out_shape;
    let data = input.to_vec();

    let mut output = vec![0.; out_shape.iter().product()];
    let chan_len = out_d * out_h * out_w * batch;
    if chan_len > 0 {
        output
            .par_chunks_mut(chan_len)
            .enumerate()
            .for_each(|(oc, out_chan)| {
                let chan_shape = [1, out_d, out_h, out_w, batch];
                for od in 0..out_d {
                    for oh in 0..out_h {
                        for ow in 0..out_w {
                            let window = Window::new(params, &in_shape, [oc, od, oh, ow]);
                            for n in 0..batch {
                                let val = match params.op {
                                    PoolKind::Max => window
                                        .argmax(&data, &in_shape, n)
                                        .map(|idx| data[idx])
                                        .unwrap_or(0.),
                                    PoolKind::Avg => {
                                        let mut sum = 0.;
                                        window.for_each(|c, d, h, w| {
                                            sum += data[offset(&in_shape, c, d, h, w, n)];
                                        });
                                        let count = window.count();
                                        if count > 0 { sum / count as f32 } else { 0. }
                                    }
                                };
                                out_chan[offset(&chan_shape, 0, od, oh, ow, n)] = val;
                            }
                        }
                    }
                }
            });
    }
    debug_assert_eq!(out_c * chan_len, output.len());

    Tensor::from_data(&out_shape, output)
}

/// Reference kernel for the gradient of pooling with respect to its input.
///
/// For max pooling each output gradient is routed to the first maximum in its
/// window. For average pooling it is distributed evenly over the window.
pub fn pool_backprop_kernel(
    delta: &Tensor<f32>,
    input: &Tensor<f32>,
    params: &PoolParams,
) -> Tensor<f32> {
    let in_shape = dims5(input.shape());
    let delta_shape = dims5(delta.shape());
    let [out_c, out_d, out_h, out_w, batch] = delta_shape;
    let data = input.to_vec();
    let delta_data = delta.to_vec();

    let mut grad = vec![0.; in_shape.iter().product()];
    for oc in 0..out_c {
        for od in 0..out_d {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let window = Window::new(params, &in_shape, [oc, od, oh, ow]);
                    let count = window.count();
                    for n in 0..batch {
                        let dy = delta_data[offset(&delta_shape, oc, od, oh, ow, n)];
                        match params.op {
                            PoolKind::Max => {
                                if let Some(idx) = window.argmax(&data, &in_shape, n) {
                                    grad[idx] += dy;
                                }
                            }
                            PoolKind::Avg => {
                                let share = dy / count.max(1) as f32;
                                window.for_each(|c, d, h, w| {
                                    grad[offset(&in_shape, c, d, h, w, n)] += share;
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    Tensor::from_data(&in_shape, grad)
}
