use rayon::prelude::*;
use rten_tensor::Tensor;
use rten_tensor::prelude::*;

use crate::axes::AxisSet;
use crate::graph::{Graph, NodeId};
use crate::ops::{OpError, OpKind};
use crate::spatial::output_length;

/// Parameters of a convolution operator.
///
/// Convolution inputs have axes `[C, D, H, W, N]`, filters have axes
/// `[C, T, R, S, K]` and outputs have axes `[K, M, P, Q, N]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConvParams {
    pub pad_d: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub str_d: usize,
    pub str_h: usize,
    pub str_w: usize,
    pub dil_d: usize,
    pub dil_h: usize,
    pub dil_w: usize,
}

impl Default for ConvParams {
    fn default() -> ConvParams {
        ConvParams {
            pad_d: 0,
            pad_h: 0,
            pad_w: 0,
            str_d: 1,
            str_h: 1,
            str_w: 1,
            dil_d: 1,
            dil_h: 1,
            dil_w: 1,
        }
    }
}

impl ConvParams {
    fn pads(&self) -> [usize; 3] {
        [self.pad_d, self.pad_h, self.pad_w]
    }

    fn strides(&self) -> [usize; 3] {
        [self.str_d, self.str_h, self.str_w]
    }

    fn dilations(&self) -> [usize; 3] {
        [self.dil_d, self.dil_h, self.dil_w]
    }

    /// Return the `[M, P, Q]` output lengths for `[D, H, W]` input lengths and
    /// `[T, R, S]` filter lengths.
    pub fn output_shape(
        &self,
        in_shape: [usize; 3],
        kernel_shape: [usize; 3],
    ) -> Result<[usize; 3], OpError> {
        let pads = self.pads();
        let strides = self.strides();
        let dilations = self.dilations();
        let mut out_shape = [0; 3];
        for i in 0..3 {
            out_shape[i] = output_length(
                in_shape[i],
                kernel_shape[i],
                pads[i].into(),
                strides[i],
                dilations[i],
            )?;
        }
        Ok(out_shape)
    }
}

fn conv_shape(graph: &Graph, axes: &AxisSet, what: &str) -> Result<[usize; 5], OpError> {
    if axes.len() != 5 {
        return Err(OpError::invalid(format!(
            "convolution {what} shape must be length 5, found {}",
            axes.len()
        )));
    }
    let lengths = graph.axes().lengths(axes)?;
    let mut shape = [0; 5];
    shape.copy_from_slice(&lengths);
    Ok(shape)
}

/// Return the expected `[K, M, P, Q, N]` output lengths for a convolution.
fn expected_output_shape(
    graph: &Graph,
    params: &ConvParams,
    input: &AxisSet,
    filter: &AxisSet,
) -> Result<[usize; 5], OpError> {
    let [c, d, h, w, n] = conv_shape(graph, input, "input")?;
    let [fc, t, r, s, k] = conv_shape(graph, filter, "filter")?;
    if fc != c {
        return Err(OpError::incompatible(format!(
            "filter has {} input channels but input has {}",
            fc, c
        )));
    }
    let [m, p, q] = params.output_shape([d, h, w], [t, r, s])?;
    Ok([k, m, p, q, n])
}

/// Add a convolution operator.
///
/// The output batch axis must be the input's batch axis. Other output axes
/// must have the lengths implied by the filter and window parameters.
/// Unresolved output axes are assigned those lengths.
pub fn convolution(
    graph: &mut Graph,
    params: &ConvParams,
    input: NodeId,
    filter: NodeId,
    output_axes: &AxisSet,
) -> Result<NodeId, OpError> {
    let in_axes = graph.value_axes(input);
    let expected = expected_output_shape(graph, params, in_axes, graph.value_axes(filter))?;
    if output_axes.len() != 5 {
        return Err(OpError::invalid(format!(
            "convolution output shape must be length 5, found {}",
            output_axes.len()
        )));
    }
    if in_axes.get(4) != output_axes.get(4) {
        return Err(OpError::incompatible(
            "convolution output must have the same batch axis as its input",
        ));
    }
    for (axis, len) in output_axes.iter().zip(expected) {
        match graph.axes().length(axis) {
            Ok(actual) if actual != len => {
                return Err(OpError::incompatible(format!(
                    "convolution output axes {} do not match expected lengths {:?}",
                    graph.axes().describe(output_axes),
                    expected
                )));
            }
            _ => {}
        }
    }
    graph.axes_mut().set_shape(output_axes, &expected)?;

    Ok(graph.add_op(
        OpKind::Convolution(params.clone()),
        &[input, filter],
        output_axes.clone(),
    ))
}

/// Add an operator which computes the gradient of [`convolution`] with
/// respect to `input`, given the gradient `delta` of its output.
pub fn conv_backprop_data(
    graph: &mut Graph,
    params: &ConvParams,
    delta: NodeId,
    filter: NodeId,
    input: NodeId,
) -> Result<NodeId, OpError> {
    let in_axes = graph.value_axes(input).clone();
    let expected = expected_output_shape(graph, params, &in_axes, graph.value_axes(filter))?;
    let delta_shape = conv_shape(graph, graph.value_axes(delta), "output")?;
    if delta_shape != expected {
        return Err(OpError::incompatible(format!(
            "convolution gradient shape {:?} does not match output shape {:?}",
            delta_shape, expected
        )));
    }
    Ok(graph.add_op(
        OpKind::ConvBackpropData(params.clone()),
        &[delta, filter],
        in_axes,
    ))
}

fn dims5(shape: &[usize]) -> [usize; 5] {
    let mut dims = [0; 5];
    dims.copy_from_slice(shape);
    dims
}

#[inline]
fn offset(shape: &[usize; 5], i0: usize, i1: usize, i2: usize, i3: usize, i4: usize) -> usize {
    let [_, s1, s2, s3, s4] = *shape;
    (((i0 * s1 + i1) * s2 + i2) * s3 + i3) * s4 + i4
}

/// Map an output position and kernel offset to an input position, or `None`
/// if it falls in the padding.
#[inline]
fn input_pos(out: usize, k: usize, stride: usize, pad: usize, dil: usize, len: usize) -> Option<usize> {
    let pos = (out * stride + k * dil).checked_sub(pad)?;
    (pos < len).then_some(pos)
}

/// Reference convolution kernel.
///
/// Computes `out[k, m, p, q, n] = sum(x[c, d, h, w, n] * f[c, t, r, s, k])`
/// where `d = m * str_d - pad_d + t * dil_d`, and similarly for `h` and `w`.
pub fn conv_kernel(
    input: &Tensor<f32>,
    filter: &Tensor<f32>,
    params: &ConvParams,
    out_shape: &[usize],
) -> Tensor<f32> {
    let in_shape = dims5(input.shape());
    let f_shape = dims5(filter.shape());
    let out_shape = dims5(out_shape);
    let [chans, in_d, in_h, in_w, _] = in_shape;
    let [_, k_t, k_r, k_s, _] = f_shape;
    let [_, out_m, out_p, out_q, batch] = out_shape;
    let x = input.to_vec();
    let f = filter.to_vec();

    let mut output = vec![0.; out_shape.iter().product()];
    let chan_len = out_m * out_p * out_q * batch;
    if chan_len > 0 {
        output
            .par_chunks_mut(chan_len)
            .enumerate()
            .for_each(|(k, out_chan)| {
                let chan_shape = [1, out_m, out_p, out_q, batch];
                for m in 0..out_m {
                    for p in 0..out_p {
                        for q in 0..out_q {
                            let out_off = offset(&chan_shape, 0, m, p, q, 0);
                            let out_row = &mut out_chan[out_off..out_off + batch];
                            for c in 0..chans {
                                for t in 0..k_t {
                                    let Some(d) =
                                        input_pos(m, t, params.str_d, params.pad_d, params.dil_d, in_d)
                                    else {
                                        continue;
                                    };
                                    for r in 0..k_r {
                                        let Some(h) = input_pos(
                                            p, r, params.str_h, params.pad_h, params.dil_h, in_h,
                                        ) else {
                                            continue;
                                        };
                                        for s in 0..k_s {
                                            let Some(w) = input_pos(
                                                q, s, params.str_w, params.pad_w, params.dil_w,
                                                in_w,
                                            ) else {
                                                continue;
                                            };
                                            let weight = f[offset(&f_shape, c, t, r, s, k)];
                                            let in_off = offset(&in_shape, c, d, h, w, 0);
                                            for (y, x) in
                                                out_row.iter_mut().zip(&x[in_off..in_off + batch])
                                            {
                                                *y += x * weight;
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            });
    }

    Tensor::from_data(&out_shape, output)
}

/// Reference kernel for the gradient of convolution with respect to its
/// input.
///
/// Each output gradient element is scattered back to the input positions
/// which contributed to it, weighted by the filter.
pub fn conv_backprop_data_kernel(
    delta: &Tensor<f32>,
    filter: &Tensor<f32>,
    params: &ConvParams,
    in_shape: &[usize],
) -> Tensor<f32> {
    let in_shape = dims5(in_shape);
    let f_shape = dims5(filter.shape());
    let delta_shape = dims5(delta.shape());
    let [_, in_d, in_h, in_w, batch] = in_shape;
    let [_, k_t, k_r, k_s, out_k] = f_shape;
    let [_, out_m, out_p, out_q, _] = delta_shape;
    let dy = delta.to_vec();
    let f = filter.to_vec();

    let mut grad = vec![0.; in_shape.iter().product()];
    let chan_len = in_d * in_h * in_w * batch;
    if chan_len > 0 {
        grad.par_chunks_mut(chan_len)
            .enumerate()
            .for_each(|(c, grad_chan)| {
                let chan_shape = [1, in_d, in_h, in_w, batch];
                for k in 0..out_k {
                    for m in 0..out_m {
                        for p in 0..out_p {
                            for q in 0..out_q {
                                let dy_off = offset(&delta_shape, k, m, p, q, 0);
                                let dy_row = &dy[dy_off..dy_off + batch];
                                for t in 0..k_t {
                                    let Some(d) =
                                        input_pos(m, t, params.str_d, params.pad_d, params.dil_d, in_d)
                                    else {
                                        continue;
                                    };
                                    for r in 0..k_r {
                                        let Some(h) = input_pos(
                                            p, r, params.str_h, params.pad_h, params.dil_h, in_h,
                                        ) else {
                                            continue;
                                        };
                                        for s in 0..k_s {
                                            let Some(w) = input_pos(
                                                q, s, params.str_w, params.pad_w, params.dil_w,
                                                in_w,
                                            ) else {
                                                continue;
                                            };
                                            let weight = f[offset(&f_shape, c, t, r, s, k)];
                                            let g_off = offset(&chan_shape, 0, d, h, w, 0);
                                            for (g, y) in
                                                grad_chan[g_off..g_off + batch].iter_mut().zip(dy_row)
                                            {
                                                *g += y * weight;
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            });
    }

    Tensor::from_data(&in_shape, grad)
}
