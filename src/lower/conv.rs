use tracing::debug;

use super::bias::{DataLayout, conv_bias_add};
use super::check_no_padding;
use crate::attrs::{Attrs, OperatorDef};
use crate::axes::{AxisSet, AxisSpec, Role};
use crate::canonicalize::{broadcast, cast, expand_dims, reorder, slice};
use crate::graph::{Graph, NodeId};
use crate::ops::{ConvParams, OpError, check_input_count, convolution};
use crate::spatial::{KernelExtent, spatial_axis};

/// Read the single `order` argument of a convolution.
fn read_layout(attrs: &Attrs) -> Result<DataLayout, OpError> {
    match attrs.strings("order")?.as_slice() {
        [order] => order.parse(),
        _ => Err(OpError::invalid("Multiple order values in convolution")),
    }
}

/// Lower a 2D convolution with inputs `(X, W, bias)`.
///
/// The `order` argument selects the layout of `X` and `W`. With `NCHW`, `X`
/// is `[N, C, H, W]` and `W` is `[K, C, kH, kW]`. With `NHWC`, `X` is
/// `[N, H, W, C]` and `W` is `[K, kH, kW, C]`. `bias` has one element per
/// output feature map `K`. The result is in the same layout as `X`.
pub fn conv(graph: &mut Graph, def: &OperatorDef, inputs: &[NodeId]) -> Result<NodeId, OpError> {
    check_input_count(inputs, 3)?;
    let [x, w, bias] = [inputs[0], inputs[1], inputs[2]];

    let attrs = def.attrs();
    let layout = read_layout(&attrs)?;

    let reg = graph.axes_mut();
    let ax_n = reg.make_axis(AxisSpec::new().batch())?;
    let ax_c = reg.make_axis(AxisSpec::new().role(Role::Channel))?;
    let ax_d = reg.make_axis(AxisSpec::new().role(Role::Depth))?;
    let ax_h = reg.make_axis(AxisSpec::new().role(Role::Height))?;
    let ax_w = reg.make_axis(AxisSpec::new().role(Role::Width))?;
    let ax_kd = reg.make_axis(AxisSpec::new().role(Role::Depth))?;
    let ax_kh = reg.make_axis(AxisSpec::new().role(Role::Height))?;
    let ax_kw = reg.make_axis(AxisSpec::new().role(Role::Width))?;
    let ax_ofm = reg.make_axis(AxisSpec::new().role(Role::ChannelOut))?;

    // The filter's output feature maps come first in both layouts.
    let x_axes = AxisSet::new(layout.arrange([ax_n, ax_c, ax_h, ax_w]))?;
    let w_axes = AxisSet::new(layout.arrange([ax_ofm, ax_c, ax_kh, ax_kw]))?;

    let x_shape = graph.value_shape(x)?;
    let w_shape = graph.value_shape(w)?;
    let reg = graph.axes_mut();
    reg.set_shape(&x_axes, &x_shape)?;
    reg.set_shape(&w_axes, &w_shape)?;
    reg.set_length(ax_d, 1)?;
    reg.set_length(ax_kd, 1)?;

    let bias_shape = graph.value_shape(bias)?;
    let ofm = graph.axes().length(ax_ofm)?;
    match bias_shape.as_slice() {
        [len] if *len == ofm => {}
        [_] => {
            return Err(OpError::invalid(
                "Bias's length must equal to number of output feature maps.",
            ));
        }
        _ => return Err(OpError::invalid("Bias's must be 1D.")),
    }

    let stride = attrs.scalar("stride", "Stride size must be scalar value")?;
    let reg = graph.axes();
    let in_hw = [reg.length(ax_h)?, reg.length(ax_w)?];
    let kernel_hw = [reg.length(ax_kh)?, reg.length(ax_kw)?];
    match attrs.ints("kernel")?.as_slice() {
        [] => {}
        &[kernel] if kernel_hw.iter().all(|&k| k as i64 == kernel) => {}
        &[kernel] => {
            return Err(OpError::invalid(format!(
                "Kernel size {} does not match filter size {}x{}",
                kernel, kernel_hw[0], kernel_hw[1]
            )));
        }
        _ => return Err(OpError::invalid("Kernel size must be scalar value")),
    }
    check_no_padding(&attrs, in_hw, kernel_hw, stride, "Convolution")?;

    let params = ConvParams {
        str_h: stride,
        str_w: stride,
        ..Default::default()
    };

    let x_internal = AxisSet::new([ax_c, ax_d, ax_h, ax_w, ax_n])?;
    let w_internal = AxisSet::new([ax_c, ax_kd, ax_kh, ax_kw, ax_ofm])?;

    let reg = graph.axes_mut();
    let out_c = reg.make_axis(AxisSpec::new().name("C").role(Role::Channel).length(ofm))?;
    let kernel = KernelExtent::Axes(&w_internal);
    let out_d = spatial_axis(reg, &x_internal, kernel, params.pad_d, params.str_d, Role::Depth)?;
    let out_h = spatial_axis(reg, &x_internal, kernel, params.pad_h, params.str_h, Role::Height)?;
    let out_w = spatial_axis(reg, &x_internal, kernel, params.pad_w, params.str_w, Role::Width)?;
    let y_internal = AxisSet::new([out_c, out_d, out_h, out_w, ax_n])?;

    // NCHW -> NDCHW -> CDHWN, or NHWC -> NDHWC -> CDHWN.
    let x = cast(graph, x, &x_axes)?;
    let x = expand_dims(graph, x, ax_d, 1)?;
    let x = reorder(graph, x, &x_internal)?;

    // KCRS -> DKCRS -> CDRSK, or KRSC -> DKRSC -> CDRSK.
    let w = cast(graph, w, &w_axes)?;
    let w = expand_dims(graph, w, ax_kd, 0)?;
    let w = reorder(graph, w, &w_internal)?;

    let y = convolution(graph, &params, x, w, &y_internal)?;

    debug!(
        ?layout,
        input = %graph.axes().describe(&x_internal),
        filter = %graph.axes().describe(&w_internal),
        output = %graph.axes().describe(&y_internal),
        "lowered convolution"
    );

    // CDHWN -> NDCHW or NDHWC, then remove D.
    let y_external = match layout {
        DataLayout::Nchw => [ax_n, out_d, out_c, out_h, out_w],
        DataLayout::Nhwc => [ax_n, out_d, out_h, out_w, out_c],
    };
    let y = broadcast(graph, y, &AxisSet::new(y_external)?)?;
    let y = slice(graph, y, 1, 0)?;

    conv_bias_add(graph, y, bias, layout)
}

#[cfg(test)]
mod tests {
    use rten_lower_testing::TestCases;
    use rten_tensor::Tensor;
    use rten_tensor::prelude::*;
    use rten_tensor::rng::XorShiftRng;
    use rten_tensor::test_util::expect_equal_with_tolerance;

    use super::conv;
    use crate::attrs::OperatorDef;
    use crate::graph::{Graph, NodeId};
    use crate::ops::OpError;
    use crate::test_util::fresh_axes;

    fn conv_def(order: &str, stride: i64) -> OperatorDef {
        OperatorDef::new("Conv")
            .with_arg("order", order)
            .with_arg("stride", stride)
    }

    /// Add `X`, `W` and `bias` values with the given shapes.
    fn conv_inputs(
        g: &mut Graph,
        x_shape: &[usize],
        w_shape: &[usize],
        bias_shape: &[usize],
    ) -> [NodeId; 3] {
        [x_shape, w_shape, bias_shape].map(|shape| {
            let axes = fresh_axes(g, shape);
            g.add_value(None, axes).unwrap()
        })
    }

    /// Direct NCHW convolution without padding.
    fn reference_conv(
        x: &Tensor<f32>,
        w: &Tensor<f32>,
        bias: &Tensor<f32>,
        stride: usize,
    ) -> Tensor<f32> {
        let [n, c, h, wd]: [usize; 4] = x.shape().try_into().unwrap();
        let [k, _, kh, kw]: [usize; 4] = w.shape().try_into().unwrap();
        let out_h = (h - kh) / stride + 1;
        let out_w = (wd - kw) / stride + 1;
        let mut out = Tensor::zeros(&[n, k, out_h, out_w]);
        for i in 0..n {
            for o in 0..k {
                for y in 0..out_h {
                    for xx in 0..out_w {
                        let mut acc = bias[[o]];
                        for ch in 0..c {
                            for ky in 0..kh {
                                for kx in 0..kw {
                                    acc += x[[i, ch, y * stride + ky, xx * stride + kx]]
                                        * w[[o, ch, ky, kx]];
                                }
                            }
                        }
                        out[[i, o, y, xx]] = acc;
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_conv_nchw() {
        let mut g = Graph::new();
        let [x, w, bias] = conv_inputs(&mut g, &[4, 3, 10, 10], &[8, 3, 2, 2], &[8]);
        let y = conv(&mut g, &conv_def("NCHW", 1), &[x, w, bias]).unwrap();
        assert_eq!(g.value_shape(y).unwrap().as_slice(), &[4, 8, 9, 9]);

        let mut rng = XorShiftRng::new(1234);
        let x_val = Tensor::<f32>::rand(&[4, 3, 10, 10], &mut rng);
        let w_val = Tensor::<f32>::rand(&[8, 3, 2, 2], &mut rng);
        let bias_val = Tensor::from_data(
            &[8],
            (0..8).map(|i| i as f32 * 10.).collect::<Vec<f32>>(),
        );
        let result = g
            .run(&[(x, &x_val), (w, &w_val), (bias, &bias_val)], &[y])
            .unwrap()
            .remove(0);

        let expected = reference_conv(&x_val, &w_val, &bias_val, 1);
        expect_equal_with_tolerance(&result, &expected, 1e-4, 0.).unwrap();
    }

    #[test]
    fn test_conv_nhwc() {
        let mut g = Graph::new();
        let [x, w, bias] = conv_inputs(&mut g, &[2, 9, 9, 3], &[4, 3, 3, 3], &[4]);
        let def = conv_def("NHWC", 2).with_arg("kernel", 3i64);
        let y = conv(&mut g, &def, &[x, w, bias]).unwrap();
        assert_eq!(g.value_shape(y).unwrap().as_slice(), &[2, 4, 4, 4]);

        let mut rng = XorShiftRng::new(4321);
        let x_nchw = Tensor::<f32>::rand(&[2, 3, 9, 9], &mut rng);
        let w_nchw = Tensor::<f32>::rand(&[4, 3, 3, 3], &mut rng);
        let bias_val = Tensor::<f32>::rand(&[4], &mut rng);
        let x_val = x_nchw.permuted(&[0, 2, 3, 1]).to_tensor();
        let w_val = w_nchw.permuted(&[0, 2, 3, 1]).to_tensor();
        let result = g
            .run(&[(x, &x_val), (w, &w_val), (bias, &bias_val)], &[y])
            .unwrap()
            .remove(0);

        let expected = reference_conv(&x_nchw, &w_nchw, &bias_val, 2)
            .permuted(&[0, 2, 3, 1])
            .to_tensor();
        expect_equal_with_tolerance(&result, &expected, 1e-4, 0.).unwrap();
    }

    #[test]
    fn test_conv_gradient_shape() {
        let mut g = Graph::new();
        let [x, w, bias] = conv_inputs(&mut g, &[2, 3, 8, 8], &[5, 3, 2, 2], &[5]);
        let y = conv(&mut g, &conv_def("NCHW", 2), &[x, w, bias]).unwrap();
        let dy = g.add_value(None, g.value_axes(y).clone()).unwrap();
        let dx = g.deriv(y, x, dy).unwrap();
        assert_eq!(g.value_axes(dx), g.value_axes(x));

        let dbias = g.deriv(y, bias, dy).unwrap();
        let dy_val = Tensor::<f32>::full(&[2, 5, 4, 4], 1.);
        let x_val = Tensor::<f32>::zeros(&[2, 3, 8, 8]);
        let w_val = Tensor::<f32>::zeros(&[5, 3, 2, 2]);
        let bias_val = Tensor::<f32>::zeros(&[5]);
        let out = g
            .run(
                &[(x, &x_val), (w, &w_val), (bias, &bias_val), (dy, &dy_val)],
                &[dbias],
            )
            .unwrap();
        // Each bias element receives the gradient of every N, H and W position.
        assert_eq!(out[0].to_vec(), vec![32.; 5]);
    }

    #[test]
    fn test_conv_errors() {
        #[derive(Debug)]
        struct Case {
            def: OperatorDef,
            x_shape: Vec<usize>,
            w_shape: Vec<usize>,
            bias_shape: Vec<usize>,
            expected: OpError,
        }

        let case = |def: OperatorDef, expected: OpError| Case {
            def,
            x_shape: vec![1, 3, 32, 32],
            w_shape: vec![8, 3, 2, 2],
            bias_shape: vec![8],
            expected,
        };

        let cases = [
            case(
                conv_def("NCHW", 1).with_arg("order", "NCHW"),
                OpError::invalid("Multiple order values in convolution"),
            ),
            case(
                OperatorDef::new("Conv").with_arg("stride", 1i64),
                OpError::invalid("Multiple order values in convolution"),
            ),
            case(
                conv_def("CHWN", 1),
                OpError::unsupported("Unsupported order in convolution: CHWN"),
            ),
            case(
                conv_def("NCHW", 1).with_arg("stride", 2i64),
                OpError::invalid("Stride size must be scalar value"),
            ),
            case(
                conv_def("NCHW", 1)
                    .with_arg("kernel", 2i64)
                    .with_arg("kernel", 2i64),
                OpError::invalid("Kernel size must be scalar value"),
            ),
            case(
                conv_def("NCHW", 1).with_arg("kernel", 3i64),
                OpError::invalid("Kernel size 3 does not match filter size 2x2"),
            ),
            case(
                conv_def("NCHW", 4),
                OpError::unsupported("Convolution does not support padding yet"),
            ),
            case(
                conv_def("NCHW", 1).with_arg("pad_l", 1i64),
                OpError::unsupported(
                    "Requires symmetric padding: pad_t(0) == pad_b(0) and pad_l(1) == pad_r(0)",
                ),
            ),
            Case {
                bias_shape: vec![1, 8],
                ..case(conv_def("NCHW", 1), OpError::invalid("Bias's must be 1D."))
            },
            Case {
                bias_shape: vec![4],
                ..case(
                    conv_def("NCHW", 1),
                    OpError::invalid("Bias's length must equal to number of output feature maps."),
                )
            },
        ];

        cases.test_each(|case| {
            let mut g = Graph::new();
            let inputs = conv_inputs(&mut g, &case.x_shape, &case.w_shape, &case.bias_shape);
            let err = conv(&mut g, &case.def, &inputs).err();
            assert_eq!(err, Some(case.expected.clone()));
        })
    }

    #[test]
    fn test_conv_channel_mismatch() {
        let mut g = Graph::new();
        let inputs = conv_inputs(&mut g, &[1, 3, 8, 8], &[8, 4, 2, 2], &[8]);
        let err = conv(&mut g, &conv_def("NCHW", 1), &inputs).err();
        assert!(matches!(err, Some(OpError::Axis(_))));
    }
}
