use tracing::debug;

use super::check_no_padding;
use crate::attrs::OperatorDef;
use crate::axes::{AxisSet, AxisSpec, Role};
use crate::canonicalize::{broadcast, cast, expand_dims, reorder, slice};
use crate::graph::{Graph, NodeId};
use crate::ops::{OpError, PoolKind, PoolParams, check_input_count, pooling};
use crate::spatial::{KernelExtent, spatial_axis};

/// Lower a max or average pooling operator with an `NCHW` input.
///
/// `op` is the pooling type, `"max"` or `"avg"`. The kernel is square, with
/// size given by the single `kernel` argument, and the `stride` argument
/// applies to both height and width. Padding is not supported. The result has
/// `NCHW` axes.
pub fn pool(
    graph: &mut Graph,
    def: &OperatorDef,
    inputs: &[NodeId],
    op: &str,
) -> Result<NodeId, OpError> {
    let kind: PoolKind = op.parse()?;
    check_input_count(inputs, 1)?;
    let image = inputs[0];

    let reg = graph.axes_mut();
    let ax_n = reg.make_axis(AxisSpec::new().batch())?;
    let ax_c = reg.make_axis(AxisSpec::new().role(Role::Channel))?;
    let ax_d = reg.make_axis(AxisSpec::new().role(Role::Depth))?;
    let ax_h = reg.make_axis(AxisSpec::new().role(Role::Height))?;
    let ax_w = reg.make_axis(AxisSpec::new().role(Role::Width))?;

    let nchw = AxisSet::new([ax_n, ax_c, ax_h, ax_w])?;
    let image_shape = graph.value_shape(image)?;
    graph.axes_mut().set_shape(&nchw, &image_shape)?;

    let attrs = def.attrs();
    let kernel = attrs.scalar("kernel", "Kernel size must be scalar value")?;
    let stride = attrs.scalar("stride", "Stride size must be scalar value")?;
    let in_hw = [graph.axes().length(ax_h)?, graph.axes().length(ax_w)?];
    check_no_padding(&attrs, in_hw, [kernel, kernel], stride, "Max pooling")?;

    let params = PoolParams {
        op: kind,
        str_h: stride,
        str_w: stride,
        kernel_h: kernel,
        kernel_w: kernel,
        ..Default::default()
    };

    let image = cast(graph, image, &nchw)?;
    // NCHW -> NDCHW
    let image = expand_dims(graph, image, ax_d, 1)?;

    let in_axes = AxisSet::new([ax_c, ax_d, ax_h, ax_w, ax_n])?;
    let reg = graph.axes_mut();
    let out_axes = AxisSet::new([
        spatial_axis(
            reg,
            &in_axes,
            KernelExtent::Size(params.kernel_c),
            params.pad_c,
            params.str_c,
            Role::Channel,
        )?,
        spatial_axis(
            reg,
            &in_axes,
            KernelExtent::Size(params.kernel_d),
            params.pad_d,
            params.str_d,
            Role::Depth,
        )?,
        spatial_axis(
            reg,
            &in_axes,
            KernelExtent::Size(params.kernel_h),
            params.pad_h,
            params.str_h,
            Role::Height,
        )?,
        spatial_axis(
            reg,
            &in_axes,
            KernelExtent::Size(params.kernel_w),
            params.pad_w,
            params.str_w,
            Role::Width,
        )?,
        ax_n,
    ])?;

    // NDCHW -> CDHWN
    let image = reorder(graph, image, &in_axes)?;
    let output = pooling(graph, &params, image, &out_axes)?;

    debug!(
        op = %op,
        input = %graph.axes().describe(&in_axes),
        output = %graph.axes().describe(&out_axes),
        "lowered pooling"
    );

    // CDHWN -> NDCHW, then remove D.
    let [oc, od, oh, ow, on] = [0, 1, 2, 3, 4].map(|i| out_axes.as_slice()[i]);
    let output = broadcast(graph, output, &AxisSet::new([on, od, oc, oh, ow])?)?;
    let output = slice(graph, output, 1, 0)?;

    Ok(output)
}
