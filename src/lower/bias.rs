use std::str::FromStr;

use crate::axes::{AxisSet, AxisSpec, Role};
use crate::canonicalize::{broadcast, cast};
use crate::graph::{Graph, NodeId};
use crate::ops::{OpError, add};

/// Memory layout of a 4D image value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DataLayout {
    /// Batch, channels, height, width.
    #[default]
    Nchw,
    /// Batch, height, width, channels.
    Nhwc,
}

impl DataLayout {
    /// Arrange `[N, C, H, W]` items in this layout's order.
    pub fn arrange<T: Copy>(self, [n, c, h, w]: [T; 4]) -> [T; 4] {
        match self {
            DataLayout::Nchw => [n, c, h, w],
            DataLayout::Nhwc => [n, h, w, c],
        }
    }
}

impl FromStr for DataLayout {
    type Err = OpError;

    fn from_str(order: &str) -> Result<DataLayout, OpError> {
        match order {
            "NCHW" => Ok(DataLayout::Nchw),
            "NHWC" => Ok(DataLayout::Nhwc),
            _ => Err(OpError::unsupported(format!(
                "Unsupported order in convolution: {order}"
            ))),
        }
    }
}

/// Add a per-channel `bias` to a 4D convolution output `y` in `layout` order.
///
/// `bias` must be 1D with one element per output channel. The result has
/// newly created axes in `layout` order.
pub fn conv_bias_add(
    graph: &mut Graph,
    y: NodeId,
    bias: NodeId,
    layout: DataLayout,
) -> Result<NodeId, OpError> {
    let reg = graph.axes_mut();
    let nchw = [
        reg.make_axis(AxisSpec::new().name("N").batch())?,
        reg.make_axis(AxisSpec::new().name("C").role(Role::Channel))?,
        reg.make_axis(AxisSpec::new().name("H").role(Role::Height))?,
        reg.make_axis(AxisSpec::new().name("W").role(Role::Width))?,
    ];
    let ax_c = nchw[1];
    let y_axes = AxisSet::new(layout.arrange(nchw))?;

    let y_shape = graph.value_shape(y)?;
    graph.axes_mut().set_shape(&y_axes, &y_shape)?;
    let y = cast(graph, y, &y_axes)?;

    let bias_axes = AxisSet::new([ax_c])?;
    let bias = cast(graph, bias, &bias_axes)?;
    let bias = broadcast(graph, bias, &y_axes)?;

    add(graph, y, bias)
}
