//! Lowering of imported operators into primitive graph operators.
//!
//! Each lowering reads the operator's arguments, assigns lengths to fresh
//! axes describing the operator's external layout, canonicalizes its inputs
//! into the axis order the primitive operator expects, emits the primitive
//! and converts the result back to the external layout.

use crate::attrs::Attrs;
use crate::ops::OpError;

mod bias;
mod conv;
mod linear;
mod pooling;

pub use bias::{DataLayout, conv_bias_add};
pub use conv::conv;
pub use linear::{fc, squared_l2_distance};
pub use pooling::pool;

/// Explicit padding arguments of a caffe2-style operator.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
struct PadAttrs {
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
}

impl PadAttrs {
    /// Read `pad`, `pad_t`, `pad_b`, `pad_l` and `pad_r`. The per-side
    /// arguments override `pad`.
    fn read(attrs: &Attrs) -> Result<PadAttrs, OpError> {
        let pad = attrs.optional_scalar("pad")?.unwrap_or(0);
        Ok(PadAttrs {
            top: attrs.optional_scalar("pad_t")?.unwrap_or(pad),
            bottom: attrs.optional_scalar("pad_b")?.unwrap_or(pad),
            left: attrs.optional_scalar("pad_l")?.unwrap_or(pad),
            right: attrs.optional_scalar("pad_r")?.unwrap_or(pad),
        })
    }
}

/// Check that an operator needs no padding.
///
/// `in_hw` and `kernel_hw` are the height and width lengths of the input and
/// kernel. Windows must tile the input exactly with the given stride, and any
/// explicit padding arguments must be symmetric and zero. `op_label` names the
/// operator in error messages.
fn check_no_padding(
    attrs: &Attrs,
    in_hw: [usize; 2],
    kernel_hw: [usize; 2],
    stride: usize,
    op_label: &str,
) -> Result<(), OpError> {
    let not_supported = || OpError::unsupported(format!("{op_label} does not support padding yet"));

    for (in_len, kernel) in in_hw.into_iter().zip(kernel_hw) {
        // Kernels larger than the input are rejected when deriving output
        // axes.
        match in_len.checked_sub(kernel) {
            Some(extra) if stride > 0 && extra % stride != 0 => return Err(not_supported()),
            _ => {}
        }
    }

    let pads = PadAttrs::read(attrs)?;
    if pads.top != pads.bottom || pads.left != pads.right {
        return Err(OpError::unsupported(format!(
            "Requires symmetric padding: pad_t({}) == pad_b({}) and pad_l({}) == pad_r({})",
            pads.top, pads.bottom, pads.left, pads.right
        )));
    }
    if pads != PadAttrs::default() {
        return Err(not_supported());
    }

    Ok(())
}
