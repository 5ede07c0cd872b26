//! Derivation of output axes for spatial operators (convolution, pooling).

use std::error::Error;
use std::fmt;

use crate::axes::{AxisError, AxisId, AxisRegistry, AxisSet, AxisSpec, Role};

/// Padding for a single spatial dimension.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DimPadding {
    pub start: usize,
    pub end: usize,
}

impl DimPadding {
    /// Create padding which is the same at the start and end.
    pub fn symmetric(pad: usize) -> DimPadding {
        DimPadding {
            start: pad,
            end: pad,
        }
    }

    /// Return the padding applied at each end, if it is symmetric.
    pub fn as_symmetric(self) -> Result<usize, SpatialError> {
        if self.start != self.end {
            return Err(SpatialError::UnsupportedPadding {
                start: self.start,
                end: self.end,
            });
        }
        Ok(self.start)
    }
}

impl From<usize> for DimPadding {
    fn from(pad: usize) -> DimPadding {
        DimPadding::symmetric(pad)
    }
}

/// The extent of a kernel along the dimension being derived.
#[derive(Copy, Clone, Debug)]
pub enum KernelExtent<'a> {
    /// Take the length from the kernel axis which has the same role as the
    /// output axis.
    Axes(&'a AxisSet),

    /// Explicit kernel size.
    Size(usize),
}

/// Errors when deriving spatial output sizes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SpatialError {
    /// Stride, kernel and padding do not produce a valid output size.
    InvalidConfig(String),

    /// Start and end padding differ.
    UnsupportedPadding { start: usize, end: usize },

    /// The input or kernel has no axis with the required role.
    MissingRole(Role),

    /// An axis used in the computation is invalid, eg. because its length is
    /// unresolved.
    Axis(AxisError),
}

impl From<AxisError> for SpatialError {
    fn from(err: AxisError) -> SpatialError {
        SpatialError::Axis(err)
    }
}

impl fmt::Display for SpatialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialError::InvalidConfig(details) => {
                write!(f, "invalid spatial configuration: {}", details)
            }
            SpatialError::UnsupportedPadding { start, end } => write!(
                f,
                "asymmetric padding (start {}, end {}) is not supported",
                start, end
            ),
            SpatialError::MissingRole(role) => write!(f, "no axis with role {:?}", role),
            SpatialError::Axis(err) => write!(f, "{}", err),
        }
    }
}

impl Error for SpatialError {}

/// Return the output size for a spatial dimension in a convolution or pooling
/// operation.
///
/// This is `(in_size + pad_start + pad_end - dilated_kernel) / stride + 1`,
/// where `dilated_kernel = dilation * (kernel_size - 1) + 1`. Only symmetric
/// padding is supported.
pub fn output_length(
    in_size: usize,
    kernel_size: usize,
    padding: DimPadding,
    stride: usize,
    dilation: usize,
) -> Result<usize, SpatialError> {
    let pad = padding.as_symmetric()?;
    if stride == 0 {
        return Err(SpatialError::InvalidConfig("stride must be positive".into()));
    }
    if kernel_size == 0 || dilation == 0 {
        return Err(SpatialError::InvalidConfig(
            "kernel size and dilation must be positive".into(),
        ));
    }

    let overflow = || SpatialError::InvalidConfig("size computation overflowed".into());
    let dilated_kernel = dilation
        .checked_mul(kernel_size - 1)
        .and_then(|k| k.checked_add(1))
        .ok_or_else(overflow)?;
    let padded_in_size = pad
        .checked_mul(2)
        .and_then(|p| p.checked_add(in_size))
        .ok_or_else(overflow)?;
    if dilated_kernel > padded_in_size {
        return Err(SpatialError::InvalidConfig(format!(
            "kernel size {} is larger than padded input size {}",
            dilated_kernel, padded_in_size
        )));
    }

    Ok((padded_in_size - dilated_kernel) / stride + 1)
}

/// Create an output axis for a spatial dimension of a convolution or pooling
/// operator.
///
/// The input size is taken from the axis in `input` with role `role`. The
/// kernel size is either explicit or taken from the kernel axis with the same
/// role. The returned axis is always newly created and has role `role`.
pub fn spatial_axis(
    registry: &mut AxisRegistry,
    input: &AxisSet,
    kernel: KernelExtent,
    padding: impl Into<DimPadding>,
    stride: usize,
    role: Role,
) -> Result<AxisId, SpatialError> {
    dilated_spatial_axis(registry, input, kernel, padding, stride, 1, role)
}

/// Variant of [`spatial_axis`] for dilated kernels.
pub fn dilated_spatial_axis(
    registry: &mut AxisRegistry,
    input: &AxisSet,
    kernel: KernelExtent,
    padding: impl Into<DimPadding>,
    stride: usize,
    dilation: usize,
    role: Role,
) -> Result<AxisId, SpatialError> {
    let in_axis = input
        .find_role(registry, role)
        .ok_or(SpatialError::MissingRole(role))?;
    let in_size = registry.length(in_axis)?;

    let kernel_size = match kernel {
        KernelExtent::Size(size) => size,
        KernelExtent::Axes(kernel_axes) => {
            let k_axis = kernel_axes
                .find_role(registry, role)
                .ok_or(SpatialError::MissingRole(role))?;
            registry.length(k_axis)?
        }
    };

    let out_size = output_length(in_size, kernel_size, padding.into(), stride, dilation)?;
    let axis = registry.make_axis(
        AxisSpec::new()
            .name(role.short_name())
            .role(role)
            .length(out_size),
    )?;
    Ok(axis)
}
