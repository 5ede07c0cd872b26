use std::fmt;
use std::num::NonZero;

use smallvec::SmallVec;

use super::AxisError;

/// ID of an axis in an [`AxisRegistry`](super::AxisRegistry).
///
/// IDs are minted by the registry and are never reused, so two axes with
/// equal IDs are the same axis.
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AxisId(NonZero<u32>);

impl AxisId {
    /// Return the underlying u32 value of the ID.
    pub fn as_u32(self) -> u32 {
        self.0.get() - 1
    }

    /// Return the underlying ID value as a usize, for slice indexing.
    pub fn as_usize(self) -> usize {
        self.as_u32() as usize
    }

    /// Construct an axis ID from a u32 value.
    ///
    /// Panics if the value is `u32::MAX`.
    pub(crate) fn from_u32(value: u32) -> AxisId {
        // IDs are stored as `value + 1` so that `Option<AxisId>` is the same
        // size as `AxisId`.
        AxisId(NonZero::new(value + 1).expect("axis ID overflow"))
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_u32().fmt(f)
    }
}

impl fmt::Debug for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AxisId({})", self.as_u32())
    }
}

/// Semantic tag on an axis, used to match axes independently of their names.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Role {
    Batch,
    Channel,
    /// Output feature maps of a convolution filter.
    ChannelOut,
    Depth,
    Height,
    Width,
}

impl Role {
    /// Short name used when naming derived axes.
    pub fn short_name(self) -> &'static str {
        match self {
            Role::Batch => "N",
            Role::Channel => "C",
            Role::ChannelOut => "K",
            Role::Depth => "D",
            Role::Height => "H",
            Role::Width => "W",
        }
    }
}

/// Length of an axis, which may not be known when the axis is created.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AxisLength {
    Unresolved,
    Resolved(usize),
}

impl AxisLength {
    /// Return the length if it has been resolved.
    pub fn get(self) -> Option<usize> {
        match self {
            AxisLength::Unresolved => None,
            AxisLength::Resolved(len) => Some(len),
        }
    }
}

/// A named, role-tagged dimension descriptor.
///
/// Axes are owned by an [`AxisRegistry`](super::AxisRegistry) and referred to
/// by [`AxisId`].
#[derive(Clone, Debug)]
pub struct Axis {
    pub(super) name: Option<String>,
    pub(super) length: AxisLength,
    pub(super) roles: SmallVec<[Role; 2]>,
}

impl Axis {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn length(&self) -> AxisLength {
        self.length
    }

    /// Roles of this axis, in the order they were specified.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Return true if this is a batch axis.
    pub fn is_batch(&self) -> bool {
        self.has_role(Role::Batch)
    }
}

/// Description of an axis to create with
/// [`AxisRegistry::make_axis`](super::AxisRegistry::make_axis).
///
/// ```
/// use rten_lower::axes::{AxisSpec, Role};
///
/// let height = AxisSpec::new().role(Role::Height).length(32);
/// let batch = AxisSpec::new().batch();
/// ```
#[derive(Clone, Debug, Default)]
pub struct AxisSpec {
    length: Option<usize>,
    name: Option<String>,
    roles: SmallVec<[Role; 2]>,
    batch: bool,
}

impl AxisSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fixed length for the axis.
    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a role to the axis. Duplicate roles are ignored.
    pub fn role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Mark this as a batch axis. This implies [`Role::Batch`].
    pub fn batch(mut self) -> Self {
        self.batch = true;
        self.role(Role::Batch)
    }

    /// Validate the spec and convert it into an axis record.
    pub(super) fn into_axis(mut self) -> Result<Axis, AxisError> {
        if self.length == Some(0) {
            return Err(AxisError::Configuration("axis length must be positive"));
        }

        let batch = self.batch || self.roles.contains(&Role::Batch);
        if batch {
            if self.roles.iter().any(|r| *r != Role::Batch) {
                return Err(AxisError::Configuration(
                    "batch axis cannot have a channel or spatial role",
                ));
            }
            if self.roles.is_empty() {
                self.roles.push(Role::Batch);
            }
        }

        let name = self
            .name
            .or_else(|| batch.then(|| Role::Batch.short_name().to_string()));
        let length = match self.length {
            Some(len) => AxisLength::Resolved(len),
            None => AxisLength::Unresolved,
        };

        Ok(Axis {
            name,
            length,
            roles: self.roles,
        })
    }
}
