use std::num::NonZero;

/// ID of a node in a [`Graph`](crate::Graph).
///
/// Node IDs increase in the order nodes are added, and a node's inputs always
/// have smaller IDs than the node itself.
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(NonZero<u32>);

impl NodeId {
    /// Return the underlying u32 value of the ID.
    pub fn as_u32(self) -> u32 {
        self.0.get() - 1
    }

    /// Return the underlying ID value as a usize, for slice indexing.
    pub fn as_usize(self) -> usize {
        self.as_u32() as usize
    }

    /// Construct a node ID from a u32 value.
    ///
    /// Panics if the value is `u32::MAX`.
    pub(crate) fn from_u32(value: u32) -> NodeId {
        // Stored as `value + 1`, reserving 0 as a niche so that
        // `Option<NodeId>` is the same size as `NodeId`.
        NodeId(NonZero::new(value + 1).expect("node ID overflow"))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_u32().fmt(f)
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.as_u32())
    }
}
