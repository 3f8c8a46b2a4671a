//! Identifier types used across the workspace.

use crate::define_id;

define_id!(
    /// Identifies a network (one managed application across many hosts).
    NetworkId,
    "net"
);
define_id!(
    /// Identifies one managed application instance bound to one host.
    DescriptorId,
    "desc"
);
define_id!(
    /// Identifies a scanner attached to a network.
    ScannerId,
    "scan"
);
define_id!(
    /// Identifies one successful deployment of an application instance.
    DeploymentId,
    "dpl"
);

// =============================================================================
// Cycle Sequence
// =============================================================================

/// Monotonic number of a scanner cycle, starting at 1 for the first cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CycleSeq(u64);

impl CycleSeq {
    /// The first cycle.
    pub const FIRST: Self = Self(1);

    /// Creates a sequence number from a raw value.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the following cycle number.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for CycleSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CycleSeq {
    fn from(seq: u64) -> Self {
        Self(seq)
    }
}

impl serde::Serialize for CycleSeq {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for CycleSeq {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Self)
    }
}

// =============================================================================
// Tests
// =============================================================================
