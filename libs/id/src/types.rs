//! Typed identity definitions.

use crate::macros::prefixed_id;

prefixed_id!(
    /// Store-assigned identity of a single object incarnation.
    ///
    /// Deleting an object and recreating it under the same key yields a new
    /// UID, which is what owner references pin to.
    ObjectUid = "uid"
);

prefixed_id!(
    /// Correlation identity for one reconciliation pass, used in log spans.
    ReconcileId = "rec"
);

// =============================================================================
// Resource Version
// =============================================================================

/// Optimistic-concurrency token stamped on every stored object.
///
/// Versions are assigned by the store from a single counter, so they are
/// strictly increasing across all objects and kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceVersion(u64);

impl ResourceVersion {
    /// Version carried by objects that have never been stored.
    pub const UNSET: Self = Self(0);

    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns true if this version was assigned by a store.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.0 != 0
    }

    /// Returns the next version, saturating at `u64::MAX`.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ResourceVersion {
    fn from(version: u64) -> Self {
        Self(version)
    }
}

impl serde::Serialize for ResourceVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceVersion {
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
