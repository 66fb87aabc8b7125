//! Typed name and ID definitions.
//!
//! Server and category names are validated string labels. Queue items are
//! identified by the scheduler's integer ID. Task IDs disambiguate tasks
//! that share a display name.

use crate::define_name;

// =============================================================================
// Inventory Names
// =============================================================================

define_name!(ServerName, "server name");
define_name!(CategoryName, "category name");

// =============================================================================
// Queue Items
// =============================================================================

/// Identifier of a queued item, stable for as long as the item sits in the
/// scheduler's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(u64);

impl ItemId {
    /// Creates a new ItemId from a u64.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = crate::IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| crate::IdError::InvalidItem(s.to_string()))
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl serde::Serialize for ItemId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = u64::deserialize(deserializer)?;
        Ok(Self(id))
    }
}

// =============================================================================
// Tasks
// =============================================================================

const SEQUENCE_SEPARATOR: &str = "_num_";

/// Identifier of an admitted task instance.
///
/// Two tasks may share a display name (matrix children, re-queued identical
/// jobs); the sequence number keeps their IDs distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    base: String,
    seq: u32,
}

impl TaskId {
    /// Creates a task ID from a display name and a sequence number (>= 1).
    pub fn new(display_name: &str, seq: u32) -> Result<Self, crate::IdError> {
        let base = Self::base_for(display_name);
        if base.is_empty() {
            return Err(crate::IdError::Empty);
        }
        if seq == 0 {
            return Err(crate::IdError::InvalidSequence("0".to_string()));
        }
        Ok(Self { base, seq })
    }

    /// Normalizes a display name into the base used for task IDs.
    #[must_use]
    pub fn base_for(display_name: &str) -> String {
        display_name.trim().replace(' ', "_")
    }

    /// Parses a task ID of the form `{base}_num_{seq}`.
    pub fn parse(s: &str) -> Result<Self, crate::IdError> {
        if s.is_empty() {
            return Err(crate::IdError::Empty);
        }

        let Some((base, seq)) = s.rsplit_once(SEQUENCE_SEPARATOR) else {
            return Err(crate::IdError::MissingSequence(s.to_string()));
        };

        let seq = seq
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| crate::IdError::InvalidSequence(seq.to_string()))?;

        Self::new(base, seq)
    }

    /// Returns the normalized display-name portion.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn seq(&self) -> u32 {
        self.seq
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.base, SEQUENCE_SEPARATOR, self.seq)
    }
}

impl std::str::FromStr for TaskId {
    type Err = crate::IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
