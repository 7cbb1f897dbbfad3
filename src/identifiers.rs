//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//!
//! | Type | Chosen by | Purpose |
//! |------|-----------|---------|
//! | [`Cid`] | Client | Correlates a request with its completion event |
//! | [`SeqId`] | Server | Addresses one live sequence |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Cid
// ============================================================================

/// Correlation id for one request/response pair.
///
/// Assigned by the client, unique within one connection lifetime, and
/// echoed by the server on every event tied to the request. Opaque ASCII;
/// the connection renders its monotone counter as `cid_<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    /// Creates a cid from a connection-local counter value.
    #[inline]
    #[must_use]
    pub(crate) fn from_index(index: u64) -> Self {
        Self(format!("cid_{index}"))
    }

    /// Returns the cid as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SeqId
// ============================================================================

/// Server-chosen opaque handle for a sequence.
///
/// Returned in the open acknowledgement and included in every subsequent
/// event for that sequence and every command targeting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(String);

impl SeqId {
    /// Creates a sequence id from a server-provided string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the sequence id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
