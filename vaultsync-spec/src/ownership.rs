//! Ownership tag evaluation, independent of any transport.

use crate::error::{Error, Result};

/// Custom metadata field carrying the owning identity.
pub const MANAGED_BY_KEY: &str = "managed_by";

/// Outcome of comparing an entry's tag with our identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipDecision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The entry has metadata but no `managed_by` field.
    Untagged,
    /// The entry is tagged for another identity.
    OwnedBy(String),
}

/// Decide whether an existing entry tagged `existing` may be mutated by `expected`.
///
/// Only call this for entries that have metadata; absent metadata means the
/// key is unclaimed and is handled by the caller.
pub fn evaluate(existing: Option<&str>, expected: &str) -> OwnershipDecision {
    match existing {
        None => OwnershipDecision::Deny(DenyReason::Untagged),
        Some(owner) if owner == expected => OwnershipDecision::Allow,
        Some(owner) => OwnershipDecision::Deny(DenyReason::OwnedBy(owner.to_string())),
    }
}

impl OwnershipDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Convert into a `NotManaged` failure for `key` when denied.
    pub fn into_result(self, key: &str) -> Result<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(DenyReason::Untagged) => Err(Error::NotManaged {
                key: key.to_string(),
                owner: None,
            }),
            Self::Deny(DenyReason::OwnedBy(owner)) => Err(Error::NotManaged {
                key: key.to_string(),
                owner: Some(owner),
            }),
        }
    }
}
