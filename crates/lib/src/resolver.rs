//! Last-write-wins conflict resolution.
//!
//! Versions are totally ordered by `(updated_at, canonical text)`. A newer
//! timestamp always wins; equal timestamps fall back to comparing the
//! canonical serialization so that every replica picks the same winner no
//! matter in which order the writes arrive. An incoming version only replaces
//! the current one if it is strictly greater, which also makes redelivery of
//! an identical write a no-op.
//!
//! Both the relay adapter (before republishing) and the node layer (before
//! notifying subscribers) apply this policy.

use std::cmp::Ordering;

use crate::{adapter::Update, value::NodeValue, value::TimestampedValue};

/// Outcome of comparing an incoming version against the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The incoming version wins and should replace the current one.
    Apply,
    /// The incoming version is older than, or identical to, the current one.
    Stale,
}

impl Resolution {
    pub fn is_apply(self) -> bool {
        self == Resolution::Apply
    }

    pub fn is_stale(self) -> bool {
        self == Resolution::Stale
    }
}

/// A borrowed `(updated_at, value)` pair.
///
/// A missing timestamp orders below every stamped version, and a missing
/// value compares like the directory marker's empty canonical text.
#[derive(Debug, Clone, Copy)]
pub struct Version<'a> {
    pub updated_at: Option<u64>,
    pub value: Option<&'a NodeValue>,
}

impl<'a> Version<'a> {
    pub fn new(updated_at: Option<u64>, value: Option<&'a NodeValue>) -> Self {
        Self { updated_at, value }
    }

    pub fn of(stamped: &'a TimestampedValue) -> Self {
        Self::new(stamped.updated_at, Some(&stamped.value))
    }

    pub fn of_update(update: &'a Update) -> Self {
        Self::new(update.updated_at, update.value.as_ref())
    }

    fn canonical(&self) -> String {
        self.value.map(NodeValue::to_canonical).unwrap_or_default()
    }

    /// Total order used by the resolver.
    pub fn compare(&self, other: &Version<'_>) -> Ordering {
        self.updated_at
            .cmp(&other.updated_at)
            .then_with(|| self.canonical().cmp(&other.canonical()))
    }
}

/// Decides whether `incoming` replaces `current`.
///
/// With nothing held yet, the incoming version is always applied.
pub fn resolve(incoming: Version<'_>, current: Option<Version<'_>>) -> Resolution {
    match current {
        None => Resolution::Apply,
        Some(current) if incoming.compare(&current) == Ordering::Greater => Resolution::Apply,
        Some(_) => Resolution::Stale,
    }
}
