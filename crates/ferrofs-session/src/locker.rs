//! Locker records: one entry per lock held on behalf of a client.

use std::sync::Arc;

use crate::types::{Entity, FileHandle, Location};

/// What a locker holds its lock against: an open file handle or a
/// resolved location.
///
/// The target owns one strong reference to the underlying handle or
/// entity; that reference is released exactly once, when the locker is
/// removed from its table or its teardown unlock completes.
#[derive(Clone, Debug)]
pub enum LockTarget {
    /// Lock held through an open file handle.
    Handle(Arc<FileHandle>),
    /// Lock held against a resolved location.
    Location(Location),
}

impl LockTarget {
    /// The entity the target ultimately refers to.
    pub fn entity(&self) -> &Arc<Entity> {
        match self {
            LockTarget::Handle(handle) => &handle.entity,
            LockTarget::Location(loc) => &loc.entity,
        }
    }

    /// Returns true if the target refers to a directory.
    pub fn is_directory(&self) -> bool {
        self.entity().kind.is_directory()
    }

    /// Identity comparison: handles match only the same handle object,
    /// locations match only the same entity object. A handle target
    /// never matches a location target, and path equality plays no part.
    pub fn same_identity(&self, other: &LockTarget) -> bool {
        match (self, other) {
            (LockTarget::Handle(a), LockTarget::Handle(b)) => Arc::ptr_eq(a, b),
            (LockTarget::Location(a), LockTarget::Location(b)) => {
                Arc::ptr_eq(&a.entity, &b.entity)
            }
            _ => false,
        }
    }
}

/// A record of one held lock, scoped to a volume and a client process.
///
/// Immutable after creation. `is_directory` is classified once from the
/// target's entity kind and never recomputed; if the same entity later
/// reappears with a different kind the lists will disagree, which the
/// surrounding protocol never does.
#[derive(Debug)]
pub struct Locker {
    /// Volume the lock is scoped to.
    pub volume: String,
    /// Client process that took the lock.
    pub pid: u32,
    /// What the lock is held against.
    pub target: LockTarget,
    /// Classification derived from the target at creation time.
    pub is_directory: bool,
}

impl Locker {
    /// Builds a locker, classifying it from the target's entity kind.
    pub fn new(volume: &str, pid: u32, target: LockTarget) -> Self {
        let is_directory = target.is_directory();
        Locker {
            volume: volume.to_string(),
            pid,
            target,
            is_directory,
        }
    }

    /// Returns true if this locker matches the `(volume, pid, target)`
    /// triple, using identity equality on the target.
    pub fn matches(&self, volume: &str, pid: u32, target: &LockTarget) -> bool {
        self.pid == pid && self.volume == volume && self.target.same_identity(target)
    }
}
