//! Core identifier and value types shared across the session subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Process id sentinel that tells the storage backend to release every
/// lock held by the disconnecting transport, regardless of which request
/// created it.
pub const RELEASE_ALL_PID: u32 = 0;

/// Represents a unique identifier for an inode on the storage backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeId(u64);

impl InodeId {
    /// Creates a new InodeId from a raw u64 value.
    pub fn new(id: u64) -> Self {
        InodeId(id)
    }

    /// Returns the raw u64 value of this inode ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of filesystem entity a handle or location refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl EntityKind {
    /// Returns true for directory entities.
    pub fn is_directory(self) -> bool {
        matches!(self, EntityKind::Directory)
    }
}

/// A byte range within a file, used for byte-range unlock operations.
///
/// A `len` of zero means "from `start` to end of file", so the default
/// range covers the whole file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte covered by the range.
    pub start: u64,
    /// Number of bytes covered; zero means to end of file.
    pub len: u64,
}

impl ByteRange {
    /// The whole-file range, used when releasing all locks on teardown.
    pub const FULL: ByteRange = ByteRange { start: 0, len: 0 };
}

/// An entry in the server's inode cache.
///
/// Shared ownership via `Arc`: lockers, fd entries, and in-flight
/// teardown continuations each hold their own clone, and the entity is
/// released when the last clone drops.
#[derive(Debug)]
pub struct Entity {
    /// Inode this entity refers to.
    pub ino: InodeId,
    /// Entity kind, fixed for the lifetime of the cache entry.
    pub kind: EntityKind,
}

impl Entity {
    /// Creates a new shared entity reference.
    pub fn new(ino: InodeId, kind: EntityKind) -> Arc<Self> {
        Arc::new(Entity { ino, kind })
    }
}

/// An open file handle bound to one entity.
///
/// Identity matters more than content: two handles opened on the same
/// inode are distinct, and lock bookkeeping compares handles by
/// `Arc::ptr_eq`, never by inode number.
#[derive(Debug)]
pub struct FileHandle {
    /// Entity the handle was opened on.
    pub entity: Arc<Entity>,
}

impl FileHandle {
    /// Creates a new shared file handle for an entity.
    pub fn new(entity: Arc<Entity>) -> Arc<Self> {
        Arc::new(FileHandle { entity })
    }

    /// Inode the handle is open on.
    pub fn ino(&self) -> InodeId {
        self.entity.ino
    }

    /// Returns true if the handle refers to a directory.
    pub fn is_directory(&self) -> bool {
        self.entity.kind.is_directory()
    }
}

/// A resolved filesystem locator, as produced by the location resolver.
///
/// Cloning a Location acquires new references to the entity and its
/// parent; the clones are independent after that.
#[derive(Clone, Debug)]
pub struct Location {
    /// The resolved entity.
    pub entity: Arc<Entity>,
    /// The entity's parent directory.
    pub parent: Arc<Entity>,
    /// Canonical path as rebuilt by the resolver.
    pub canonical_path: String,
    /// Final path component of `canonical_path`.
    pub basename: String,
}

impl Location {
    /// Builds a location from a resolved entity, parent, and canonical path.
    pub fn new(entity: Arc<Entity>, parent: Arc<Entity>, canonical_path: &str) -> Self {
        let basename = canonical_path
            .rsplit('/')
            .next()
            .unwrap_or(canonical_path)
            .to_string();
        Location {
            entity,
            parent,
            canonical_path: canonical_path.to_string(),
            basename,
        }
    }

    /// Inode of the resolved entity.
    pub fn ino(&self) -> InodeId {
        self.entity.ino
    }

    /// Returns true if the resolved entity is a directory.
    pub fn is_directory(&self) -> bool {
        self.entity.kind.is_directory()
    }
}
