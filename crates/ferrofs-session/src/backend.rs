//! Storage backend seam.
//!
//! The session layer never performs lock or flush work itself; it issues
//! asynchronous unlock/flush calls against the bound backend and releases
//! its own references when each call completes. All backend operations
//! are idempotent from this subsystem's point of view: unlocking a lock
//! that is already gone is not an error.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::locker::LockTarget;
use crate::types::{ByteRange, FileHandle, InodeId, RELEASE_ALL_PID};

/// Failure reported by a backend unlock or flush operation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An unlock operation failed.
    #[error("unlock failed: {0}")]
    Unlock(String),

    /// A flush operation failed.
    #[error("flush failed: {0}")]
    Flush(String),

    /// The backend is not reachable.
    #[error("backend unavailable")]
    Unavailable,
}

/// Per-call context carried with every backend operation.
///
/// During teardown the pid is [`RELEASE_ALL_PID`], instructing the
/// backend's lock engine to drop every lock the transport holds rather
/// than the locks of one request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// Process id on whose behalf the call is made.
    pub pid: u32,
}

impl CallContext {
    /// Context for a call made on behalf of one client process.
    pub fn new(pid: u32) -> Self {
        CallContext { pid }
    }

    /// Context for a teardown call that releases all locks of a transport.
    pub fn release_all() -> Self {
        CallContext {
            pid: RELEASE_ALL_PID,
        }
    }
}

/// Asynchronous storage backend consumed by the session layer.
///
/// Implementations must be safe to call from many worker threads; the
/// session layer guarantees it never holds any of its own mutexes across
/// these calls.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Releases byte-range/inode locks held on the target.
    async fn unlock_inode(
        &self,
        ctx: CallContext,
        volume: &str,
        target: &LockTarget,
        range: ByteRange,
    ) -> std::result::Result<(), BackendError>;

    /// Releases directory-entry locks held on the target. A `basename`
    /// of `None` releases entry locks for every name under the target.
    async fn unlock_entry(
        &self,
        ctx: CallContext,
        volume: &str,
        target: &LockTarget,
        basename: Option<&str>,
    ) -> std::result::Result<(), BackendError>;

    /// Flushes pending state for an open file handle.
    async fn flush(
        &self,
        ctx: CallContext,
        handle: &Arc<FileHandle>,
    ) -> std::result::Result<(), BackendError>;
}

/// One operation observed by the [`RecordingBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendOp {
    /// A byte-range/inode unlock.
    UnlockInode {
        /// Volume the lock was scoped to.
        volume: String,
        /// Pid carried in the call context.
        pid: u32,
        /// Inode the unlock targeted.
        ino: InodeId,
        /// Range released.
        range: ByteRange,
    },
    /// A directory-entry unlock.
    UnlockEntry {
        /// Volume the lock was scoped to.
        volume: String,
        /// Pid carried in the call context.
        pid: u32,
        /// Inode the unlock targeted.
        ino: InodeId,
        /// Entry name, if one was supplied.
        basename: Option<String>,
    },
    /// A file handle flush.
    Flush {
        /// Pid carried in the call context.
        pid: u32,
        /// Inode of the flushed handle.
        ino: InodeId,
    },
}

/// In-memory backend that records every issued operation.
///
/// Simulation/testing double for the real storage backend, in the same
/// spirit as the transport layer's software RDMA simulation: it lets
/// teardown behavior be exercised without a storage cluster. Completes
/// every call immediately, optionally with an injected failure.
#[derive(Default)]
pub struct RecordingBackend {
    ops: Mutex<Vec<BackendOp>>,
    fail: AtomicBool,
}

impl RecordingBackend {
    /// Creates an empty recording backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every operation issued so far, in order.
    pub fn ops(&self) -> Vec<BackendOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Number of operations issued so far.
    pub fn op_count(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    /// When set, every subsequent call records its operation and then
    /// reports a backend failure.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, op: BackendOp) -> std::result::Result<(), BackendError> {
        let failing = self.fail.load(Ordering::SeqCst);
        self.ops.lock().unwrap().push(op);
        if failing {
            Err(BackendError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    async fn unlock_inode(
        &self,
        ctx: CallContext,
        volume: &str,
        target: &LockTarget,
        range: ByteRange,
    ) -> std::result::Result<(), BackendError> {
        self.record(BackendOp::UnlockInode {
            volume: volume.to_string(),
            pid: ctx.pid,
            ino: target.entity().ino,
            range,
        })
    }

    async fn unlock_entry(
        &self,
        ctx: CallContext,
        volume: &str,
        target: &LockTarget,
        basename: Option<&str>,
    ) -> std::result::Result<(), BackendError> {
        self.record(BackendOp::UnlockEntry {
            volume: volume.to_string(),
            pid: ctx.pid,
            ino: target.entity().ino,
            basename: basename.map(str::to_string),
        })
    }

    async fn flush(
        &self,
        ctx: CallContext,
        handle: &Arc<FileHandle>,
    ) -> std::result::Result<(), BackendError> {
        self.record(BackendOp::Flush {
            pid: ctx.pid,
            ino: handle.ino(),
        })
    }
}
