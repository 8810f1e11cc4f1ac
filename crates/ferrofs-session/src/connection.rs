//! Per-client connection records.
//!
//! One `Connection` exists per distinct client identity, possibly
//! multiplexing several transports. It owns the client's lock table and
//! fd table, both replaceable so teardown can swap in fresh empty tables
//! and drain the detached ones without blocking new activity.
//!
//! Lock order is registry map, then connection state, then table; no
//! mutex is ever held across a backend call.

use std::sync::{Arc, Mutex};

use crate::backend::StorageBackend;
use crate::error::Result;
use crate::fdtable::FdTable;
use crate::lock_table::LockTable;
use crate::locker::LockTarget;
use crate::registry::SessionConfig;
use crate::types::FileHandle;

struct ConnState {
    reference_count: u32,
    active_transports: u32,
    lock_table: Arc<LockTable>,
    fd_table: Arc<FdTable>,
}

/// Server-side session record for one client identity.
pub struct Connection {
    identity: String,
    backend: Arc<dyn StorageBackend>,
    config: SessionConfig,
    state: Mutex<ConnState>,
}

impl Connection {
    pub(crate) fn new(
        identity: &str,
        backend: Arc<dyn StorageBackend>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Connection {
            identity: identity.to_string(),
            backend,
            state: Mutex::new(ConnState {
                reference_count: 1,
                active_transports: 1,
                lock_table: Arc::new(LockTable::new(config.max_lockers)),
                fd_table: Arc::new(FdTable::new(config.max_fds)),
            }),
            config,
        })
    }

    /// The client identity this connection was created for.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub(crate) fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Records a lock held by `pid` on `target`, scoped to `volume`.
    ///
    /// Propagates `ResourceExhausted` synchronously so the caller's
    /// request can fail cleanly; the connection stays consistent.
    pub fn add_locker(&self, volume: &str, pid: u32, target: LockTarget) -> Result<()> {
        self.lock_table().add(volume, pid, target)
    }

    /// Removes every locker matching the `(volume, pid, target)` triple.
    /// Returns how many were removed; zero is a normal outcome.
    pub fn remove_locker(&self, volume: &str, pid: u32, target: &LockTarget) -> usize {
        self.lock_table().remove_matching(volume, pid, target)
    }

    /// Registers an open file handle and returns its small integer id.
    pub fn register_fd(&self, handle: Arc<FileHandle>) -> Result<u32> {
        self.fd_table().add(handle)
    }

    /// Releases a registered fd by id, returning the handle if it was
    /// live. The freed id becomes reusable.
    pub fn release_fd(&self, handle_id: u32) -> Option<Arc<FileHandle>> {
        self.fd_table().remove(handle_id)
    }

    /// The connection's current lock table.
    pub fn lock_table(&self) -> Arc<LockTable> {
        Arc::clone(&self.state.lock().unwrap().lock_table)
    }

    /// The connection's current fd table.
    pub fn fd_table(&self) -> Arc<FdTable> {
        Arc::clone(&self.state.lock().unwrap().fd_table)
    }

    /// Number of logical holds currently extending this connection's
    /// lifetime.
    pub fn reference_count(&self) -> u32 {
        self.state.lock().unwrap().reference_count
    }

    /// Number of transports currently multiplexed over this connection.
    pub fn active_transports(&self) -> u32 {
        self.state.lock().unwrap().active_transports
    }

    pub(crate) fn add_ref(&self) {
        let mut state = self.state.lock().unwrap();
        state.reference_count += 1;
        state.active_transports += 1;
        debug_assert!(state.active_transports <= state.reference_count);
    }

    /// Drops one logical hold. Returns true when the count reached zero
    /// and the caller must destroy the connection.
    pub(crate) fn dec_ref(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.reference_count > 0);
        state.reference_count -= 1;
        state.reference_count == 0
    }

    /// Accounts for one transport going away.
    ///
    /// Decrements the live-transport count; while other transports still
    /// multiplex this connection, returns `None` and leaves the tables
    /// untouched. On the last transport, atomically swaps in fresh empty
    /// tables and returns the detached ones for draining.
    pub(crate) fn begin_transport_drain(&self) -> Option<(Arc<LockTable>, Arc<FdTable>)> {
        let mut state = self.state.lock().unwrap();
        // a transport disconnect must arrive while its hold is still live
        debug_assert!(state.active_transports > 0);
        debug_assert!(state.active_transports <= state.reference_count);
        state.active_transports = state.active_transports.saturating_sub(1);
        if state.active_transports > 0 {
            return None;
        }
        let lock_table = std::mem::replace(
            &mut state.lock_table,
            Arc::new(LockTable::new(self.config.max_lockers)),
        );
        let fd_table = std::mem::replace(
            &mut state.fd_table,
            Arc::new(FdTable::new(self.config.max_fds)),
        );
        Some((lock_table, fd_table))
    }

    /// Detaches whatever tables remain, for final destruction. The
    /// replacements only exist so the record stays well-formed while the
    /// last references drop.
    pub(crate) fn take_tables(&self) -> (Arc<LockTable>, Arc<FdTable>) {
        let mut state = self.state.lock().unwrap();
        let lock_table = std::mem::replace(
            &mut state.lock_table,
            Arc::new(LockTable::new(self.config.max_lockers)),
        );
        let fd_table = std::mem::replace(
            &mut state.fd_table,
            Arc::new(FdTable::new(self.config.max_fds)),
        );
        (lock_table, fd_table)
    }
}
