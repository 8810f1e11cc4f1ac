//! Disconnect and destroy teardown protocol.
//!
//! Both teardown paths share one drain routine: detach the connection's
//! lock and fd tables, then issue one asynchronous backend call per
//! locker and per fd with the release-all pid sentinel. Calls are
//! fire-and-forget from the caller's perspective: the routine hands each
//! detached list to its own draining task and returns without waiting,
//! and the resource reference tied to each operation drops when its call
//! completes, success or failure. Within one list the calls are issued
//! sequentially, so releases follow the table's insertion order; no
//! ordering holds between the lists. Unlock-on-disconnect is
//! best-effort: the client is gone, so failures are logged and never
//! retried.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{CallContext, StorageBackend};
use crate::connection::Connection;
use crate::fdtable::FdTable;
use crate::lock_table::LockTable;
use crate::types::ByteRange;

/// Counts of operations issued by one drain, aggregated for logging.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Directory-entry unlocks issued.
    pub dir_unlocks: usize,
    /// Byte-range/inode unlocks issued.
    pub file_unlocks: usize,
    /// Fd flushes issued.
    pub flushes: usize,
}

impl DrainStats {
    /// Total operations issued.
    pub fn total(&self) -> usize {
        self.dir_unlocks + self.file_unlocks + self.flushes
    }
}

/// Handles one transport going away.
///
/// While other transports still multiplex the connection this only
/// decrements the live-transport count and returns `None`. On the last
/// transport, fresh empty tables are installed and the detached ones are
/// drained; the connection itself survives for as long as its reference
/// count stays above zero, so a reconnecting client lands in the fresh
/// tables unentangled with the draining snapshot.
pub fn on_transport_disconnect(conn: &Arc<Connection>) -> Option<DrainStats> {
    let (lock_table, fd_table) = conn.begin_transport_drain()?;
    let stats = drain_tables(conn.backend(), conn.identity(), lock_table, fd_table);
    debug!(
        identity = conn.identity(),
        issued = stats.total(),
        "drained connection state on transport disconnect"
    );
    Some(stats)
}

/// Final destruction once the reference count reached zero: drains
/// whatever state remains, then lets the record drop.
pub(crate) fn destroy(conn: &Arc<Connection>) -> DrainStats {
    let (lock_table, fd_table) = conn.take_tables();
    let stats = drain_tables(conn.backend(), conn.identity(), lock_table, fd_table);
    info!(identity = conn.identity(), "destroyed connection");
    stats
}

/// Shared drain routine.
///
/// The detached tables are owned solely by this call. Each list moves
/// into its own spawned task, which walks it in insertion order, awaits
/// each backend call, and drops every entry's reference as its call
/// completes. Nothing here blocks on a completion; the three tasks run
/// independently of each other.
fn drain_tables(
    backend: &Arc<dyn StorageBackend>,
    identity: &str,
    lock_table: Arc<LockTable>,
    fd_table: Arc<FdTable>,
) -> DrainStats {
    let (dir_lockers, file_lockers) = lock_table.drain();
    let fd_entries = fd_table.take_all();

    let stats = DrainStats {
        dir_unlocks: dir_lockers.len(),
        file_unlocks: file_lockers.len(),
        flushes: fd_entries.len(),
    };

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            // shutdown path with no runtime left: the snapshot still
            // drops here, so references are released without backend calls
            warn!(
                identity,
                dropped = stats.total(),
                "no runtime context; releasing session state without backend calls"
            );
            return DrainStats::default();
        }
    };

    if !file_lockers.is_empty() {
        let backend = Arc::clone(backend);
        runtime.spawn(async move {
            for locker in file_lockers {
                let result = backend
                    .unlock_inode(
                        CallContext::release_all(),
                        &locker.volume,
                        &locker.target,
                        ByteRange::FULL,
                    )
                    .await;
                if let Err(err) = result {
                    warn!(
                        volume = %locker.volume,
                        ino = %locker.target.entity().ino,
                        error = %err,
                        "best-effort inode unlock failed during teardown"
                    );
                }
                // locker and its target reference drop here, exactly once
            }
        });
    }

    if !dir_lockers.is_empty() {
        let backend = Arc::clone(backend);
        runtime.spawn(async move {
            for locker in dir_lockers {
                let result = backend
                    .unlock_entry(
                        CallContext::release_all(),
                        &locker.volume,
                        &locker.target,
                        None,
                    )
                    .await;
                if let Err(err) = result {
                    warn!(
                        volume = %locker.volume,
                        ino = %locker.target.entity().ino,
                        error = %err,
                        "best-effort entry unlock failed during teardown"
                    );
                }
            }
        });
    }

    if !fd_entries.is_empty() {
        let backend = Arc::clone(backend);
        runtime.spawn(async move {
            for entry in fd_entries {
                let result = backend
                    .flush(CallContext::release_all(), &entry.handle)
                    .await;
                if let Err(err) = result {
                    warn!(
                        handle_id = entry.handle_id,
                        ino = %entry.handle.ino(),
                        error = %err,
                        "best-effort flush failed during teardown"
                    );
                }
                // handle reference drops here
            }
        });
    }

    debug!(
        identity,
        dir_unlocks = stats.dir_unlocks,
        file_unlocks = stats.file_unlocks,
        flushes = stats.flushes,
        "issued teardown operations"
    );
    stats
}
