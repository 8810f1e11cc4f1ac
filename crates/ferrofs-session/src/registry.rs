//! Process-wide connection registry.
//!
//! One injectable registry owns the lifecycle of every connection. The
//! registry mutex guards map membership only; destruction runs outside
//! it so teardown's backend calls never stall unrelated lookups.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::connection::Connection;
use crate::teardown;

/// Per-connection capacity limits.
#[derive(Copy, Clone, Debug)]
pub struct SessionConfig {
    /// Maximum lockers held per connection (default: 4096).
    pub max_lockers: usize,
    /// Maximum open fds per connection (default: 1024).
    pub max_fds: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_lockers: 4096,
            max_fds: 1024,
        }
    }
}

struct RegistryInner {
    backend: Arc<dyn StorageBackend>,
    config: SessionConfig,
    conns: Mutex<HashMap<String, Arc<Connection>>>,
}

impl RegistryInner {
    fn release(&self, conn: &Arc<Connection>) {
        let destroy = {
            let mut conns = self.conns.lock().unwrap();
            let now_zero = conn.dec_ref();
            if now_zero {
                conns.remove(conn.identity());
            }
            now_zero
        };
        if destroy {
            // outside the registry mutex: this issues backend calls
            teardown::destroy(conn);
        }
    }
}

/// One logical hold on a connection.
///
/// Dropping the handle releases the hold; the release that brings the
/// reference count to zero removes the connection from the registry and
/// drains whatever locks and fds remain. Draining issues backend calls
/// via the current async runtime; a drop outside any runtime releases
/// the remaining state without issuing them.
pub struct ConnectionHandle {
    conn: Arc<Connection>,
    registry: Arc<RegistryInner>,
}

impl ConnectionHandle {
    /// The connection this handle holds open.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Explicitly releases the hold. Equivalent to dropping the handle.
    pub fn release(self) {}
}

impl Deref for ConnectionHandle {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.registry.release(&self.conn);
    }
}

/// Registry of live connections, keyed by client identity.
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Creates a registry whose connections are bound to `backend`.
    pub fn new(backend: Arc<dyn StorageBackend>, config: SessionConfig) -> Self {
        ConnectionRegistry {
            inner: Arc::new(RegistryInner {
                backend,
                config,
                conns: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Looks up or creates the connection for `identity` and returns a
    /// handle representing one logical hold.
    ///
    /// A fresh connection starts with one reference and one active
    /// transport; an existing one has both counters incremented.
    pub fn acquire(&self, identity: &str) -> ConnectionHandle {
        let conn = {
            let mut conns = self.inner.conns.lock().unwrap();
            match conns.get(identity) {
                Some(conn) => {
                    conn.add_ref();
                    Arc::clone(conn)
                }
                None => {
                    debug!(identity, "registering new connection");
                    let conn = Connection::new(
                        identity,
                        Arc::clone(&self.inner.backend),
                        self.inner.config,
                    );
                    conns.insert(identity.to_string(), Arc::clone(&conn));
                    conn
                }
            }
        };
        ConnectionHandle {
            conn,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Returns true if a connection exists for `identity`.
    pub fn contains(&self, identity: &str) -> bool {
        self.inner.conns.lock().unwrap().contains_key(identity)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.inner.conns.lock().unwrap().len()
    }

    /// Returns true if no connections are live.
    pub fn is_empty(&self) -> bool {
        self.inner.conns.lock().unwrap().is_empty()
    }
}
