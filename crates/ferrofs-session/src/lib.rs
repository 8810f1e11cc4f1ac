#![warn(missing_docs)]

//! Ferrofs session subsystem: client connection registry, per-connection lock/fd tables, disconnect teardown

pub mod backend;
pub mod connection;
pub mod error;
pub mod fdtable;
pub mod lock_table;
pub mod locker;
pub mod registry;
pub mod resolver;
pub mod teardown;
pub mod types;

pub use backend::{BackendError, CallContext, StorageBackend};
pub use connection::Connection;
pub use error::{Result, SessionError};
pub use fdtable::{FdEntry, FdTable};
pub use lock_table::LockTable;
pub use locker::{LockTarget, Locker};
pub use registry::{ConnectionHandle, ConnectionRegistry, SessionConfig};
pub use resolver::{resolve_location, LocationResolver};
pub use teardown::{on_transport_disconnect, DrainStats};
pub use types::{
    ByteRange, Entity, EntityKind, FileHandle, InodeId, Location, RELEASE_ALL_PID,
};
