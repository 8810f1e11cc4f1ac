//! End-to-end teardown scenarios against a recording backend.

use std::sync::Arc;

use ferrofs_session::backend::{BackendOp, RecordingBackend};
use ferrofs_session::{
    on_transport_disconnect, ByteRange, ConnectionRegistry, Entity, EntityKind, FileHandle,
    InodeId, LockTarget, SessionConfig, StorageBackend, RELEASE_ALL_PID,
};

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn registry() -> (ConnectionRegistry, Arc<RecordingBackend>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let backend = Arc::new(RecordingBackend::new());
    let reg = ConnectionRegistry::new(
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        SessionConfig::default(),
    );
    (reg, backend)
}

fn file_handle(ino: u64) -> Arc<FileHandle> {
    FileHandle::new(Entity::new(InodeId::new(ino), EntityKind::Regular))
}

#[tokio::test]
async fn disconnect_drains_locks_but_connection_survives() {
    let (reg, backend) = registry();
    let handle = reg.acquire("client-a");
    assert_eq!(handle.reference_count(), 1);
    assert_eq!(handle.active_transports(), 1);

    let h1 = file_handle(100);
    handle
        .add_locker("vol0", 42, LockTarget::Handle(Arc::clone(&h1)))
        .unwrap();

    on_transport_disconnect(handle.connection()).unwrap();
    settle().await;

    let ops = backend.ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(
        ops[0],
        BackendOp::UnlockInode {
            volume: "vol0".to_string(),
            pid: RELEASE_ALL_PID,
            ino: InodeId::new(100),
            range: ByteRange::FULL,
        }
    );

    assert!(handle.lock_table().is_empty());
    // original acquire still holds the connection in the registry
    assert!(reg.contains("client-a"));
    assert_eq!(handle.reference_count(), 1);
}

#[tokio::test]
async fn multiplexed_transports_drain_only_on_last_disconnect() {
    let (reg, backend) = registry();
    let h1 = reg.acquire("client-b");
    let h2 = reg.acquire("client-b");
    assert_eq!(h1.reference_count(), 2);
    assert_eq!(h1.active_transports(), 2);

    h1.add_locker("vol0", 7, LockTarget::Handle(file_handle(200)))
        .unwrap();

    assert!(on_transport_disconnect(h1.connection()).is_none());
    settle().await;
    assert_eq!(backend.op_count(), 0);
    assert_eq!(h1.lock_table().len(), 1);

    let stats = on_transport_disconnect(h2.connection()).unwrap();
    assert_eq!(stats.file_unlocks, 1);
    settle().await;
    assert_eq!(backend.op_count(), 1);
}

#[tokio::test]
async fn destroy_flushes_every_registered_fd() {
    let (reg, backend) = registry();
    let handle = reg.acquire("client-c");

    for ino in [3u64, 7, 9] {
        handle.register_fd(file_handle(ino)).unwrap();
    }
    assert_eq!(handle.fd_table().len(), 3);

    handle.release();
    settle().await;

    let mut flushed: Vec<u64> = backend
        .ops()
        .iter()
        .map(|op| match op {
            BackendOp::Flush { pid, ino } => {
                assert_eq!(*pid, RELEASE_ALL_PID);
                ino.as_u64()
            }
            other => panic!("unexpected op {:?}", other),
        })
        .collect();
    flushed.sort_unstable();
    assert_eq!(flushed, vec![3, 7, 9]);
    assert!(!reg.contains("client-c"));
}

#[tokio::test]
async fn reconnect_during_drain_is_independent_of_snapshot() {
    let (reg, backend) = registry();
    let h1 = reg.acquire("client-d");
    h1.add_locker("vol0", 1, LockTarget::Handle(file_handle(300)))
        .unwrap();

    on_transport_disconnect(h1.connection()).unwrap();

    // new transport attaches before the drain's backend calls settle
    let h2 = reg.acquire("client-d");
    h2.add_locker("vol0", 2, LockTarget::Handle(file_handle(301)))
        .unwrap();
    assert_eq!(h2.lock_table().len(), 1);

    settle().await;
    // only the snapshot's locker was released
    assert_eq!(backend.op_count(), 1);
    assert_eq!(h2.lock_table().len(), 1);
}

#[tokio::test]
async fn destroy_drains_locks_and_fds_together() {
    let (reg, backend) = registry();
    let handle = reg.acquire("client-e");

    let entity = Entity::new(InodeId::new(400), EntityKind::Directory);
    let parent = Entity::new(InodeId::new(1), EntityKind::Directory);
    let loc = ferrofs_session::Location::new(entity, parent, "/exports/dir");
    handle
        .add_locker("vol0", 5, LockTarget::Location(loc))
        .unwrap();
    handle
        .add_locker("vol0", 5, LockTarget::Handle(file_handle(401)))
        .unwrap();
    handle.register_fd(file_handle(402)).unwrap();

    handle.release();
    settle().await;

    let ops = backend.ops();
    assert_eq!(ops.len(), 3);
    assert!(ops
        .iter()
        .any(|op| matches!(op, BackendOp::UnlockEntry { ino, .. } if *ino == InodeId::new(400))));
    assert!(ops
        .iter()
        .any(|op| matches!(op, BackendOp::UnlockInode { ino, .. } if *ino == InodeId::new(401))));
    assert!(ops
        .iter()
        .any(|op| matches!(op, BackendOp::Flush { ino, .. } if *ino == InodeId::new(402))));
    assert!(reg.is_empty());
}
