//! Per-connection file-descriptor table.
//!
//! Maps small integer handle ids to open file handles. Ids are unique
//! while live, allocated lowest-free-slot first, and reusable once
//! freed. `take_all` atomically detaches every entry so a racing insert
//! lands either in the detached snapshot or in the now-empty table,
//! never lost and never duplicated.

use std::sync::{Arc, Mutex};

use crate::error::{Result, SessionError};
use crate::types::FileHandle;

/// One detached fd table entry.
#[derive(Clone, Debug)]
pub struct FdEntry {
    /// The small integer id the client used for this handle.
    pub handle_id: u32,
    /// The open file handle.
    pub handle: Arc<FileHandle>,
}

/// Slot map from handle id to open file handle.
pub struct FdTable {
    slots: Mutex<Vec<Option<Arc<FileHandle>>>>,
    max_fds: usize,
}

impl FdTable {
    /// Creates an empty table holding at most `max_fds` live entries.
    pub fn new(max_fds: usize) -> Self {
        FdTable {
            slots: Mutex::new(Vec::new()),
            max_fds,
        }
    }

    /// Registers a handle and returns its id, the lowest free slot.
    ///
    /// Fails with `ResourceExhausted` once `max_fds` entries are live.
    pub fn add(&self, handle: Arc<FileHandle>) -> Result<u32> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(free) = slots.iter().position(Option::is_none) {
            slots[free] = Some(handle);
            return Ok(free as u32);
        }
        if slots.len() >= self.max_fds {
            return Err(SessionError::ResourceExhausted {
                what: "fd table",
                limit: self.max_fds,
            });
        }
        slots.push(Some(handle));
        Ok((slots.len() - 1) as u32)
    }

    /// Looks up a live handle by id.
    pub fn get(&self, handle_id: u32) -> Option<Arc<FileHandle>> {
        let slots = self.slots.lock().unwrap();
        slots.get(handle_id as usize).and_then(Clone::clone)
    }

    /// Removes a handle by id, returning it if it was live. The freed
    /// id becomes reusable.
    pub fn remove(&self, handle_id: u32) -> Option<Arc<FileHandle>> {
        let mut slots = self.slots.lock().unwrap();
        slots.get_mut(handle_id as usize).and_then(Option::take)
    }

    /// Atomically detaches every live entry, leaving the table empty.
    pub fn take_all(&self) -> Vec<FdEntry> {
        let mut slots = self.slots.lock().unwrap();
        let detached = std::mem::take(&mut *slots);
        detached
            .into_iter()
            .enumerate()
            .filter_map(|(id, slot)| {
                slot.map(|handle| FdEntry {
                    handle_id: id as u32,
                    handle,
                })
            })
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns true if no entries are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityKind, InodeId};

    fn handle(ino: u64) -> Arc<FileHandle> {
        FileHandle::new(Entity::new(InodeId::new(ino), EntityKind::Regular))
    }

    #[test]
    fn test_add_allocates_sequential_ids() {
        let table = FdTable::new(16);
        assert_eq!(table.add(handle(1)).unwrap(), 0);
        assert_eq!(table.add(handle(2)).unwrap(), 1);
        assert_eq!(table.add(handle(3)).unwrap(), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_freed_id_is_reused_lowest_first() {
        let table = FdTable::new(16);
        table.add(handle(1)).unwrap();
        let id1 = table.add(handle(2)).unwrap();
        table.add(handle(3)).unwrap();

        assert!(table.remove(id1).is_some());
        assert_eq!(table.add(handle(4)).unwrap(), id1);
    }

    #[test]
    fn test_capacity_limit() {
        let table = FdTable::new(2);
        table.add(handle(1)).unwrap();
        table.add(handle(2)).unwrap();

        let err = table.add(handle(3)).unwrap_err();
        assert!(matches!(err, SessionError::ResourceExhausted { .. }));
    }

    #[test]
    fn test_remove_twice_returns_none() {
        let table = FdTable::new(16);
        let id = table.add(handle(1)).unwrap();
        assert!(table.remove(id).is_some());
        assert!(table.remove(id).is_none());
    }

    #[test]
    fn test_get_returns_live_handle() {
        let table = FdTable::new(16);
        let h = handle(9);
        let id = table.add(Arc::clone(&h)).unwrap();
        assert!(Arc::ptr_eq(&table.get(id).unwrap(), &h));
        assert!(table.get(99).is_none());
    }

    #[test]
    fn test_take_all_detaches_everything() {
        let table = FdTable::new(16);
        let id0 = table.add(handle(1)).unwrap();
        let id1 = table.add(handle(2)).unwrap();
        table.remove(id0).unwrap();

        let entries = table.take_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].handle_id, id1);
        assert!(table.is_empty());

        // table is usable again after detachment
        assert_eq!(table.add(handle(3)).unwrap(), 0);
    }
}
