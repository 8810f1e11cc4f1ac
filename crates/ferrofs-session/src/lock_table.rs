//! Per-connection table of held locks.
//!
//! Directory and file lockers live in separate ordered lists under one
//! mutex. The mutex guards list manipulation only; releasing removed
//! lockers' references always happens after it is dropped, so a slow
//! release path never blocks concurrent add/remove calls.

use std::sync::Mutex;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::locker::{LockTarget, Locker};

#[derive(Default)]
struct Lists {
    dir_lockers: Vec<Locker>,
    file_lockers: Vec<Locker>,
}

/// Ordered collections of held lockers, split by directory/file
/// classification.
pub struct LockTable {
    lists: Mutex<Lists>,
    max_lockers: usize,
}

impl LockTable {
    /// Creates an empty table holding at most `max_lockers` entries
    /// across both lists.
    pub fn new(max_lockers: usize) -> Self {
        LockTable {
            lists: Mutex::new(Lists::default()),
            max_lockers,
        }
    }

    /// Records a new held lock.
    ///
    /// The locker is classified once from the target's entity kind and
    /// appended to the matching list. Fails with `ResourceExhausted`
    /// when the table is at capacity; never partially inserts.
    pub fn add(&self, volume: &str, pid: u32, target: LockTarget) -> Result<()> {
        let locker = Locker::new(volume, pid, target);
        let mut lists = self.lists.lock().unwrap();
        if lists.dir_lockers.len() + lists.file_lockers.len() >= self.max_lockers {
            return Err(SessionError::ResourceExhausted {
                what: "lock table",
                limit: self.max_lockers,
            });
        }
        if locker.is_directory {
            lists.dir_lockers.push(locker);
        } else {
            lists.file_lockers.push(locker);
        }
        Ok(())
    }

    /// Removes every locker matching the `(volume, pid, target)` triple
    /// and returns how many were removed.
    ///
    /// The list to scan is inferred from the target's classification.
    /// Matching zero lockers is a normal outcome (double-unlock races),
    /// not an error, and a second identical call is a no-op that
    /// releases nothing twice.
    pub fn remove_matching(&self, volume: &str, pid: u32, target: &LockTarget) -> usize {
        let mut removed: Vec<Locker> = Vec::new();
        {
            let mut lists = self.lists.lock().unwrap();
            let list = if target.is_directory() {
                &mut lists.dir_lockers
            } else {
                &mut lists.file_lockers
            };
            let mut i = 0;
            while i < list.len() {
                if list[i].matches(volume, pid, target) {
                    removed.push(list.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        // target references drop here, outside the table mutex
        let count = removed.len();
        if count == 0 {
            debug!(volume, pid, "no matching locker to remove");
        }
        count
    }

    /// Atomically detaches both lists, leaving the table empty.
    ///
    /// Returns `(dir_lockers, file_lockers)` in insertion order. The
    /// snapshot is owned solely by the caller; this is the only
    /// operation that empties the table as a whole and is used by
    /// teardown exclusively.
    pub fn drain(&self) -> (Vec<Locker>, Vec<Locker>) {
        let mut lists = self.lists.lock().unwrap();
        (
            std::mem::take(&mut lists.dir_lockers),
            std::mem::take(&mut lists.file_lockers),
        )
    }

    /// Number of directory lockers currently held.
    pub fn dir_count(&self) -> usize {
        self.lists.lock().unwrap().dir_lockers.len()
    }

    /// Number of file lockers currently held.
    pub fn file_count(&self) -> usize {
        self.lists.lock().unwrap().file_lockers.len()
    }

    /// Total lockers currently held.
    pub fn len(&self) -> usize {
        let lists = self.lists.lock().unwrap();
        lists.dir_lockers.len() + lists.file_lockers.len()
    }

    /// Returns true if no lockers are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
