//! One lock stripe of the class info cache
//!
//! The published table sits behind an epoch-managed atomic pointer. Readers
//! pin the current epoch and load it, so a lookup never takes a lock and
//! never observes a table in the middle of a rewrite. Writers serialize on
//! a separate lock, build the next table from a copy of the current one and
//! publish it in one swap; the replaced table is freed once every reader
//! pinned before the swap has moved on. Access ticks are updated in place.

use crate::class_info::ClassInfo;
use crate::key::ClassKey;
use crossbeam::epoch::{self, Atomic, Guard, Owned};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) struct Entry {
    pub info: Arc<ClassInfo>,
    /// Access tick of the latest hit
    pub last_used: AtomicU64,
}

impl Entry {
    fn stamp(&self) -> u64 {
        self.info.generation()
    }
}

#[derive(Clone, Default)]
pub(crate) struct Table {
    pub entries: FxHashMap<ClassKey, Arc<Entry>>,
    /// Current definition generation per class; absent means 0, which is
    /// never handed out
    pub generations: FxHashMap<ClassKey, u64>,
}

impl Table {
    pub fn generation(&self, key: &ClassKey) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    /// Entry for `key` if it belongs to the current generation
    pub fn live(&self, key: &ClassKey) -> Option<&Arc<Entry>> {
        self.entries
            .get(key)
            .filter(|entry| entry.stamp() == self.generation(key))
    }

    pub fn is_stale(&self, key: &ClassKey, entry: &Entry) -> bool {
        entry.stamp() != self.generation(key)
    }
}

/// Counts of removed entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Purged {
    pub stale: usize,
    pub evicted: usize,
}

pub(crate) struct Segment {
    current: Atomic<Table>,
    write: Mutex<()>,
}

impl Segment {
    pub fn new() -> Self {
        Self {
            current: Atomic::new(Table::default()),
            write: Mutex::new(()),
        }
    }

    fn published<'g>(&self, guard: &'g Guard) -> &'g Table {
        let table = self.current.load(Ordering::Acquire, guard);
        // SAFETY: the pointer is never null, and a replaced table is only
        // destroyed after every guard that could have loaded it is dropped
        unsafe { table.deref() }
    }

    /// Run `f` on the published table without locking
    pub fn read<R>(&self, f: impl FnOnce(&Table) -> R) -> R {
        let guard = epoch::pin();
        f(self.published(&guard))
    }

    /// Run `f` on a private copy of the table and publish the result
    ///
    /// Writers are serialized, so the copy is taken from the latest table.
    pub fn update<R>(&self, f: impl FnOnce(&mut Table) -> R) -> R {
        let _writer = self.write.lock();
        let guard = epoch::pin();
        let mut next = self.published(&guard).clone();
        let result = f(&mut next);
        let replaced = self.current.swap(Owned::new(next), Ordering::AcqRel, &guard);
        // SAFETY: `replaced` is unlinked; readers still holding it are pinned
        unsafe { guard.defer_destroy(replaced) };
        result
    }

    pub fn len(&self) -> usize {
        self.read(|table| table.entries.len())
    }

    /// Drop stale entries, then least recently used ones above `capacity`,
    /// then the generation records no entry refers to
    pub fn purge(&self, capacity: usize) -> Purged {
        self.update(|table| {
            let before = table.entries.len();
            let generations = &table.generations;
            table
                .entries
                .retain(|key, entry| entry.stamp() == generations.get(key).copied().unwrap_or(0));
            let stale = before - table.entries.len();
            let evicted = evict_lru(table, capacity);
            let entries = &table.entries;
            table.generations.retain(|key, _| entries.contains_key(key));
            Purged { stale, evicted }
        })
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out concurrent readers
        unsafe {
            let table = self.current.load(Ordering::Relaxed, epoch::unprotected());
            drop(table.into_owned());
        }
    }
}

/// Remove least recently used entries until at most `capacity` remain
pub(crate) fn evict_lru(table: &mut Table, capacity: usize) -> usize {
    let excess = table.entries.len().saturating_sub(capacity);
    if excess == 0 {
        return 0;
    }
    let mut by_age: Vec<(u64, ClassKey)> = table
        .entries
        .iter()
        .map(|(key, entry)| (entry.last_used.load(Ordering::Relaxed), key.clone()))
        .collect();
    by_age.sort_unstable();
    for (_, key) in by_age.into_iter().take(excess) {
        tracing::trace!(class = %key, "evicting class info");
        table.entries.remove(&key);
    }
    excess
}
