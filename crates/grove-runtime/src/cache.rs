//! Lock-striped, generation-counted class info cache

use crate::class_info::{ClassInfo, ClassSource};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::key::ClassKey;
use crate::segment::{evict_lru, Entry, Purged, Segment, Table};
use once_cell::sync::OnceCell;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static GLOBAL: OnceCell<Arc<ClassInfoCache>> = OnceCell::new();

/// Maps loaded classes to their [`ClassInfo`]
///
/// Lookups for one key always return the same `Arc<ClassInfo>` until the
/// class is unloaded or redefined; after that the old info is invisible and
/// the next lookup creates a fresh one. Stale and surplus entries are
/// removed by [`maintain`](Self::maintain).
///
/// Generations come from one cache-wide counter and are never reused, so a
/// generation record can be dropped once no entry refers to it: whatever was
/// stamped with the dropped value can never match again.
pub struct ClassInfoCache {
    segments: Box<[Segment]>,
    mask: usize,
    segment_capacity: usize,
    source: Arc<dyn ClassSource>,
    /// LRU clock
    clock: AtomicU64,
    /// Next generation to hand out; 0 is reserved for "no record"
    next_generation: AtomicU64,
}

impl ClassInfoCache {
    pub fn new(config: &CacheConfig, source: Arc<dyn ClassSource>) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            segments: (0..config.segments).map(|_| Segment::new()).collect(),
            mask: config.segments - 1,
            segment_capacity: config.segment_capacity(),
            source,
            clock: AtomicU64::new(0),
            next_generation: AtomicU64::new(1),
        })
    }

    /// Make `cache` the process-wide instance; only the first call succeeds
    pub fn install_global(cache: Arc<ClassInfoCache>) -> CacheResult<&'static Arc<ClassInfoCache>> {
        let mut installed = false;
        let global = GLOBAL.get_or_init(|| {
            installed = true;
            cache
        });
        if installed {
            Ok(global)
        } else {
            Err(CacheError::GlobalInstalled)
        }
    }

    pub fn global() -> Option<&'static Arc<ClassInfoCache>> {
        GLOBAL.get()
    }

    fn segment(&self, key: &ClassKey) -> &Segment {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let hash = hasher.finish();
        // Fx mixes into the high bits
        &self.segments[((hash >> 32) ^ hash) as usize & self.mask]
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Generation record of `key`, created with a fresh value if missing
    fn record(&self, table: &mut Table, key: &ClassKey) -> u64 {
        *table
            .generations
            .entry(key.clone())
            .or_insert_with(|| self.next_generation.fetch_add(1, Ordering::Relaxed))
    }

    /// Info for `key` if one exists for the current generation
    pub fn get(&self, key: &ClassKey) -> Option<Arc<ClassInfo>> {
        self.segment(key).read(|table| {
            let entry = table.live(key)?;
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            Some(Arc::clone(&entry.info))
        })
    }

    /// Info for `key`, created on first use
    pub fn get_or_compute(&self, key: &ClassKey) -> Arc<ClassInfo> {
        if let Some(info) = self.get(key) {
            return info;
        }
        let capacity = self.segment_capacity;
        self.segment(key).update(|table| {
            // another thread may have won the race
            if let Some(entry) = table.live(key) {
                entry.last_used.store(self.tick(), Ordering::Relaxed);
                return Arc::clone(&entry.info);
            }
            let generation = self.record(table, key);
            tracing::trace!(class = %key, generation, "creating class info");
            let info = Arc::new(ClassInfo::new(key.clone(), generation, Arc::clone(&self.source)));
            table.entries.insert(
                key.clone(),
                Arc::new(Entry {
                    info: Arc::clone(&info),
                    last_used: AtomicU64::new(self.tick()),
                }),
            );
            if table.entries.len() > capacity {
                // the new entry carries the newest tick
                let stale: Vec<ClassKey> = table
                    .entries
                    .iter()
                    .filter(|(k, e)| table.is_stale(k, e))
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in &stale {
                    table.entries.remove(k);
                }
                evict_lru(table, capacity);
            }
            info
        })
    }

    /// Current definition generation of `key`, 0 when the cache keeps no
    /// record of it
    pub fn generation(&self, key: &ClassKey) -> u64 {
        self.segment(key).read(|table| table.generation(key))
    }

    /// Current generation of `key`, recording one if there is none
    ///
    /// Anything that must be invalidated when `key` changes is stamped with
    /// this value rather than [`generation`](Self::generation).
    pub fn stamp(&self, key: &ClassKey) -> u64 {
        match self.generation(key) {
            0 => self.segment(key).update(|table| self.record(table, key)),
            generation => generation,
        }
    }

    /// Whether `info` still describes the current definition of its class
    pub fn is_current(&self, info: &ClassInfo) -> bool {
        self.generation(info.key()) == info.generation()
    }

    fn advance(&self, key: &ClassKey) -> u64 {
        self.segment(key).update(|table| {
            let next = self.next_generation.fetch_add(1, Ordering::Relaxed);
            table.generations.insert(key.clone(), next);
            next
        })
    }

    /// The class went away; its info becomes invisible
    pub fn unload(&self, key: &ClassKey) {
        let generation = self.advance(key);
        tracing::debug!(class = %key, generation, "class unloaded");
    }

    /// The class was redefined; returns the new generation
    pub fn redefine(&self, key: &ClassKey) -> u64 {
        let generation = self.advance(key);
        tracing::debug!(class = %key, generation, "class redefined");
        generation
    }

    /// Remove stale entries, enforce the capacity bound and drop the
    /// generation records left without an entry
    pub fn maintain(&self) -> Purged {
        let mut total = Purged::default();
        for segment in self.segments.iter() {
            let purged = segment.purge(self.segment_capacity);
            total.stale += purged.stale;
            total.evicted += purged.evicted;
        }
        if total.stale + total.evicted > 0 {
            tracing::debug!(stale = total.stale, evicted = total.evicted, "class info cache maintained");
        }
        total
    }

    /// Entries held, stale ones included
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl std::fmt::Debug for ClassInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassInfoCache")
            .field("segments", &self.segments.len())
            .field("segment_capacity", &self.segment_capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_info::CachedClass;

    struct Empty;

    impl ClassSource for Empty {
        fn describe(&self, _key: &ClassKey) -> CacheResult<CachedClass> {
            Ok(CachedClass::default())
        }
    }

    fn cache(segments: usize, capacity: usize) -> ClassInfoCache {
        let config = CacheConfig {
            segments,
            capacity,
            ..CacheConfig::default()
        };
        ClassInfoCache::new(&config, Arc::new(Empty)).unwrap()
    }

    #[test]
    fn test_same_key_same_info() {
        let cache = cache(4, 64);
        let key = ClassKey::system("p.A");
        let a = cache.get_or_compute(&key);
        let b = cache.get_or_compute(&key);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &cache.get(&key).unwrap()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_redefine_hides_old_info() {
        let cache = cache(4, 64);
        let key = ClassKey::system("p.A");
        let old = cache.get_or_compute(&key);
        let generation = cache.redefine(&key);
        assert!(generation > old.generation());
        assert!(cache.get(&key).is_none());
        assert!(!cache.is_current(&old));
        let new = cache.get_or_compute(&key);
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.generation(), generation);
        assert!(cache.is_current(&new));
    }

    #[test]
    fn test_unload_then_maintain_purges() {
        let cache = cache(2, 64);
        let key = ClassKey::system("p.A");
        cache.get_or_compute(&key);
        cache.get_or_compute(&ClassKey::system("p.B"));
        cache.unload(&key);
        assert_eq!(cache.len(), 2);
        let purged = cache.maintain();
        assert_eq!(purged, Purged { stale: 1, evicted: 0 });
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.generation(&key), 0);
        assert_ne!(cache.generation(&ClassKey::system("p.B")), 0);
    }

    #[test]
    fn test_dropped_generation_record_never_revives_old_info() {
        let cache = cache(1, 8);
        let key = ClassKey::system("p.A");
        let old = cache.get_or_compute(&key);
        cache.unload(&key);
        cache.maintain();
        assert_eq!(cache.generation(&key), 0);
        assert!(!cache.is_current(&old));

        let new = cache.get_or_compute(&key);
        assert!(new.generation() > old.generation());
        assert!(!cache.is_current(&old));
        assert!(cache.is_current(&new));
    }

    #[test]
    fn test_generations_are_never_reused_across_keys() {
        let cache = cache(2, 8);
        let a = ClassKey::system("p.A");
        let b = ClassKey::system("p.B");
        let first = cache.get_or_compute(&a).generation();
        let second = cache.get_or_compute(&b).generation();
        let third = cache.redefine(&a);
        assert_ne!(first, 0);
        assert!(first < second && second < third);
        assert_eq!(cache.stamp(&a), third);
        assert_eq!(cache.generation(&ClassKey::system("p.Unseen")), 0);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = cache(1, 2);
        let a = ClassKey::system("p.A");
        let b = ClassKey::system("p.B");
        cache.get_or_compute(&a);
        cache.get_or_compute(&b);
        // touch A so B becomes the oldest
        cache.get(&a);
        cache.get_or_compute(&ClassKey::system("p.C"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn test_maintain_keeps_records_of_live_entries() {
        let cache = cache(1, 8);
        let key = ClassKey::system("p.A");
        cache.get_or_compute(&key);
        let generation = cache.redefine(&key);
        cache.get_or_compute(&key);
        cache.maintain();
        assert_eq!(cache.generation(&key), generation);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            segments: 3,
            ..CacheConfig::default()
        };
        assert!(ClassInfoCache::new(&config, Arc::new(Empty)).is_err());
    }
}
