//! Memoized call-site bindings
//!
//! A binding depends on every class that took part in selecting it, so each
//! entry records the generations of the receiver and argument classes. A
//! lookup whose recorded generations no longer match the class info cache
//! misses, and the stale entry is dropped. Generations are recorded with
//! [`ClassInfoCache::stamp`], so a class without a record yet still gets a
//! value that no later definition can repeat.

use crate::cache::ClassInfoCache;
use crate::class_info::CachedMethod;
use crate::key::ClassKey;
use dashmap::DashMap;
use std::sync::Arc;

/// Receiver class, method name and argument classes of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSiteKey {
    pub receiver: ClassKey,
    pub method: Arc<str>,
    pub args: Vec<ClassKey>,
}

impl CallSiteKey {
    pub fn new(receiver: ClassKey, method: &str, args: Vec<ClassKey>) -> Self {
        Self {
            receiver,
            method: Arc::from(method),
            args,
        }
    }

    fn classes(&self) -> impl Iterator<Item = &ClassKey> {
        std::iter::once(&self.receiver).chain(self.args.iter())
    }
}

/// Method selected for a call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBinding {
    /// Class declaring the selected method
    pub owner: ClassKey,
    pub method: CachedMethod,
}

struct Memo {
    binding: Arc<MethodBinding>,
    /// Generations of `CallSiteKey::classes`, in order
    generations: Vec<u64>,
}

pub struct CallSiteCache {
    classes: Arc<ClassInfoCache>,
    memos: DashMap<CallSiteKey, Memo>,
    capacity: usize,
}

impl CallSiteCache {
    pub fn new(classes: Arc<ClassInfoCache>, capacity: usize) -> Self {
        Self {
            classes,
            memos: DashMap::new(),
            capacity,
        }
    }

    fn generations(&self, key: &CallSiteKey) -> Vec<u64> {
        key.classes().map(|class| self.classes.generation(class)).collect()
    }

    fn stamps(&self, key: &CallSiteKey) -> Vec<u64> {
        key.classes().map(|class| self.classes.stamp(class)).collect()
    }

    /// Memoized binding for `key` if none of its classes changed since
    pub fn get(&self, key: &CallSiteKey) -> Option<Arc<MethodBinding>> {
        let current = self.generations(key);
        let hit = {
            let memo = self.memos.get(key)?;
            (memo.generations == current).then(|| Arc::clone(&memo.binding))
        };
        if hit.is_none() {
            tracing::trace!(method = %key.method, receiver = %key.receiver, "call site invalidated");
            self.memos.remove_if(key, |_, memo| memo.generations != current);
        }
        hit
    }

    /// Memoized binding for `key`, selecting one with `select` on a miss
    ///
    /// `None` from `select` (no applicable method) is not memoized.
    pub fn get_or_bind<F>(&self, key: &CallSiteKey, select: F) -> Option<Arc<MethodBinding>>
    where
        F: FnOnce(&CallSiteKey) -> Option<MethodBinding>,
    {
        if let Some(binding) = self.get(key) {
            return Some(binding);
        }
        let generations = self.stamps(key);
        let binding = Arc::new(select(key)?);
        if self.memos.len() >= self.capacity {
            self.purge_stale();
            if self.memos.len() >= self.capacity {
                tracing::debug!(entries = self.memos.len(), "call site cache full, clearing");
                self.memos.clear();
            }
        }
        let memo = self.memos.entry(key.clone()).or_insert(Memo {
            binding: Arc::clone(&binding),
            generations,
        });
        Some(Arc::clone(&memo.binding))
    }

    /// Drop memos recorded against an older class generation
    pub fn purge_stale(&self) -> usize {
        let before = self.memos.len();
        self.memos.retain(|key, memo| {
            key.classes()
                .zip(&memo.generations)
                .all(|(class, generation)| self.classes.generation(class) == *generation)
        });
        before.saturating_sub(self.memos.len())
    }

    pub fn len(&self) -> usize {
        self.memos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_info::{CachedClass, ClassSource};
    use crate::config::CacheConfig;
    use crate::error::CacheResult;
    use std::cell::Cell;

    struct Empty;

    impl ClassSource for Empty {
        fn describe(&self, _key: &ClassKey) -> CacheResult<CachedClass> {
            Ok(CachedClass::default())
        }
    }

    fn caches(capacity: usize) -> (Arc<ClassInfoCache>, CallSiteCache) {
        let classes = Arc::new(ClassInfoCache::new(&CacheConfig::default(), Arc::new(Empty)).unwrap());
        let sites = CallSiteCache::new(Arc::clone(&classes), capacity);
        (classes, sites)
    }

    fn bind(owner: &str) -> MethodBinding {
        MethodBinding {
            owner: ClassKey::system(owner),
            method: CachedMethod::new("plus", &["java.lang.Integer"], "java.lang.Object"),
        }
    }

    fn site() -> CallSiteKey {
        CallSiteKey::new(ClassKey::system("p.A"), "plus", vec![ClassKey::system("java.lang.Integer")])
    }

    #[test]
    fn test_binding_is_memoized() {
        let (_, sites) = caches(16);
        let calls = Cell::new(0);
        let select = |_: &CallSiteKey| {
            calls.set(calls.get() + 1);
            Some(bind("p.A"))
        };
        let first = sites.get_or_bind(&site(), select).unwrap();
        let second = sites.get_or_bind(&site(), |_| panic!("memoized")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_argument_redefinition_invalidates() {
        let (classes, sites) = caches(16);
        sites.get_or_bind(&site(), |_| Some(bind("p.A")));
        classes.redefine(&ClassKey::system("java.lang.Integer"));
        assert!(sites.get(&site()).is_none());
        assert!(sites.is_empty());
        let rebound = sites.get_or_bind(&site(), |_| Some(bind("p.Base"))).unwrap();
        assert_eq!(rebound.owner, ClassKey::system("p.Base"));
    }

    #[test]
    fn test_binding_stays_invalid_after_maintenance_forgets_the_class() {
        let (classes, sites) = caches(16);
        let receiver = ClassKey::system("p.A");
        classes.get_or_compute(&receiver);
        sites.get_or_bind(&site(), |_| Some(bind("p.A")));
        classes.unload(&receiver);
        classes.maintain();
        assert_eq!(classes.generation(&receiver), 0);
        assert!(sites.get(&site()).is_none());

        // a class never described still gets a generation to be checked against
        let argument = ClassKey::system("java.lang.Integer");
        sites.get_or_bind(&site(), |_| Some(bind("p.A")));
        classes.maintain();
        assert_eq!(classes.generation(&argument), 0);
        assert!(sites.get(&site()).is_none());
    }

    #[test]
    fn test_missing_method_is_not_memoized() {
        let (_, sites) = caches(16);
        assert!(sites.get_or_bind(&site(), |_| None).is_none());
        assert!(sites.is_empty());
    }

    #[test]
    fn test_purge_and_capacity() {
        let (classes, sites) = caches(2);
        let other = CallSiteKey::new(ClassKey::system("p.B"), "plus", vec![]);
        sites.get_or_bind(&site(), |_| Some(bind("p.A")));
        sites.get_or_bind(&other, |_| Some(bind("p.B")));
        classes.unload(&ClassKey::system("p.B"));
        assert_eq!(sites.purge_stale(), 1);
        assert_eq!(sites.len(), 1);

        let third = CallSiteKey::new(ClassKey::system("p.C"), "plus", vec![]);
        let fourth = CallSiteKey::new(ClassKey::system("p.D"), "plus", vec![]);
        sites.get_or_bind(&third, |_| Some(bind("p.C")));
        sites.get_or_bind(&fourth, |_| Some(bind("p.D")));
        assert!(sites.len() <= 2);
        assert!(sites.get(&fourth).is_some());
    }
}
