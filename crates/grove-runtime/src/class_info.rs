//! Per-class runtime metadata
//!
//! A [`ClassInfo`] is created on the first dispatch through a class and
//! lives in the [`ClassInfoCache`](crate::ClassInfoCache) until its class
//! generation advances or it is evicted. The reflective description
//! ([`CachedClass`]) is computed on first use through the cache's
//! [`ClassSource`].

use crate::error::{CacheError, CacheResult};
use crate::key::ClassKey;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Opaque metaclass object owned by the dispatch layer
pub type MetaClassHandle = Arc<dyn Any + Send + Sync>;

/// Reflective method description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMethod {
    pub name: String,
    /// Binary names of the parameter classes
    pub params: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
}

impl CachedMethod {
    pub fn new(name: &str, params: &[&str], return_type: &str) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            return_type: return_type.to_string(),
            is_static: false,
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedField {
    pub name: String,
    pub ty: String,
    pub is_static: bool,
}

/// Reflective description of one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedClass {
    pub methods: Vec<CachedMethod>,
    pub fields: Vec<CachedField>,
}

impl CachedClass {
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CachedMethod> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&CachedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Produces reflective descriptions of loaded classes
pub trait ClassSource: Send + Sync {
    fn describe(&self, key: &ClassKey) -> CacheResult<CachedClass>;
}

/// How the metaclass slot holds its value
///
/// A strong metaclass was set explicitly and stays until replaced. A weak
/// one was created by the dispatch layer, which owns it; the slot only
/// remembers it while someone else keeps it alive.
enum MetaClassRef {
    Strong(MetaClassHandle),
    Weak(Weak<dyn Any + Send + Sync>),
}

pub struct ClassInfo {
    key: ClassKey,
    /// Class generation this info was created for
    generation: u64,
    source: Arc<dyn ClassSource>,
    cached: OnceCell<Arc<CachedClass>>,
    meta_class: Mutex<Option<MetaClassRef>>,
    /// Bumped on every metaclass change
    version: AtomicU64,
}

impl ClassInfo {
    pub(crate) fn new(key: ClassKey, generation: u64, source: Arc<dyn ClassSource>) -> Self {
        Self {
            key,
            generation,
            source,
            cached: OnceCell::new(),
            meta_class: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &ClassKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reflective description, computed once per info
    pub fn cached_class(&self) -> CacheResult<Arc<CachedClass>> {
        self.cached
            .get_or_try_init(|| {
                tracing::trace!(class = %self.key, "describing class");
                self.source.describe(&self.key).map(Arc::new)
            })
            .cloned()
    }

    /// Whether the description has been computed
    pub fn is_described(&self) -> bool {
        self.cached.get().is_some()
    }

    pub fn meta_class(&self) -> Option<MetaClassHandle> {
        match self.meta_class.lock().as_ref()? {
            MetaClassRef::Strong(mc) => Some(Arc::clone(mc)),
            MetaClassRef::Weak(mc) => mc.upgrade(),
        }
    }

    /// Pin `meta_class` (or clear the slot with `None`)
    pub fn set_strong_meta_class(&self, meta_class: Option<MetaClassHandle>) {
        *self.meta_class.lock() = meta_class.map(MetaClassRef::Strong);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Remember `meta_class` without keeping it alive
    pub fn set_weak_meta_class(&self, meta_class: &MetaClassHandle) {
        *self.meta_class.lock() = Some(MetaClassRef::Weak(Arc::downgrade(meta_class)));
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn has_strong_meta_class(&self) -> bool {
        matches!(*self.meta_class.lock(), Some(MetaClassRef::Strong(_)))
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Fail when the class has moved past this info's generation
    pub fn ensure_current(&self, current: u64) -> CacheResult<()> {
        if current == self.generation {
            Ok(())
        } else {
            Err(CacheError::Stale {
                key: self.key.clone(),
                stamp: self.generation,
                current,
            })
        }
    }
}

impl std::fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassInfo")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("described", &self.is_described())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting(AtomicUsize);

    impl ClassSource for Counting {
        fn describe(&self, _key: &ClassKey) -> CacheResult<CachedClass> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(CachedClass {
                methods: vec![CachedMethod::new("run", &[], "void")],
                fields: Vec::new(),
            })
        }
    }

    fn info() -> (ClassInfo, Arc<Counting>) {
        let source = Arc::new(Counting(AtomicUsize::new(0)));
        (ClassInfo::new(ClassKey::system("p.A"), 0, source.clone()), source)
    }

    #[test]
    fn test_description_is_computed_once() {
        let (info, source) = info();
        assert!(!info.is_described());
        let first = info.cached_class().unwrap();
        let second = info.cached_class().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        assert_eq!(first.methods_named("run").count(), 1);
    }

    #[test]
    fn test_strong_meta_class_is_kept() {
        let (info, _) = info();
        info.set_strong_meta_class(Some(Arc::new(7u32)));
        assert!(info.has_strong_meta_class());
        let mc = info.meta_class().unwrap();
        assert_eq!(mc.downcast_ref::<u32>(), Some(&7));
        assert_eq!(info.version(), 1);
    }

    #[test]
    fn test_weak_meta_class_follows_owner() {
        let (info, _) = info();
        let owned: MetaClassHandle = Arc::new("meta");
        info.set_weak_meta_class(&owned);
        assert!(info.meta_class().is_some());
        assert!(!info.has_strong_meta_class());
        drop(owned);
        assert!(info.meta_class().is_none());
        info.set_strong_meta_class(None);
        assert_eq!(info.version(), 2);
    }

    #[test]
    fn test_stale_generation() {
        let (info, _) = info();
        assert!(info.ensure_current(0).is_ok());
        assert!(matches!(info.ensure_current(1), Err(CacheError::Stale { stamp: 0, current: 1, .. })));
    }
}
