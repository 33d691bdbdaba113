//! Grove runtime dispatch cache
//!
//! Generated code dispatches dynamically through per-class metadata looked up
//! here. Classes are identified by [`ClassKey`]; every key has a definition
//! generation that [`ClassInfoCache::unload`] and
//! [`ClassInfoCache::redefine`] advance, which makes everything cached for
//! the older generation invisible:
//!
//! - [`ClassInfoCache`]: class → [`ClassInfo`] (lazy [`CachedClass`] plus the
//!   metaclass slot), lock-striped and bounded
//! - [`CallSiteCache`]: receiver and argument classes → [`MethodBinding`]
//! - [`Collector`]: background thread running the maintenance passes
//!
//! Callers never need to lock anything themselves and must not hold on to a
//! `ClassInfo` across a redefinition; [`ClassInfoCache::is_current`] tells
//! whether one still applies.

#![warn(rust_2018_idioms)]

pub mod cache;
pub mod call_site;
pub mod class_info;
pub mod collector;
pub mod config;
pub mod error;
pub mod key;
mod segment;

pub use cache::ClassInfoCache;
pub use call_site::{CallSiteCache, CallSiteKey, MethodBinding};
pub use class_info::{CachedClass, CachedField, CachedMethod, ClassInfo, ClassSource, MetaClassHandle};
pub use collector::{Collector, MaintenanceReport};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use key::{ClassKey, LoaderId};
pub use segment::Purged;
