//! Class identity

use std::fmt;
use std::sync::Arc;

/// Identifies the loader that defined a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u32);

impl LoaderId {
    /// The bootstrap/system loader
    pub const SYSTEM: LoaderId = LoaderId(0);
}

/// A loaded class: binary name plus defining loader
///
/// Two classes with the same name from different loaders are different
/// classes. Redefinitions of one key are told apart by the cache's
/// generation counter, not by the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassKey {
    name: Arc<str>,
    loader: LoaderId,
}

impl ClassKey {
    pub fn new(name: &str, loader: LoaderId) -> Self {
        Self {
            name: Arc::from(name),
            loader,
        }
    }

    /// Class defined by the system loader
    pub fn system(name: &str) -> Self {
        Self::new(name, LoaderId::SYSTEM)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loader(&self) -> LoaderId {
        self.loader
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loader == LoaderId::SYSTEM {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.loader.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_is_part_of_identity() {
        let a = ClassKey::system("p.A");
        let b = ClassKey::new("p.A", LoaderId(3));
        assert_ne!(a, b);
        assert_eq!(a, ClassKey::new("p.A", LoaderId::SYSTEM));
        assert_eq!(a.to_string(), "p.A");
        assert_eq!(b.to_string(), "p.A@3");
    }
}
