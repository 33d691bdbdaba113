//! Modifier bitset
//!
//! Bits below 0x10000 coincide with the JVM access flags; `RECORD` is
//! source-level only and never reaches a class file.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const PUBLIC: Modifiers = Modifiers(0x0001);
    pub const PRIVATE: Modifiers = Modifiers(0x0002);
    pub const PROTECTED: Modifiers = Modifiers(0x0004);
    pub const STATIC: Modifiers = Modifiers(0x0008);
    pub const FINAL: Modifiers = Modifiers(0x0010);
    pub const SYNCHRONIZED: Modifiers = Modifiers(0x0020);
    pub const VOLATILE: Modifiers = Modifiers(0x0040);
    pub const BRIDGE: Modifiers = Modifiers(0x0040);
    pub const TRANSIENT: Modifiers = Modifiers(0x0080);
    pub const VARARGS: Modifiers = Modifiers(0x0080);
    pub const NATIVE: Modifiers = Modifiers(0x0100);
    pub const INTERFACE: Modifiers = Modifiers(0x0200);
    pub const ABSTRACT: Modifiers = Modifiers(0x0400);
    pub const STRICT: Modifiers = Modifiers(0x0800);
    pub const SYNTHETIC: Modifiers = Modifiers(0x1000);
    pub const ANNOTATION: Modifiers = Modifiers(0x2000);
    pub const ENUM: Modifiers = Modifiers(0x4000);
    pub const RECORD: Modifiers = Modifiers(0x1_0000);

    const VISIBILITY: u32 = 0x0007;

    pub const fn from_bits(bits: u32) -> Self {
        Modifiers(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Modifiers) {
        self.0 &= !other.0;
    }

    pub fn with(self, other: Modifiers) -> Self {
        Modifiers(self.0 | other.0)
    }

    pub fn without(self, other: Modifiers) -> Self {
        Modifiers(self.0 & !other.0)
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    /// Neither public, protected nor private
    pub fn is_package_private(self) -> bool {
        self.0 & Self::VISIBILITY == 0
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    /// Replace the visibility bits
    pub fn with_visibility(self, visibility: Modifiers) -> Self {
        Modifiers((self.0 & !Self::VISIBILITY) | (visibility.0 & Self::VISIBILITY))
    }

    /// JVM access flags
    pub fn access_flags(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Modifiers) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(Modifiers, &str)] = &[
            (Modifiers::PUBLIC, "public"),
            (Modifiers::PRIVATE, "private"),
            (Modifiers::PROTECTED, "protected"),
            (Modifiers::STATIC, "static"),
            (Modifiers::FINAL, "final"),
            (Modifiers::ABSTRACT, "abstract"),
            (Modifiers::SYNTHETIC, "synthetic"),
            (Modifiers::ENUM, "enum"),
            (Modifiers::RECORD, "record"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Modifiers({:#x}: {})", self.0, set.join(" "))
    }
}
