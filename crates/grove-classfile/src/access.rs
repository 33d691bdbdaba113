//! Access and property flags
//!
//! The same bit may mean different things depending on where it appears
//! (`ACC_SUPER` on classes is `ACC_SYNCHRONIZED` on methods, `ACC_BRIDGE`
//! is `ACC_VOLATILE` on fields), so the constants are plain `u16`s.

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_STRICT: u16 = 0x0800;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

/// Visibility bits
pub const VISIBILITY_MASK: u16 = ACC_PUBLIC | ACC_PRIVATE | ACC_PROTECTED;

/// Class file magic number
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Major version for Java 1.5 class files
pub const JAVA_1_5: u16 = 49;

/// Major version for Java 1.6 class files
pub const JAVA_1_6: u16 = 50;
