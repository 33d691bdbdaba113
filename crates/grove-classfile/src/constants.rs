//! Constant pool
//!
//! Entries are deduplicated on insertion and addressed by their 1-based
//! class file index. `long` and `double` entries occupy two indices.

use crate::encoder::{ByteReader, DecodeError};
use crate::ClassfileError;
use rustc_hash::FxHashMap;

mod tags {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
}

/// A constant pool entry
///
/// Floating point values are stored as raw bits so entries can be hashed
/// and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

impl Constant {
    /// Number of pool indices the entry occupies
    pub fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Constant::Utf8(value) => {
                out.push(tags::UTF8);
                let bytes = encode_modified_utf8(value);
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(&bytes);
            }
            Constant::Integer(value) => {
                out.push(tags::INTEGER);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Float(bits) => {
                out.push(tags::FLOAT);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Long(value) => {
                out.push(tags::LONG);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Double(bits) => {
                out.push(tags::DOUBLE);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Class(name) => {
                out.push(tags::CLASS);
                out.extend_from_slice(&name.to_be_bytes());
            }
            Constant::String(value) => {
                out.push(tags::STRING);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Constant::FieldRef(class, nat) => {
                out.push(tags::FIELDREF);
                out.extend_from_slice(&class.to_be_bytes());
                out.extend_from_slice(&nat.to_be_bytes());
            }
            Constant::MethodRef(class, nat) => {
                out.push(tags::METHODREF);
                out.extend_from_slice(&class.to_be_bytes());
                out.extend_from_slice(&nat.to_be_bytes());
            }
            Constant::InterfaceMethodRef(class, nat) => {
                out.push(tags::INTERFACE_METHODREF);
                out.extend_from_slice(&class.to_be_bytes());
                out.extend_from_slice(&nat.to_be_bytes());
            }
            Constant::NameAndType(name, descriptor) => {
                out.push(tags::NAME_AND_TYPE);
                out.extend_from_slice(&name.to_be_bytes());
                out.extend_from_slice(&descriptor.to_be_bytes());
            }
        }
    }
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Constant pool with deduplication
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// Slot 0 is unused; the second slot of a long/double is `None`
    entries: Vec<Option<Constant>>,
    lookup: FxHashMap<Constant, u16>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            entries: vec![None],
            lookup: FxHashMap::default(),
        }
    }

    /// The `constant_pool_count` value: highest index plus one
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    /// Check if nothing was added yet
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Add an entry, returning the existing index for duplicates
    pub fn add(&mut self, constant: Constant) -> Result<u16, ClassfileError> {
        if let Some(&index) = self.lookup.get(&constant) {
            return Ok(index);
        }
        let index = self.entries.len();
        let width = constant.width() as usize;
        if index + width > u16::MAX as usize {
            return Err(ClassfileError::ConstantPoolOverflow);
        }
        self.lookup.insert(constant.clone(), index as u16);
        self.entries.push(Some(constant));
        if width == 2 {
            self.entries.push(None);
        }
        Ok(index as u16)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16, ClassfileError> {
        if encode_modified_utf8(value).len() > u16::MAX as usize {
            return Err(ClassfileError::Utf8TooLong(value.chars().take(32).collect()));
        }
        self.add(Constant::Utf8(value.to_string()))
    }

    /// Add a class entry; `internal_name` uses slashes (`java/lang/Object`)
    pub fn class(&mut self, internal_name: &str) -> Result<u16, ClassfileError> {
        let name = self.utf8(internal_name)?;
        self.add(Constant::Class(name))
    }

    pub fn string(&mut self, value: &str) -> Result<u16, ClassfileError> {
        let utf8 = self.utf8(value)?;
        self.add(Constant::String(utf8))
    }

    pub fn integer(&mut self, value: i32) -> Result<u16, ClassfileError> {
        self.add(Constant::Integer(value))
    }

    pub fn float(&mut self, value: f32) -> Result<u16, ClassfileError> {
        self.add(Constant::Float(value.to_bits()))
    }

    pub fn long(&mut self, value: i64) -> Result<u16, ClassfileError> {
        self.add(Constant::Long(value))
    }

    pub fn double(&mut self, value: f64) -> Result<u16, ClassfileError> {
        self.add(Constant::Double(value.to_bits()))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassfileError> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.add(Constant::NameAndType(name, descriptor))
    }

    pub fn field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassfileError> {
        let class = self.class(class)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(class, nat))
    }

    pub fn method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassfileError> {
        let class = self.class(class)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef(class, nat))
    }

    pub fn interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassfileError> {
        let class = self.class(class)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodRef(class, nat))
    }

    // ===== Lookup =====

    /// Get the entry at a class file index
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize).and_then(|e| e.as_ref())
    }

    /// Resolve a `Utf8` entry
    pub fn get_utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Some(value),
            _ => None,
        }
    }

    /// Resolve a `Class` entry to its internal name
    pub fn get_class_name(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.get_utf8(*name),
            _ => None,
        }
    }

    /// Resolve a field, method or interface method reference
    pub fn get_member_ref(&self, index: u16) -> Option<MemberRef<'_>> {
        let (class, nat) = match self.get(index)? {
            Constant::FieldRef(c, n)
            | Constant::MethodRef(c, n)
            | Constant::InterfaceMethodRef(c, n) => (*c, *n),
            _ => return None,
        };
        let (name, descriptor) = match self.get(nat)? {
            Constant::NameAndType(n, d) => (*n, *d),
            _ => return None,
        };
        Some(MemberRef {
            class: self.get_class_name(class)?,
            name: self.get_utf8(name)?,
            descriptor: self.get_utf8(descriptor)?,
        })
    }

    /// Iterate over `(index, entry)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|c| (i as u16, c)))
    }

    // ===== Encoding =====

    /// Serialize `constant_pool_count` followed by all entries
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.count().to_be_bytes());
        for (_, constant) in self.iter() {
            constant.write(out);
        }
    }

    /// Parse a pool from a class file reader positioned at
    /// `constant_pool_count`
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u16()?;
        let mut pool = ConstantPool::new();
        while (pool.entries.len() as u16) < count {
            let at = reader.position();
            let tag = reader.read_u8()?;
            let constant = match tag {
                tags::UTF8 => {
                    let len = reader.read_u16()? as usize;
                    let bytes = reader.read_bytes(len)?;
                    Constant::Utf8(decode_modified_utf8(bytes).ok_or(DecodeError::InvalidUtf8(at))?)
                }
                tags::INTEGER => Constant::Integer(reader.read_u32()? as i32),
                tags::FLOAT => Constant::Float(reader.read_u32()?),
                tags::LONG => Constant::Long(reader.read_u64()? as i64),
                tags::DOUBLE => Constant::Double(reader.read_u64()?),
                tags::CLASS => Constant::Class(reader.read_u16()?),
                tags::STRING => Constant::String(reader.read_u16()?),
                tags::FIELDREF => Constant::FieldRef(reader.read_u16()?, reader.read_u16()?),
                tags::METHODREF => Constant::MethodRef(reader.read_u16()?, reader.read_u16()?),
                tags::INTERFACE_METHODREF => {
                    Constant::InterfaceMethodRef(reader.read_u16()?, reader.read_u16()?)
                }
                tags::NAME_AND_TYPE => {
                    Constant::NameAndType(reader.read_u16()?, reader.read_u16()?)
                }
                other => return Err(DecodeError::InvalidTag(other, at)),
            };
            let index = pool.entries.len() as u16;
            let width = constant.width();
            pool.lookup.entry(constant.clone()).or_insert(index);
            pool.entries.push(Some(constant));
            if width == 2 {
                pool.entries.push(None);
            }
        }
        Ok(pool)
    }
}

/// Encode a string in the JVM's modified UTF-8 (NUL as two bytes,
/// supplementary characters as surrogate pairs)
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Decode modified UTF-8 back into a Rust string
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            units.push((((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_start_at_one() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.utf8("Code").unwrap(), 1);
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn test_deduplication() {
        let mut pool = ConstantPool::new();
        let a = pool.class("java/lang/Object").unwrap();
        let b = pool.class("java/lang/Object").unwrap();
        assert_eq!(a, b);
        // one Utf8 + one Class
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn test_wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.long(1 << 40).unwrap();
        let next = pool.integer(7).unwrap();
        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_none());
    }

    #[test]
    fn test_member_ref_resolution() {
        let mut pool = ConstantPool::new();
        let index = pool
            .method_ref("groovy/lang/Reference", "get", "()Ljava/lang/Object;")
            .unwrap();
        let member = pool.get_member_ref(index).unwrap();
        assert_eq!(member.class, "groovy/lang/Reference");
        assert_eq!(member.name, "get");
        assert_eq!(member.descriptor, "()Ljava/lang/Object;");
    }

    #[test]
    fn test_modified_utf8_nul_and_supplementary() {
        let text = "a\0b\u{1F600}";
        let bytes = encode_modified_utf8(text);
        assert_eq!(&bytes[1..3], &[0xC0, 0x80]);
        assert!(!bytes.contains(&0));
        assert_eq!(decode_modified_utf8(&bytes).as_deref(), Some(text));
    }

    #[test]
    fn test_write_then_read() {
        let mut pool = ConstantPool::new();
        pool.string("hello").unwrap();
        pool.double(2.5).unwrap();
        pool.field_ref("p/A", "x", "I").unwrap();

        let mut bytes = Vec::new();
        pool.write(&mut bytes);
        let mut reader = ByteReader::new(&bytes);
        let decoded = ConstantPool::read(&mut reader).unwrap();

        assert_eq!(decoded.count(), pool.count());
        assert!(!reader.has_more());
        let field = decoded
            .iter()
            .find_map(|(i, c)| matches!(c, Constant::FieldRef(..)).then_some(i))
            .unwrap();
        assert_eq!(decoded.get_member_ref(field).unwrap().name, "x");
    }
}
