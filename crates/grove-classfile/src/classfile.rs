//! Class file container, encoder and decoder

use crate::access::{JAVA_1_5, MAGIC};
use crate::attribute::{read_attributes, write_attributes, Attribute, CodeAttribute};
use crate::constants::ConstantPool;
use crate::encoder::{ByteReader, DecodeError, EncodeError};
use thiserror::Error;

/// Class file encoding errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassfileError {
    /// More than 65535 constant pool slots
    #[error("Too many constants (max 65535)")]
    ConstantPoolOverflow,

    /// A string does not fit in a `CONSTANT_Utf8` entry
    #[error("String constant starting with '{0}' exceeds 65535 bytes")]
    Utf8TooLong(String),

    /// Method body over the 64k limit
    #[error("Method code too large ({0} bytes, max 65535)")]
    CodeTooLarge(usize),

    /// Instruction assembly failure
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
}

/// A field or method
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    pub fn new(access_flags: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            attributes: Vec::new(),
        }
    }

    /// The `Code` attribute, if this is a concrete method
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }
}

/// An in-memory class file
///
/// Instructions inside `Code` attributes reference entries of `pool`
/// directly; names held as strings are interned on `encode`.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access_flags: u16,
    /// Internal name of this class
    pub this_class: String,
    /// Internal name of the superclass; `None` only for `java/lang/Object`
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn new(this_class: impl Into<String>) -> Self {
        Self {
            minor_version: 0,
            major_version: JAVA_1_5,
            pool: ConstantPool::new(),
            access_flags: 0,
            this_class: this_class.into(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MemberInfo> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&MemberInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Serialize to class file bytes
    ///
    /// The body is written first so every name it needs is interned before
    /// the pool itself is emitted.
    pub fn encode(mut self) -> Result<Vec<u8>, ClassfileError> {
        let pool = &mut self.pool;
        let mut body = Vec::new();
        body.extend_from_slice(&self.access_flags.to_be_bytes());
        body.extend_from_slice(&pool.class(&self.this_class)?.to_be_bytes());
        let super_index = match &self.super_class {
            Some(name) => pool.class(name)?,
            None => 0,
        };
        body.extend_from_slice(&super_index.to_be_bytes());
        body.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            body.extend_from_slice(&pool.class(interface)?.to_be_bytes());
        }
        for members in [&self.fields, &self.methods] {
            body.extend_from_slice(&(members.len() as u16).to_be_bytes());
            for member in members.iter() {
                body.extend_from_slice(&member.access_flags.to_be_bytes());
                body.extend_from_slice(&pool.utf8(&member.name)?.to_be_bytes());
                body.extend_from_slice(&pool.utf8(&member.descriptor)?.to_be_bytes());
                write_attributes(&member.attributes, pool, &mut body)?;
            }
        }
        write_attributes(&self.attributes, pool, &mut body)?;

        let mut out = Vec::with_capacity(body.len() + 256);
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&self.minor_version.to_be_bytes());
        out.extend_from_slice(&self.major_version.to_be_bytes());
        pool.write(&mut out);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse class file bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(DecodeError::InvalidTag((magic >> 24) as u8, 0));
        }
        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        let pool = ConstantPool::read(&mut reader)?;
        let class_name = |index: u16| -> Result<String, DecodeError> {
            pool.get_class_name(index)
                .map(str::to_string)
                .ok_or(DecodeError::BadConstantRef(index))
        };
        let access_flags = reader.read_u16()?;
        let this_class = class_name(reader.read_u16()?)?;
        let super_index = reader.read_u16()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(class_name(super_index)?)
        };
        let interface_count = reader.read_u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(class_name(reader.read_u16()?)?);
        }
        let fields = read_members(&mut reader, &pool)?;
        let methods = read_members(&mut reader, &pool)?;
        let attributes = read_attributes(&mut reader, &pool)?;
        Ok(Self {
            minor_version,
            major_version,
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

fn read_members(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Vec<MemberInfo>, DecodeError> {
    let count = reader.read_u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u16()?;
        let name_index = reader.read_u16()?;
        let descriptor_index = reader.read_u16()?;
        let name = pool
            .get_utf8(name_index)
            .ok_or(DecodeError::BadConstantRef(name_index))?;
        let descriptor = pool
            .get_utf8(descriptor_index)
            .ok_or(DecodeError::BadConstantRef(descriptor_index))?;
        let mut member = MemberInfo::new(access_flags, name, descriptor);
        member.attributes = read_attributes(reader, pool)?;
        members.push(member);
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::*;
    use crate::attribute::InnerClassEntry;
    use crate::opcode::Opcode;

    fn sample() -> ClassFile {
        let mut class = ClassFile::new("p/Sample");
        class.access_flags = ACC_PUBLIC | ACC_SUPER;
        class.interfaces.push("groovy/lang/GroovyObject".into());
        class
            .fields
            .push(MemberInfo::new(ACC_PRIVATE, "count", "I"));

        let init = class
            .pool
            .method_ref("java/lang/Object", "<init>", "()V")
            .unwrap();
        let mut ctor = MemberInfo::new(ACC_PUBLIC, "<init>", "()V");
        let [hi, lo] = init.to_be_bytes();
        ctor.attributes.push(Attribute::Code(CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: vec![
                Opcode::Aload0.to_u8(),
                Opcode::Invokespecial.to_u8(),
                hi,
                lo,
                Opcode::Return.to_u8(),
            ],
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }));
        class.methods.push(ctor);
        class.attributes.push(Attribute::SourceFile("Sample.groovy".into()));
        class.attributes.push(Attribute::InnerClasses(vec![InnerClassEntry {
            inner_class: "p/Sample$1".into(),
            outer_class: None,
            inner_name: None,
            access_flags: 0,
        }]));
        class
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), JAVA_1_5);
    }

    #[test]
    fn test_encode_then_decode() {
        let bytes = sample().encode().unwrap();
        let decoded = ClassFile::decode(&bytes).unwrap();

        assert_eq!(decoded.this_class, "p/Sample");
        assert_eq!(decoded.super_class.as_deref(), Some("java/lang/Object"));
        assert_eq!(decoded.interfaces, vec!["groovy/lang/GroovyObject".to_string()]);
        assert_eq!(decoded.field("count").unwrap().descriptor, "I");

        let ctor = decoded.method("<init>", "()V").unwrap();
        let code = ctor.code().unwrap();
        assert_eq!(code.code.len(), 5);
        let index = u16::from_be_bytes([code.code[2], code.code[3]]);
        assert_eq!(decoded.pool.get_member_ref(index).unwrap().class, "java/lang/Object");

        match decoded.attribute("InnerClasses") {
            Some(Attribute::InnerClasses(entries)) => {
                assert_eq!(entries[0].outer_class, None);
                assert_eq!(entries[0].inner_name, None);
            }
            other => panic!("expected inner classes, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_magic() {
        assert!(ClassFile::decode(&[0, 0, 0, 0, 0, 0, 0, 49]).is_err());
    }
}
