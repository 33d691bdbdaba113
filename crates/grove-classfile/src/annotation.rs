//! Annotation structures (`RuntimeVisibleAnnotations`, `AnnotationDefault`)
//!
//! Names and descriptors are kept as strings and interned into the pool
//! when the owning class file is encoded.

use crate::constants::ConstantPool;
use crate::encoder::{ByteReader, DecodeError};
use crate::ClassfileError;

/// A constant element value
#[derive(Debug, Clone, PartialEq)]
pub enum ConstElement {
    Byte(i8),
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    String(String),
}

impl ConstElement {
    fn tag(&self) -> u8 {
        match self {
            ConstElement::Byte(_) => b'B',
            ConstElement::Char(_) => b'C',
            ConstElement::Double(_) => b'D',
            ConstElement::Float(_) => b'F',
            ConstElement::Int(_) => b'I',
            ConstElement::Long(_) => b'J',
            ConstElement::Short(_) => b'S',
            ConstElement::Boolean(_) => b'Z',
            ConstElement::String(_) => b's',
        }
    }

    fn intern(&self, pool: &mut ConstantPool) -> Result<u16, ClassfileError> {
        match self {
            ConstElement::Byte(v) => pool.integer(*v as i32),
            ConstElement::Char(v) => pool.integer(*v as i32),
            ConstElement::Short(v) => pool.integer(*v as i32),
            ConstElement::Int(v) => pool.integer(*v),
            ConstElement::Boolean(v) => pool.integer(*v as i32),
            ConstElement::Long(v) => pool.long(*v),
            ConstElement::Float(v) => pool.float(*v),
            ConstElement::Double(v) => pool.double(*v),
            ConstElement::String(v) => pool.utf8(v),
        }
    }
}

/// An `element_value` structure
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const(ConstElement),
    Enum {
        /// Field descriptor of the enum type
        type_descriptor: String,
        const_name: String,
    },
    /// Return descriptor of the class literal (`Ljava/lang/String;`, `V`)
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

/// An `annotation` structure
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation type
    pub type_descriptor: String,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn new(type_descriptor: impl Into<String>) -> Self {
        Self {
            type_descriptor: type_descriptor.into(),
            elements: Vec::new(),
        }
    }

    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub(crate) fn write(&self, pool: &mut ConstantPool, out: &mut Vec<u8>) -> Result<(), ClassfileError> {
        out.extend_from_slice(&pool.utf8(&self.type_descriptor)?.to_be_bytes());
        out.extend_from_slice(&(self.elements.len() as u16).to_be_bytes());
        for (name, value) in &self.elements {
            out.extend_from_slice(&pool.utf8(name)?.to_be_bytes());
            value.write(pool, out)?;
        }
        Ok(())
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Self, DecodeError> {
        let type_descriptor = utf8(pool, reader.read_u16()?)?;
        let count = reader.read_u16()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = utf8(pool, reader.read_u16()?)?;
            elements.push((name, ElementValue::read(reader, pool)?));
        }
        Ok(Self {
            type_descriptor,
            elements,
        })
    }
}

impl ElementValue {
    pub(crate) fn write(&self, pool: &mut ConstantPool, out: &mut Vec<u8>) -> Result<(), ClassfileError> {
        match self {
            ElementValue::Const(c) => {
                out.push(c.tag());
                out.extend_from_slice(&c.intern(pool)?.to_be_bytes());
            }
            ElementValue::Enum {
                type_descriptor,
                const_name,
            } => {
                out.push(b'e');
                out.extend_from_slice(&pool.utf8(type_descriptor)?.to_be_bytes());
                out.extend_from_slice(&pool.utf8(const_name)?.to_be_bytes());
            }
            ElementValue::Class(descriptor) => {
                out.push(b'c');
                out.extend_from_slice(&pool.utf8(descriptor)?.to_be_bytes());
            }
            ElementValue::Annotation(annotation) => {
                out.push(b'@');
                annotation.write(pool, out)?;
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for value in values {
                    value.write(pool, out)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Self, DecodeError> {
        use crate::constants::Constant;
        let at = reader.position();
        let tag = reader.read_u8()?;
        let value = match tag {
            b'e' => ElementValue::Enum {
                type_descriptor: utf8(pool, reader.read_u16()?)?,
                const_name: utf8(pool, reader.read_u16()?)?,
            },
            b'c' => ElementValue::Class(utf8(pool, reader.read_u16()?)?),
            b'@' => ElementValue::Annotation(Annotation::read(reader, pool)?),
            b'[' => {
                let count = reader.read_u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(ElementValue::read(reader, pool)?);
                }
                ElementValue::Array(values)
            }
            b's' => ElementValue::Const(ConstElement::String(utf8(pool, reader.read_u16()?)?)),
            b'B' | b'C' | b'I' | b'S' | b'Z' | b'J' | b'F' | b'D' => {
                let index = reader.read_u16()?;
                let constant = pool.get(index).ok_or(DecodeError::BadConstantRef(index))?;
                let element = match (tag, constant) {
                    (b'B', Constant::Integer(v)) => ConstElement::Byte(*v as i8),
                    (b'C', Constant::Integer(v)) => ConstElement::Char(*v as u16),
                    (b'I', Constant::Integer(v)) => ConstElement::Int(*v),
                    (b'S', Constant::Integer(v)) => ConstElement::Short(*v as i16),
                    (b'Z', Constant::Integer(v)) => ConstElement::Boolean(*v != 0),
                    (b'J', Constant::Long(v)) => ConstElement::Long(*v),
                    (b'F', Constant::Float(bits)) => ConstElement::Float(f32::from_bits(*bits)),
                    (b'D', Constant::Double(bits)) => ConstElement::Double(f64::from_bits(*bits)),
                    _ => return Err(DecodeError::BadConstantRef(index)),
                };
                ElementValue::Const(element)
            }
            other => return Err(DecodeError::InvalidTag(other, at)),
        };
        Ok(value)
    }
}

fn utf8(pool: &ConstantPool, index: u16) -> Result<String, DecodeError> {
    pool.get_utf8(index)
        .map(str::to_string)
        .ok_or(DecodeError::BadConstantRef(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_annotation_encoding() {
        let mut inner = Annotation::new("Lp/Inner;");
        inner
            .elements
            .push(("value".into(), ElementValue::Const(ConstElement::Int(3))));
        let mut outer = Annotation::new("Lp/Outer;");
        outer.elements.push((
            "items".into(),
            ElementValue::Array(vec![
                ElementValue::Annotation(inner.clone()),
                ElementValue::Annotation(inner),
            ]),
        ));
        outer.elements.push((
            "level".into(),
            ElementValue::Enum {
                type_descriptor: "Lp/Level;".into(),
                const_name: "HIGH".into(),
            },
        ));

        let mut pool = ConstantPool::new();
        let mut bytes = Vec::new();
        outer.write(&mut pool, &mut bytes).unwrap();

        let mut reader = ByteReader::new(&bytes);
        let decoded = Annotation::read(&mut reader, &pool).unwrap();
        assert_eq!(decoded, outer);
    }
}
