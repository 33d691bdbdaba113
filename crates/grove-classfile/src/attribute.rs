//! Class, field, method and code attributes

use crate::annotation::{Annotation, ElementValue};
use crate::constants::ConstantPool;
use crate::encoder::{ByteReader, DecodeError};
use crate::ClassfileError;

/// One row of a method's exception table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Internal name of the caught class; `None` catches everything
    pub catch_type: Option<String>,
}

/// The `Code` attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<Attribute>,
}

/// One `InnerClasses` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner_class: String,
    /// `None` for anonymous and local classes
    pub outer_class: Option<String>,
    /// `None` for anonymous classes
    pub inner_name: Option<String>,
    pub access_flags: u16,
}

/// A `(start_pc, line_number)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line: u16,
}

/// Attributes emitted or understood by this crate
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Code(CodeAttribute),
    /// Pool index of the constant
    ConstantValue(u16),
    Exceptions(Vec<String>),
    SourceFile(String),
    InnerClasses(Vec<InnerClassEntry>),
    EnclosingMethod {
        class: String,
        method: Option<(String, String)>,
    },
    LineNumberTable(Vec<LineNumber>),
    Signature(String),
    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    RuntimeVisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeInvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    AnnotationDefault(ElementValue),
    /// Anything else, kept verbatim
    Unknown { name: String, data: Vec<u8> },
}

impl Attribute {
    /// Attribute name as stored in the pool
    pub fn name(&self) -> &str {
        match self {
            Attribute::Code(_) => "Code",
            Attribute::ConstantValue(_) => "ConstantValue",
            Attribute::Exceptions(_) => "Exceptions",
            Attribute::SourceFile(_) => "SourceFile",
            Attribute::InnerClasses(_) => "InnerClasses",
            Attribute::EnclosingMethod { .. } => "EnclosingMethod",
            Attribute::LineNumberTable(_) => "LineNumberTable",
            Attribute::Signature(_) => "Signature",
            Attribute::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            Attribute::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            Attribute::RuntimeVisibleParameterAnnotations(_) => {
                "RuntimeVisibleParameterAnnotations"
            }
            Attribute::RuntimeInvisibleParameterAnnotations(_) => {
                "RuntimeInvisibleParameterAnnotations"
            }
            Attribute::AnnotationDefault(_) => "AnnotationDefault",
            Attribute::Unknown { name, .. } => name,
        }
    }

    /// Write `attribute_name_index`, `attribute_length` and the body
    pub(crate) fn write(&self, pool: &mut ConstantPool, out: &mut Vec<u8>) -> Result<(), ClassfileError> {
        let name_index = pool.utf8(self.name())?;
        let mut body = Vec::new();
        match self {
            Attribute::Code(code) => {
                body.extend_from_slice(&code.max_stack.to_be_bytes());
                body.extend_from_slice(&code.max_locals.to_be_bytes());
                if code.code.len() > u16::MAX as usize {
                    return Err(ClassfileError::CodeTooLarge(code.code.len()));
                }
                body.extend_from_slice(&(code.code.len() as u32).to_be_bytes());
                body.extend_from_slice(&code.code);
                body.extend_from_slice(&(code.exception_table.len() as u16).to_be_bytes());
                for entry in &code.exception_table {
                    body.extend_from_slice(&entry.start_pc.to_be_bytes());
                    body.extend_from_slice(&entry.end_pc.to_be_bytes());
                    body.extend_from_slice(&entry.handler_pc.to_be_bytes());
                    let catch = match &entry.catch_type {
                        Some(name) => pool.class(name)?,
                        None => 0,
                    };
                    body.extend_from_slice(&catch.to_be_bytes());
                }
                write_attributes(&code.attributes, pool, &mut body)?;
            }
            Attribute::ConstantValue(index) => body.extend_from_slice(&index.to_be_bytes()),
            Attribute::Exceptions(names) => {
                body.extend_from_slice(&(names.len() as u16).to_be_bytes());
                for name in names {
                    body.extend_from_slice(&pool.class(name)?.to_be_bytes());
                }
            }
            Attribute::SourceFile(file) => body.extend_from_slice(&pool.utf8(file)?.to_be_bytes()),
            Attribute::InnerClasses(entries) => {
                body.extend_from_slice(&(entries.len() as u16).to_be_bytes());
                for entry in entries {
                    body.extend_from_slice(&pool.class(&entry.inner_class)?.to_be_bytes());
                    let outer = match &entry.outer_class {
                        Some(name) => pool.class(name)?,
                        None => 0,
                    };
                    body.extend_from_slice(&outer.to_be_bytes());
                    let simple = match &entry.inner_name {
                        Some(name) => pool.utf8(name)?,
                        None => 0,
                    };
                    body.extend_from_slice(&simple.to_be_bytes());
                    body.extend_from_slice(&entry.access_flags.to_be_bytes());
                }
            }
            Attribute::EnclosingMethod { class, method } => {
                body.extend_from_slice(&pool.class(class)?.to_be_bytes());
                let nat = match method {
                    Some((name, descriptor)) => pool.name_and_type(name, descriptor)?,
                    None => 0,
                };
                body.extend_from_slice(&nat.to_be_bytes());
            }
            Attribute::LineNumberTable(lines) => {
                body.extend_from_slice(&(lines.len() as u16).to_be_bytes());
                for line in lines {
                    body.extend_from_slice(&line.start_pc.to_be_bytes());
                    body.extend_from_slice(&line.line.to_be_bytes());
                }
            }
            Attribute::Signature(signature) => {
                body.extend_from_slice(&pool.utf8(signature)?.to_be_bytes())
            }
            Attribute::RuntimeVisibleAnnotations(annotations)
            | Attribute::RuntimeInvisibleAnnotations(annotations) => {
                write_annotations(annotations, pool, &mut body)?;
            }
            Attribute::RuntimeVisibleParameterAnnotations(params)
            | Attribute::RuntimeInvisibleParameterAnnotations(params) => {
                body.push(params.len() as u8);
                for annotations in params {
                    write_annotations(annotations, pool, &mut body)?;
                }
            }
            Attribute::AnnotationDefault(value) => value.write(pool, &mut body)?,
            Attribute::Unknown { data, .. } => body.extend_from_slice(data),
        }
        out.extend_from_slice(&name_index.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        Ok(())
    }

    /// Decode one attribute from a reader positioned at its name index
    pub(crate) fn read(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Self, DecodeError> {
        let name_index = reader.read_u16()?;
        let name = pool
            .get_utf8(name_index)
            .ok_or(DecodeError::BadConstantRef(name_index))?
            .to_string();
        let length = reader.read_u32()? as usize;
        let data = reader.read_bytes(length)?;
        let mut r = ByteReader::new(data);
        let class_name = |index: u16| -> Result<String, DecodeError> {
            pool.get_class_name(index)
                .map(str::to_string)
                .ok_or(DecodeError::BadConstantRef(index))
        };
        let utf8 = |index: u16| -> Result<String, DecodeError> {
            pool.get_utf8(index)
                .map(str::to_string)
                .ok_or(DecodeError::BadConstantRef(index))
        };
        let attribute = match name.as_str() {
            "Code" => {
                let max_stack = r.read_u16()?;
                let max_locals = r.read_u16()?;
                let code_length = r.read_u32()? as usize;
                let code = r.read_bytes(code_length)?.to_vec();
                let table_length = r.read_u16()?;
                let mut exception_table = Vec::with_capacity(table_length as usize);
                for _ in 0..table_length {
                    let start_pc = r.read_u16()?;
                    let end_pc = r.read_u16()?;
                    let handler_pc = r.read_u16()?;
                    let catch_index = r.read_u16()?;
                    let catch_type = if catch_index == 0 {
                        None
                    } else {
                        Some(class_name(catch_index)?)
                    };
                    exception_table.push(ExceptionTableEntry {
                        start_pc,
                        end_pc,
                        handler_pc,
                        catch_type,
                    });
                }
                let attributes = read_attributes(&mut r, pool)?;
                Attribute::Code(CodeAttribute {
                    max_stack,
                    max_locals,
                    code,
                    exception_table,
                    attributes,
                })
            }
            "ConstantValue" => Attribute::ConstantValue(r.read_u16()?),
            "Exceptions" => {
                let count = r.read_u16()?;
                let mut names = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    names.push(class_name(r.read_u16()?)?);
                }
                Attribute::Exceptions(names)
            }
            "SourceFile" => Attribute::SourceFile(utf8(r.read_u16()?)?),
            "InnerClasses" => {
                let count = r.read_u16()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let inner_class = class_name(r.read_u16()?)?;
                    let outer = r.read_u16()?;
                    let simple = r.read_u16()?;
                    let access_flags = r.read_u16()?;
                    entries.push(InnerClassEntry {
                        inner_class,
                        outer_class: if outer == 0 { None } else { Some(class_name(outer)?) },
                        inner_name: if simple == 0 { None } else { Some(utf8(simple)?) },
                        access_flags,
                    });
                }
                Attribute::InnerClasses(entries)
            }
            "LineNumberTable" => {
                let count = r.read_u16()?;
                let mut lines = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    lines.push(LineNumber {
                        start_pc: r.read_u16()?,
                        line: r.read_u16()?,
                    });
                }
                Attribute::LineNumberTable(lines)
            }
            "Signature" => Attribute::Signature(utf8(r.read_u16()?)?),
            "RuntimeVisibleAnnotations" => {
                Attribute::RuntimeVisibleAnnotations(read_annotations(&mut r, pool)?)
            }
            "RuntimeInvisibleAnnotations" => {
                Attribute::RuntimeInvisibleAnnotations(read_annotations(&mut r, pool)?)
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let count = r.read_u8()?;
                let mut params = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    params.push(read_annotations(&mut r, pool)?);
                }
                if name == "RuntimeVisibleParameterAnnotations" {
                    Attribute::RuntimeVisibleParameterAnnotations(params)
                } else {
                    Attribute::RuntimeInvisibleParameterAnnotations(params)
                }
            }
            "AnnotationDefault" => Attribute::AnnotationDefault(ElementValue::read(&mut r, pool)?),
            _ => Attribute::Unknown {
                name: name.clone(),
                data: data.to_vec(),
            },
        };
        Ok(attribute)
    }
}

pub(crate) fn write_attributes(
    attributes: &[Attribute],
    pool: &mut ConstantPool,
    out: &mut Vec<u8>,
) -> Result<(), ClassfileError> {
    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for attribute in attributes {
        attribute.write(pool, out)?;
    }
    Ok(())
}

pub(crate) fn read_attributes(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, DecodeError> {
    let count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attributes.push(Attribute::read(reader, pool)?);
    }
    Ok(attributes)
}

fn write_annotations(
    annotations: &[Annotation],
    pool: &mut ConstantPool,
    out: &mut Vec<u8>,
) -> Result<(), ClassfileError> {
    out.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
    for annotation in annotations {
        annotation.write(pool, out)?;
    }
    Ok(())
}

fn read_annotations(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Vec<Annotation>, DecodeError> {
    let count = reader.read_u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(Annotation::read(reader, pool)?);
    }
    Ok(annotations)
}
