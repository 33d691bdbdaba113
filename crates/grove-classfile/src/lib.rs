//! Grove class file model
//!
//! This crate provides the JVM instruction set, constant pool, attribute and
//! annotation structures, a class file encoder/decoder, and the stack-depth
//! verifier the compiler uses to size operand stacks.

#![warn(rust_2018_idioms)]

pub mod access;
pub mod annotation;
pub mod attribute;
pub mod classfile;
pub mod constants;
pub mod descriptor;
pub mod encoder;
pub mod opcode;
pub mod verify;

pub use annotation::{Annotation, ConstElement, ElementValue};
pub use attribute::{Attribute, CodeAttribute, ExceptionTableEntry, InnerClassEntry, LineNumber};
pub use classfile::{ClassFile, ClassfileError, MemberInfo};
pub use constants::{Constant, ConstantPool};
pub use descriptor::{FieldType, MethodDescriptor};
pub use encoder::{ByteReader, CodeWriter, DecodeError, EncodeError, Label};
pub use opcode::Opcode;
pub use verify::{compute_max_stack, VerifyError};
