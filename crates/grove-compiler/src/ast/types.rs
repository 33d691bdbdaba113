//! Type references
//!
//! Types are referenced by dotted class name; resolution to a [`ClassNode`]
//! goes through the compile unit when a pass needs hierarchy information.
//!
//! [`ClassNode`]: super::ClassNode

use std::fmt;

/// Well-known class names
pub mod names {
    pub const OBJECT: &str = "java.lang.Object";
    pub const STRING: &str = "java.lang.String";
    pub const CLASS: &str = "java.lang.Class";
    pub const ENUM: &str = "java.lang.Enum";
    pub const THROWABLE: &str = "java.lang.Throwable";
    pub const CLONEABLE: &str = "java.lang.Cloneable";
    pub const RETENTION: &str = "java.lang.annotation.Retention";
    pub const RETENTION_POLICY: &str = "java.lang.annotation.RetentionPolicy";
    pub const ANNOTATION: &str = "java.lang.annotation.Annotation";
    pub const LIST: &str = "java.util.List";
    pub const MAP: &str = "java.util.Map";
    pub const ITERATOR: &str = "java.util.Iterator";
    pub const GROOVY_OBJECT: &str = "groovy.lang.GroovyObject";
    pub const GROOVY_OBJECT_SUPPORT: &str = "groovy.lang.GroovyObjectSupport";
    pub const META_CLASS: &str = "groovy.lang.MetaClass";
    pub const CLOSURE: &str = "groovy.lang.Closure";
    pub const REFERENCE: &str = "groovy.lang.Reference";
    pub const GSTRING: &str = "groovy.lang.GString";
    pub const CLASS_INFO: &str = "org.codehaus.groovy.reflection.ClassInfo";
}

/// Primitive types, including `void`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    pub fn descriptor(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
            Primitive::Void => 'V',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Void => "void",
        }
    }

    /// Dotted name of the wrapper class
    pub fn wrapper(self) -> &'static str {
        match self {
            Primitive::Boolean => "java.lang.Boolean",
            Primitive::Byte => "java.lang.Byte",
            Primitive::Char => "java.lang.Character",
            Primitive::Short => "java.lang.Short",
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
            Primitive::Void => "java.lang.Void",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => Primitive::Boolean,
            "byte" => Primitive::Byte,
            "char" => Primitive::Char,
            "short" => Primitive::Short,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "void" => Primitive::Void,
            _ => return None,
        })
    }

    /// Local variable / operand stack slots
    pub fn slots(self) -> u16 {
        match self {
            Primitive::Long | Primitive::Double => 2,
            Primitive::Void => 0,
            _ => 1,
        }
    }

    /// Types computed with `int` instructions on the JVM
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            Primitive::Boolean | Primitive::Byte | Primitive::Char | Primitive::Short | Primitive::Int
        )
    }
}

/// A reference to a type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(Primitive),
    /// Class or interface with optional generic arguments
    Class { name: String, generics: Vec<TypeRef> },
    Array(Box<TypeRef>),
    /// Generic placeholder such as `T`, erased to its bound
    Placeholder { name: String, bound: Box<TypeRef> },
}

impl TypeRef {
    pub fn class(name: impl Into<String>) -> Self {
        TypeRef::Class {
            name: name.into(),
            generics: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, generics: Vec<TypeRef>) -> Self {
        TypeRef::Class {
            name: name.into(),
            generics,
        }
    }

    pub fn array(component: TypeRef) -> Self {
        TypeRef::Array(Box::new(component))
    }

    pub fn placeholder(name: impl Into<String>, bound: TypeRef) -> Self {
        TypeRef::Placeholder {
            name: name.into(),
            bound: Box::new(bound),
        }
    }

    pub fn object() -> Self {
        Self::class(names::OBJECT)
    }

    pub fn string() -> Self {
        Self::class(names::STRING)
    }

    pub fn void() -> Self {
        TypeRef::Primitive(Primitive::Void)
    }

    pub fn int() -> Self {
        TypeRef::Primitive(Primitive::Int)
    }

    pub fn long() -> Self {
        TypeRef::Primitive(Primitive::Long)
    }

    pub fn double() -> Self {
        TypeRef::Primitive(Primitive::Double)
    }

    pub fn boolean() -> Self {
        TypeRef::Primitive(Primitive::Boolean)
    }

    /// Parse a source-level name: `int`, `java.lang.String`, `int[][]`
    pub fn parse(name: &str) -> Self {
        if let Some(component) = name.strip_suffix("[]") {
            return Self::array(Self::parse(component));
        }
        match Primitive::from_name(name) {
            Some(p) => TypeRef::Primitive(p),
            None => Self::class(name),
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            TypeRef::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// Primitive, `void` included
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Primitive(Primitive::Void))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, TypeRef::Primitive(Primitive::Boolean))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.erasure(), TypeRef::Array(_))
    }

    /// Reference type (anything that is not primitive)
    pub fn is_reference(&self) -> bool {
        !self.is_primitive()
    }

    pub fn is_object(&self) -> bool {
        self.class_name() == Some(names::OBJECT) && !self.is_array()
    }

    /// Dotted class name after erasure; `None` for primitives and arrays
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeRef::Class { name, .. } => Some(name),
            TypeRef::Placeholder { bound, .. } => bound.class_name(),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Array(component) => Some(component),
            _ => None,
        }
    }

    /// Drop generic arguments and replace placeholders by their bounds
    pub fn erasure(&self) -> TypeRef {
        match self {
            TypeRef::Primitive(p) => TypeRef::Primitive(*p),
            TypeRef::Class { name, .. } => TypeRef::class(name.clone()),
            TypeRef::Array(component) => TypeRef::array(component.erasure()),
            TypeRef::Placeholder { bound, .. } => bound.erasure(),
        }
    }

    /// JVM field descriptor
    pub fn descriptor(&self) -> String {
        match self {
            TypeRef::Primitive(p) => p.descriptor().to_string(),
            TypeRef::Class { name, .. } => format!("L{};", internal_name(name)),
            TypeRef::Array(component) => format!("[{}", component.descriptor()),
            TypeRef::Placeholder { bound, .. } => bound.descriptor(),
        }
    }

    /// Operand of `new`/`checkcast`/`anewarray`: internal name for
    /// classes, descriptor for arrays
    pub fn internal_name(&self) -> String {
        match self.erasure() {
            TypeRef::Class { name, .. } => internal_name(&name),
            other => other.descriptor(),
        }
    }

    pub fn slots(&self) -> u16 {
        match self {
            TypeRef::Primitive(p) => p.slots(),
            _ => 1,
        }
    }

    /// Wrapper type for primitives, the type itself otherwise
    pub fn boxed(&self) -> TypeRef {
        match self {
            TypeRef::Primitive(p) => TypeRef::class(p.wrapper()),
            other => other.clone(),
        }
    }

    /// Primitive type for wrapper classes
    pub fn unboxed(&self) -> Option<Primitive> {
        let name = self.class_name()?;
        [
            Primitive::Boolean,
            Primitive::Byte,
            Primitive::Char,
            Primitive::Short,
            Primitive::Int,
            Primitive::Long,
            Primitive::Float,
            Primitive::Double,
        ]
        .into_iter()
        .find(|p| p.wrapper() == name)
    }

    /// Source-level name: `int`, `java.lang.String`, `java.lang.String[]`
    pub fn display_name(&self) -> String {
        match self {
            TypeRef::Primitive(p) => p.name().to_string(),
            TypeRef::Class { name, .. } => name.clone(),
            TypeRef::Array(component) => format!("{}[]", component.display_name()),
            TypeRef::Placeholder { bound, .. } => bound.display_name(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// `java.lang.String` → `java/lang/String`
pub fn internal_name(dotted: &str) -> String {
    dotted.replace('.', "/")
}

/// Package part of a dotted class name (empty for the default package)
pub fn package_of(dotted: &str) -> &str {
    match dotted.rfind('.') {
        Some(i) => &dotted[..i],
        None => "",
    }
}

/// Name after the last `.` and `$`
pub fn simple_name(dotted: &str) -> &str {
    let tail = dotted.rsplit('.').next().unwrap_or(dotted);
    tail.rsplit('$').next().unwrap_or(tail)
}

/// JVM method descriptor
pub fn method_descriptor<'a>(params: impl IntoIterator<Item = &'a TypeRef>, ret: &TypeRef) -> String {
    let mut desc = String::from("(");
    for param in params {
        desc.push_str(&param.descriptor());
    }
    desc.push(')');
    desc.push_str(&ret.descriptor());
    desc
}
