//! Dynamic dispatch plumbing
//!
//! Everything the compiler cannot bind statically is routed through static
//! helpers of the Groovy runtime. This module names those entry points and
//! decides when a member may be accessed with a direct instruction instead.

use crate::ast::{BinaryOp, ClassId, CompileUnit, Modifiers};

const ADAPTER: &str = "org/codehaus/groovy/runtime/ScriptBytecodeAdapter";
const TRANSFORM: &str = "org/codehaus/groovy/runtime/typehandling/DefaultTypeTransformation";
const INVOKER: &str = "org/codehaus/groovy/runtime/InvokerHelper";

/// A static runtime helper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCall {
    /// Internal name of the declaring class
    pub owner: &'static str,
    pub name: &'static str,
    pub descriptor: &'static str,
}

const fn adapter(name: &'static str, descriptor: &'static str) -> RuntimeCall {
    RuntimeCall {
        owner: ADAPTER,
        name,
        descriptor,
    }
}

const fn transform(name: &'static str, descriptor: &'static str) -> RuntimeCall {
    RuntimeCall {
        owner: TRANSFORM,
        name,
        descriptor,
    }
}

// ===== Calls =====

pub const INVOKE_METHOD: RuntimeCall = adapter(
    "invokeMethodN",
    "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;",
);
pub const INVOKE_METHOD_SAFE: RuntimeCall = adapter(
    "invokeMethodNSafe",
    "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;",
);
pub const INVOKE_ON_SUPER: RuntimeCall = adapter(
    "invokeMethodOnSuperN",
    "(Ljava/lang/Class;Lgroovy/lang/GroovyObject;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;",
);
pub const INVOKE_STATIC: RuntimeCall = adapter(
    "invokeStaticMethodN",
    "(Ljava/lang/Class;Ljava/lang/Class;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;",
);
pub const INVOKE_NEW: RuntimeCall = adapter(
    "invokeNewN",
    "(Ljava/lang/Class;Ljava/lang/Class;Ljava/lang/Object;)Ljava/lang/Object;",
);
pub const DESPREAD_LIST: RuntimeCall = adapter(
    "despreadList",
    "([Ljava/lang/Object;[Ljava/lang/Object;[I)[Ljava/lang/Object;",
);

// ===== Properties and fields =====

pub const GET_PROPERTY: RuntimeCall = adapter(
    "getProperty",
    "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;",
);
pub const GET_PROPERTY_SAFE: RuntimeCall = adapter(
    "getPropertySafe",
    "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;",
);
pub const SET_PROPERTY: RuntimeCall = adapter(
    "setProperty",
    "(Ljava/lang/Object;Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)V",
);
pub const SET_PROPERTY_SAFE: RuntimeCall = adapter(
    "setPropertySafe",
    "(Ljava/lang/Object;Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)V",
);
pub const GET_FIELD: RuntimeCall = adapter(
    "getField",
    "(Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;",
);
pub const SET_FIELD: RuntimeCall = adapter(
    "setField",
    "(Ljava/lang/Object;Ljava/lang/Class;Ljava/lang/Object;Ljava/lang/String;)V",
);

// ===== Literals and coercion =====

pub const CREATE_LIST: RuntimeCall = adapter("createList", "([Ljava/lang/Object;)Ljava/util/List;");
pub const CREATE_MAP: RuntimeCall = adapter("createMap", "([Ljava/lang/Object;)Ljava/util/Map;");
pub const CAST_TO_TYPE: RuntimeCall = adapter(
    "castToType",
    "(Ljava/lang/Object;Ljava/lang/Class;)Ljava/lang/Object;",
);
pub const UNARY_MINUS: RuntimeCall = adapter("unaryMinus", "(Ljava/lang/Object;)Ljava/lang/Object;");
pub const IS_CASE: RuntimeCall = adapter("isCase", "(Ljava/lang/Object;Ljava/lang/Object;)Z");
pub const BOOLEAN_UNBOX: RuntimeCall = transform("booleanUnbox", "(Ljava/lang/Object;)Z");
pub const AS_ITERATOR: RuntimeCall = RuntimeCall {
    owner: INVOKER,
    name: "asIterator",
    descriptor: "(Ljava/lang/Object;)Ljava/util/Iterator;",
};

/// `DefaultTypeTransformation.<type>Unbox(Object)` for a primitive
pub fn unbox(descriptor: char) -> Option<RuntimeCall> {
    Some(match descriptor {
        'Z' => BOOLEAN_UNBOX,
        'B' => transform("byteUnbox", "(Ljava/lang/Object;)B"),
        'C' => transform("charUnbox", "(Ljava/lang/Object;)C"),
        'S' => transform("shortUnbox", "(Ljava/lang/Object;)S"),
        'I' => transform("intUnbox", "(Ljava/lang/Object;)I"),
        'J' => transform("longUnbox", "(Ljava/lang/Object;)J"),
        'F' => transform("floatUnbox", "(Ljava/lang/Object;)F"),
        'D' => transform("doubleUnbox", "(Ljava/lang/Object;)D"),
        _ => return None,
    })
}

/// Boolean-valued comparison helper for a comparison operator
pub fn comparison(op: BinaryOp) -> Option<RuntimeCall> {
    let name = match op {
        BinaryOp::Eq => "compareEqual",
        BinaryOp::Ne => "compareNotEqual",
        BinaryOp::Lt => "compareLessThan",
        BinaryOp::Le => "compareLessThanEqual",
        BinaryOp::Gt => "compareGreaterThan",
        BinaryOp::Ge => "compareGreaterThanEqual",
        _ => return None,
    };
    Some(adapter(name, "(Ljava/lang/Object;Ljava/lang/Object;)Z"))
}

// ============================================================================
// Visibility
// ============================================================================

/// Where code touching a member lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSite {
    /// A method of the class
    Class(ClassId),
    /// A generated class (closure body) in the package of the class; it
    /// is neither the class itself nor one of its subclasses
    Generated(ClassId),
}

/// Whether code in `accessor` may touch a member of `declaring` with a
/// direct field or method instruction
///
/// Public members always qualify, members of the accessing class itself
/// always qualify, private members of other classes never do. Protected
/// members need a subclass or the same package, package-private ones the
/// same package.
pub fn is_member_directly_accessible(
    unit: &CompileUnit,
    modifiers: Modifiers,
    declaring: ClassId,
    accessor: ClassId,
) -> bool {
    is_accessible_from(unit, modifiers, declaring, AccessSite::Class(accessor))
}

/// [`is_member_directly_accessible`] for code at `site`
pub fn is_accessible_from(unit: &CompileUnit, modifiers: Modifiers, declaring: ClassId, site: AccessSite) -> bool {
    let (lexical, generated) = match site {
        AccessSite::Class(id) => (id, false),
        AccessSite::Generated(id) => (id, true),
    };
    if modifiers.is_public() {
        return true;
    }
    if !generated && declaring == lexical {
        return true;
    }
    if modifiers.is_private() {
        return false;
    }
    let same_package = unit.class(declaring).package() == unit.class(lexical).package();
    if modifiers.is_protected() && !generated {
        return same_package || unit.is_subclass_of(lexical, declaring);
    }
    same_package
}
