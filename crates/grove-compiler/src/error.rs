//! Compilation errors
//!
//! Two channels exist: recoverable problems are collected as
//! [`Diagnostic`](crate::diagnostics::Diagnostic)s and compilation continues,
//! while the variants of [`CompileError`] abort the current phase.

use std::fmt;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Source position of the node an error is reported against
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    /// Source file name, when the class carries one
    pub source: Option<String>,
    /// 1-based line, 0 when unknown
    pub line: u32,
    /// 1-based column, 0 when unknown
    pub column: u32,
}

impl Location {
    pub fn new(source: Option<&str>, line: u32, column: u32) -> Self {
        Self {
            source: source.map(str::to_string),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source.as_deref().unwrap_or("<unknown>");
        if self.line == 0 {
            write!(f, "{}", source)
        } else {
            write!(f, "{}:{}:{}", source, self.line, self.column)
        }
    }
}

/// Where the code generator was when an internal error occurred
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalContext {
    /// Dotted name of the class being generated
    pub class: String,
    /// Method name (`<init>` / `<clinit>` for initializers)
    pub method: String,
    /// JVM method descriptor
    pub descriptor: String,
    pub source: Option<String>,
    pub line: u32,
}

impl fmt::Display for InternalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "class {}, method {}{}, {}:{}",
            self.class,
            self.method,
            self.descriptor,
            self.source.as_deref().unwrap_or("<unknown>"),
            self.line
        )
    }
}

/// Fatal compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// A final variable or parameter written twice
    #[error("{location}: The {kind} [{name}] is declared final but is reassigned")]
    FinalReassigned {
        kind: &'static str,
        name: String,
        location: Location,
    },

    #[error("{location}: Cannot override final method {method} in {owner}")]
    OverrideFinal {
        method: String,
        owner: String,
        location: Location,
    },

    #[error("{location}: Cannot override method {method} in {owner} with disparate static modifier")]
    StaticMismatch {
        method: String,
        owner: String,
        location: Location,
    },

    #[error("{location}: The return type of {method} in {class} is incompatible with {expected} in {owner}")]
    IncompatibleReturnType {
        method: String,
        class: String,
        expected: String,
        owner: String,
        location: Location,
    },

    /// Covariant override that changes the primitive-ness of the return type
    #[error("{location}: Cannot override method {method} in {owner} with {reason}")]
    PrimitiveReturnMismatch {
        method: String,
        owner: String,
        reason: &'static str,
        location: Location,
    },

    #[error("{location}: The method {method} duplicates another method of the same signature")]
    DuplicateSignature { method: String, location: Location },

    #[error("{location}: The method with default parameters \"{method}\" defines a method \"{generated}\" that is already defined.")]
    DefaultParameterCollision {
        method: String,
        generated: String,
        location: Location,
    },

    #[error("{location}: Circular reference discovered in {annotation}")]
    CircularAnnotation {
        annotation: String,
        location: Location,
    },

    #[error("{location}: Duplicate interfaces in implements list: [{interfaces}]")]
    DuplicateInterface {
        interfaces: String,
        location: Location,
    },

    /// Any other structural error that makes further processing meaningless
    #[error("{location}: {message}")]
    Semantic { message: String, location: Location },

    /// A compiler bug; never user-facing in a correct compiler
    #[error("Internal compiler error: {message} ({context})")]
    Internal {
        message: String,
        context: Box<InternalContext>,
    },

    #[error("Class file error: {0}")]
    Classfile(#[from] grove_classfile::ClassfileError),

    #[error("Failed to write class file: {0}")]
    Io(#[from] std::io::Error),

    /// Collected errors reached a phase boundary
    #[error("Compilation failed with {count} error(s):\n{summary}")]
    Failed { count: usize, summary: String },
}

impl CompileError {
    pub fn semantic(message: impl Into<String>, location: Location) -> Self {
        CompileError::Semantic {
            message: message.into(),
            location,
        }
    }

    pub fn internal(message: impl Into<String>, context: InternalContext) -> Self {
        CompileError::Internal {
            message: message.into(),
            context: Box::new(context),
        }
    }

    /// Source location of the offending node, when there is one
    pub fn location(&self) -> Option<&Location> {
        match self {
            CompileError::FinalReassigned { location, .. }
            | CompileError::OverrideFinal { location, .. }
            | CompileError::StaticMismatch { location, .. }
            | CompileError::IncompatibleReturnType { location, .. }
            | CompileError::PrimitiveReturnMismatch { location, .. }
            | CompileError::DuplicateSignature { location, .. }
            | CompileError::DefaultParameterCollision { location, .. }
            | CompileError::CircularAnnotation { location, .. }
            | CompileError::DuplicateInterface { location, .. }
            | CompileError::Semantic { location, .. } => Some(location),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(Location::new(Some("A.groovy"), 3, 7).to_string(), "A.groovy:3:7");
        assert_eq!(Location::new(None, 0, 0).to_string(), "<unknown>");
    }

    #[test]
    fn test_final_reassigned_message() {
        let err = CompileError::FinalReassigned {
            kind: "variable",
            name: "x".into(),
            location: Location::new(Some("A.groovy"), 4, 9),
        };
        assert_eq!(
            err.to_string(),
            "A.groovy:4:9: The variable [x] is declared final but is reassigned"
        );
        assert_eq!(err.location().map(|l| l.line), Some(4));
    }

    #[test]
    fn test_internal_context_in_message() {
        let err = CompileError::internal(
            "operand stack underflow",
            InternalContext {
                class: "p.A".into(),
                method: "run".into(),
                descriptor: "()V".into(),
                source: Some("A.groovy".into()),
                line: 12,
            },
        );
        assert!(err.is_internal());
        let text = err.to_string();
        assert!(text.contains("class p.A, method run()V, A.groovy:12"));
    }
}
