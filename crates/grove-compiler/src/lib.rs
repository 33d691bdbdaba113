//! Grove compiler back end
//!
//! Takes a programmatically built [`CompileUnit`] through the back-end
//! pipeline and produces JVM class files:
//!
//! 1. scope resolution ([`scope`])
//! 2. class completion ([`complete`])
//! 3. annotation processing ([`annotations`])
//! 4. verification and initializer wiring ([`verifier`])
//! 5. class-file generation ([`codegen`])
//!
//! Collected errors are checked after resolution and again before codegen.

#![warn(rust_2018_idioms)]

pub mod annotations;
pub mod ast;
pub mod codegen;
pub mod complete;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod scope;
pub mod verifier;

pub use ast::{AstBuilder, ClassId, ClassKind, ClassNode, CompileUnit, MethodNode, Modifiers, TypeRef};
pub use codegen::{is_member_directly_accessible, GeneratedClass};
pub use config::{CompilerConfig, ConfigError, TargetBytecode, WarningLevel};
pub use context::CompilationContext;
pub use diagnostics::{Diagnostic, ErrorCollector, Severity};
pub use error::{CompileError, CompileResult, Location};

/// Main compiler entry point
#[derive(Debug, Default)]
pub struct Compiler {
    ctx: CompilationContext,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            ctx: CompilationContext::new(config),
        }
    }

    /// Context holding the configuration and collected diagnostics
    pub fn context(&self) -> &CompilationContext {
        &self.ctx
    }

    /// Run the whole pipeline over `unit`
    ///
    /// On success the classes are also stored in `unit.output`.
    #[tracing::instrument(skip_all)]
    pub fn compile(&self, unit: &mut CompileUnit) -> CompileResult<Vec<GeneratedClass>> {
        let ctx = &self.ctx;
        scope::resolve(ctx, unit)?;
        ctx.fail_if_errors()?;
        complete::run(ctx, unit)?;
        annotations::process(ctx, unit)?;
        verifier::verify(ctx, unit)?;
        ctx.fail_if_errors()?;
        let classes = codegen::generate(ctx, unit)?;
        tracing::debug!(classes = classes.len(), "compilation finished");
        unit.output = classes.clone();
        Ok(classes)
    }
}
