//! Compilation context
//!
//! Everything a pass needs besides the unit itself: configuration, the
//! diagnostics sink, and the unit-wide counters for synthesized names.

use crate::config::CompilerConfig;
use crate::diagnostics::ErrorCollector;
use crate::error::{CompileResult, Location};
use std::sync::atomic::{AtomicU32, Ordering};

/// Shared state threaded through every pass
#[derive(Debug)]
pub struct CompilationContext {
    pub config: CompilerConfig,
    errors: ErrorCollector,
    /// Next closure class index (`Outer$_run_closure1`, ...)
    closure_index: AtomicU32,
    /// Next anonymous inner class index (`Outer$1`, ...)
    inner_class_index: AtomicU32,
}

impl CompilationContext {
    pub fn new(config: CompilerConfig) -> Self {
        let errors = ErrorCollector::new(config.tolerance);
        Self {
            config,
            errors,
            closure_index: AtomicU32::new(1),
            inner_class_index: AtomicU32::new(1),
        }
    }

    pub fn errors(&self) -> &ErrorCollector {
        &self.errors
    }

    /// Record a recoverable error
    pub fn error(&self, message: impl Into<String>, location: Location) -> CompileResult<()> {
        self.errors.error(message, location)
    }

    /// Record a warning if the configured level allows it
    pub fn warning(&self, message: impl Into<String>, location: Location) {
        if self.config.warnings_enabled() {
            self.errors.warning(message, location);
        }
    }

    pub fn next_closure_index(&self) -> u32 {
        self.closure_index.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_inner_class_index(&self) -> u32 {
        self.inner_class_index.fetch_add(1, Ordering::Relaxed)
    }

    /// Phase boundary: turn collected errors into a failure
    pub fn fail_if_errors(&self) -> CompileResult<()> {
        if self.errors.has_errors() {
            Err(self.errors.failure())
        } else {
            Ok(())
        }
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarningLevel;

    #[test]
    fn test_counters_are_independent() {
        let ctx = CompilationContext::default();
        assert_eq!(ctx.next_closure_index(), 1);
        assert_eq!(ctx.next_closure_index(), 2);
        assert_eq!(ctx.next_inner_class_index(), 1);
    }

    #[test]
    fn test_fail_if_errors() {
        let ctx = CompilationContext::default();
        assert!(ctx.fail_if_errors().is_ok());
        ctx.error("bad", Location::default()).unwrap();
        assert!(ctx.fail_if_errors().is_err());
    }

    #[test]
    fn test_warnings_respect_level() {
        let config = CompilerConfig {
            warning_level: WarningLevel::None,
            ..CompilerConfig::default()
        };
        let ctx = CompilationContext::new(config);
        ctx.warning("ignored", Location::default());
        assert!(ctx.errors().warnings().is_empty());
    }
}
