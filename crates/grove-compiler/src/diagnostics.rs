//! Collected diagnostics
//!
//! Passes report recoverable problems here and keep going; the pipeline
//! checks the collector at every phase boundary.

use crate::error::{CompileError, CompileResult, Location};
use parking_lot::Mutex;
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// A single collected message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Location,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", self.location, label, self.message)
    }
}

/// Thread-safe sink for diagnostics
///
/// `tolerance` is the number of errors after which [`ErrorCollector::error`]
/// starts failing; 0 never fails early.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    entries: Mutex<Vec<Diagnostic>>,
    tolerance: usize,
}

impl ErrorCollector {
    pub fn new(tolerance: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            tolerance,
        }
    }

    /// Record an error; fails once the tolerance is exceeded
    pub fn error(&self, message: impl Into<String>, location: Location) -> CompileResult<()> {
        let message = message.into();
        tracing::debug!(%location, %message, "collected error");
        let count = {
            let mut entries = self.entries.lock();
            entries.push(Diagnostic {
                severity: Severity::Error,
                message,
                location,
            });
            entries
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .count()
        };
        if self.tolerance > 0 && count >= self.tolerance {
            return Err(self.failure());
        }
        Ok(())
    }

    pub fn warning(&self, message: impl Into<String>, location: Location) {
        let message = message.into();
        tracing::debug!(%location, %message, "collected warning");
        self.entries.lock().push(Diagnostic {
            severity: Severity::Warning,
            message,
            location,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Snapshot of everything collected so far
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .cloned()
            .collect()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .cloned()
            .collect()
    }

    /// `CompileError::Failed` summarizing every collected error
    pub fn failure(&self) -> CompileError {
        let errors = self.errors();
        let summary = errors
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        CompileError::Failed {
            count: errors.len(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_and_summarizes() {
        let collector = ErrorCollector::new(0);
        collector.warning("Unreachable statement found", Location::new(None, 2, 1));
        collector
            .error("first", Location::new(Some("A.groovy"), 1, 1))
            .unwrap();
        collector
            .error("second", Location::new(Some("A.groovy"), 5, 3))
            .unwrap();

        assert!(collector.has_errors());
        assert_eq!(collector.error_count(), 2);
        assert_eq!(collector.warnings().len(), 1);
        match collector.failure() {
            CompileError::Failed { count, summary } => {
                assert_eq!(count, 2);
                assert!(summary.contains("A.groovy:5:3: error: second"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tolerance_aborts() {
        let collector = ErrorCollector::new(2);
        assert!(collector.error("one", Location::default()).is_ok());
        assert!(collector.error("two", Location::default()).is_err());
    }
}
