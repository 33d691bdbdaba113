//! Compiler configuration (grove.toml `[compiler]` table)

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Class file format version to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetBytecode {
    #[serde(rename = "1.5")]
    Java5,
    #[serde(rename = "1.6")]
    Java6,
}

impl TargetBytecode {
    /// Class file major version
    pub fn major_version(self) -> u16 {
        match self {
            TargetBytecode::Java5 => grove_classfile::access::JAVA_1_5,
            TargetBytecode::Java6 => grove_classfile::access::JAVA_1_6,
        }
    }
}

/// Which warnings are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningLevel {
    None,
    LikelyErrors,
    PossibleErrors,
    Paranoia,
}

/// Compiler settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompilerConfig {
    /// Bytecode target ("1.5" or "1.6")
    pub target_bytecode: TargetBytecode,

    /// Constant list literals longer than this are split into helper methods
    pub list_split_threshold: usize,

    /// Emit `LineNumberTable` attributes
    pub debug_line_numbers: bool,

    /// Encoding of the source files, recorded for diagnostics only
    pub source_encoding: String,

    pub warning_level: WarningLevel,

    /// Abort after this many collected errors (0 = never abort early)
    pub tolerance: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            target_bytecode: TargetBytecode::Java5,
            list_split_threshold: 1000,
            debug_line_numbers: true,
            source_encoding: "UTF-8".to_string(),
            warning_level: WarningLevel::LikelyErrors,
            tolerance: 10,
        }
    }
}

/// File layout: settings live under a `[compiler]` table
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    compiler: CompilerConfig,
}

impl CompilerConfig {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.compiler.validate()?;
        Ok(file.compiler)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list_split_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "list-split-threshold must be at least 1".to_string(),
            ));
        }
        // Array sizes and helper indices are emitted as int constants
        if self.list_split_threshold > i32::MAX as usize {
            return Err(ConfigError::ValidationError(format!(
                "list-split-threshold {} is too large",
                self.list_split_threshold
            )));
        }
        if self.source_encoding.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "source-encoding cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn warnings_enabled(&self) -> bool {
        self.warning_level > WarningLevel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.list_split_threshold, 1000);
        assert_eq!(config.target_bytecode.major_version(), 49);
        assert!(config.debug_line_numbers);
    }

    #[test]
    fn test_parse_partial_table() {
        let config = CompilerConfig::from_str(
            r#"
            [compiler]
            target-bytecode = "1.6"
            tolerance = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.target_bytecode, TargetBytecode::Java6);
        assert_eq!(config.tolerance, 0);
        assert_eq!(config.list_split_threshold, 1000);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(CompilerConfig::from_str("").unwrap(), CompilerConfig::default());
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let err = CompilerConfig::from_str("[compiler]\nlist-split-threshold = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_unknown_target_is_parse_error() {
        let err = CompilerConfig::from_str("[compiler]\ntarget-bytecode = \"1.4\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.toml");
        std::fs::write(&path, "[compiler]\nwarning-level = \"none\"\n").unwrap();
        let config = CompilerConfig::from_file(&path).unwrap();
        assert!(!config.warnings_enabled());
    }
}
