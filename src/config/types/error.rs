//! Configuration error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Json(#[from] serde_json::Error),

    // Deliberately no #[from]: we want the aggregate to be the only
    // diagnostic surfaced, not a duplicated `source()` chain.
    #[error("{0}")]
    Invalid(ConfigDiagnostics),
}

/// A single configuration validation failure.
#[derive(Debug, Clone)]
pub struct ConfigDiagnostic {
    pub field: String,
    pub message: String,
}

/// An aggregate of every validation failure found in one config document, so
/// operators see every problem at once rather than one at a time.
#[derive(Debug, Default, Clone)]
pub struct ConfigDiagnostics {
    errors: Vec<ConfigDiagnostic>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigDiagnostic {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ConfigDiagnostic] {
        &self.errors
    }

    /// Convert into `Err(self)` if any errors were recorded, `Ok(())` otherwise.
    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(self))
        }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "config validation failed ({} error(s)):", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  [{}] {}", err.field, err.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_multiple_errors() {
        let mut diag = ConfigDiagnostics::new();
        diag.error("folders[0].path", "does not exist");
        diag.error("actions.default.endpoint", "not a valid URI");
        assert!(diag.has_errors());
        assert_eq!(diag.errors().len(), 2);
        let text = diag.to_string();
        assert!(text.contains("folders[0].path"));
        assert!(text.contains("actions.default.endpoint"));
    }

    #[test]
    fn empty_diagnostics_has_no_errors() {
        let diag = ConfigDiagnostics::new();
        assert!(!diag.has_errors());
        assert!(diag.into_result().is_ok());
    }
}
