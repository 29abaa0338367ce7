//! Structured diagnostics for recoverable failures.
//!
//! Every diagnostic is logged through `tracing` when it is recorded and kept
//! in a [`Diagnostics`] collection so it can be persisted next to the
//! artifacts it concerns.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::NusysError;

/// Severity attached to a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational note.
    Info,
    /// Recoverable problem; the affected unit was skipped or degraded.
    Warning,
    /// The affected unit failed; unrelated units continued.
    Error,
}

/// One recoverable failure with enough identity to re-run the failing unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the event.
    pub severity: Severity,
    /// Stable machine readable code.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Systematic (knob or variation) name, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systematic: Option<String>,
    /// Reconstructed variable name, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// Input file identifier, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Diagnostic {
    /// Creates a diagnostic with no identity fields set.
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            systematic: None,
            variable: None,
            file: None,
        }
    }

    /// Shorthand for a warning.
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Builds an error diagnostic from a structured error.
    pub fn from_error(err: &NusysError) -> Self {
        let info = err.info();
        let mut diag = Self::new(Severity::Error, info.code.clone(), err.to_string());
        diag.systematic = info.context.get("systematic").cloned();
        diag.variable = info.context.get("variable").cloned();
        diag.file = info.context.get("file").cloned();
        diag
    }

    /// Sets the systematic name.
    pub fn with_systematic(mut self, systematic: impl Into<String>) -> Self {
        self.systematic = Some(systematic.into());
        self
    }

    /// Sets the variable name.
    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    /// Sets the file identifier.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    fn emit(&self) {
        let systematic = self.systematic.as_deref().unwrap_or("-");
        let variable = self.variable.as_deref().unwrap_or("-");
        let file = self.file.as_deref().unwrap_or("-");
        match self.severity {
            Severity::Info => info!(code = %self.code, systematic, variable, file, "{}", self.message),
            Severity::Warning | Severity::Error => {
                warn!(code = %self.code, systematic, variable, file, "{}", self.message)
            }
        }
    }
}

/// Ordered collection of diagnostics owned by one accumulation context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs and records a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        diagnostic.emit();
        self.entries.push(diagnostic);
    }

    /// Appends diagnostics recorded elsewhere without logging them again.
    pub fn extend(&mut self, other: Diagnostics) {
        debug!(count = other.entries.len(), "merging diagnostics");
        self.entries.extend(other.entries);
    }

    /// Recorded diagnostics in insertion order.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostics carrying the given code.
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.entries.iter().filter(move |diag| diag.code == code)
    }
}
