//! Reporting of field failures absorbed in lenient mode.

use std::sync::{Mutex, PoisonError};

use crate::error::DeserializationError;

/// A field-level decode failure that did not abort the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub field: String,
    pub message: String,
    /// The wire text that was kept in place of the decoded value.
    pub raw_text: String,
}

impl Diagnostic {
    pub(crate) fn from_error(field: &str, error: &DeserializationError) -> Self {
        Diagnostic {
            field: field.to_string(),
            message: error.cause.to_string(),
            raw_text: error.raw_text.clone(),
        }
    }
}

/// Receives diagnostics from a marshaling policy.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Emits diagnostics as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            field = %diagnostic.field,
            error = %diagnostic.message,
            "failed to decode field, keeping original value"
        );
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct CapturingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything reported so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains everything reported so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl DiagnosticSink for CapturingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeserializationCause;

    #[test]
    fn capturing_sink_records_and_drains() {
        let sink = CapturingSink::new();
        let err = DeserializationError::new(
            "nope",
            DeserializationCause::MalformedDate { expected: "YYYY-MM-DD" },
        );
        sink.report(Diagnostic::from_error("created", &err));

        let seen = sink.diagnostics();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].field, "created");
        assert_eq!(seen[0].raw_text, "nope");

        assert_eq!(sink.take().len(), 1);
        assert!(sink.diagnostics().is_empty());
    }
}
