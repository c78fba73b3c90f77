//! Diagnostics collected during one expansion run.
//!
//! Warnings (advisories, unknown macros) and non-fatal errors are gathered
//! here instead of aborting the run. The CLI renders them through miette at
//! the end; tests inspect them directly.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, Report, Severity, SourceCode, SourceSpan};

use crate::errors::{to_source_span, SourceContext, UppError};
use crate::syntax::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEntry {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<DiagnosticEntry>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.push(Severity::Warning, message.into(), span);
    }

    pub fn error(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.push(Severity::Error, message.into(), span);
    }

    /// Records a failure that was reported instead of propagated.
    pub fn record(&mut self, error: &UppError) {
        self.push(Severity::Error, error.to_string(), error.span());
    }

    fn push(&mut self, severity: Severity, message: String, span: Option<Span>) {
        self.entries.push(DiagnosticEntry {
            severity,
            message,
            span,
        });
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries
            .iter()
            .filter(|e| e.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter().filter(|e| e.severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Renders every entry against `source`.
    pub fn render(&self, source: &SourceContext) -> String {
        let src = source.to_named_source();
        self.entries
            .iter()
            .map(|entry| {
                let rendered = Rendered {
                    message: entry.message.clone(),
                    severity: entry.severity,
                    src: Arc::clone(&src),
                    span: entry.span.map(to_source_span),
                };
                format!("{:?}", Report::new(rendered))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Entry adapter with a severity chosen at runtime, which the derive macro
/// cannot express.
#[derive(Debug)]
struct Rendered {
    message: String,
    severity: Severity,
    src: Arc<NamedSource<String>>,
    span: Option<SourceSpan>,
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Rendered {}

impl Diagnostic for Rendered {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(self.src.as_ref())
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            None, span,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_are_separated() {
        let mut diags = Diagnostics::new();
        diags.warn("parent() used", None);
        diags.error("boom", Some(Span::new(0, 3)));
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.warnings().count(), 1);
        assert!(diags.has_errors());
        let rendered = diags.render(&SourceContext::from_file("a.c", "int x;"));
        assert!(rendered.contains("boom"));
    }
}
