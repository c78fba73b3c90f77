//! upp Error Handling
//!
//! One error enum, [`UppError`], derived with `thiserror` and `miette` so every
//! failure that carries a source location renders with a labelled snippet.
//! Match failures are not errors: the matcher returns `None`.

use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::syntax::{NodeId, Span};

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Named source text used to render diagnostics.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

/// Converts a byte span to a miette SourceSpan.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Coarse classification used by tests and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Parse,
    Consumption,
    Expansion,
    Marker,
    Pattern,
    Internal,
    Environment,
}

#[derive(Error, Diagnostic, Debug)]
pub enum UppError {
    #[error("parse error: {message}")]
    #[diagnostic(code(upp::parse))]
    Parse {
        message: String,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("the grammar rejected the input here")]
        span: SourceSpan,
    },

    #[error("macro '{macro_name}' failed to consume: {message}")]
    #[diagnostic(code(upp::consumption))]
    Consumption {
        macro_name: String,
        message: String,
        node: Option<NodeId>,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("macro '{macro_name}': {message}")]
    #[diagnostic(code(upp::macro_error))]
    Macro {
        macro_name: String,
        message: String,
        node: Option<NodeId>,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("raised here")]
        span: SourceSpan,
    },

    #[error("replacement {new} partially overlaps pending replacement {existing}")]
    #[diagnostic(
        code(upp::replacement_conflict),
        help("replacements in one pass must be nested or disjoint")
    )]
    ReplacementConflict {
        existing: Span,
        new: Span,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("conflicting edit")]
        span: SourceSpan,
    },

    #[error("marker {handle} was invalidated by an earlier edit")]
    #[diagnostic(code(upp::marker_invalidated))]
    MarkerInvalidated { handle: usize },

    #[error("invalid pattern `{pattern}`: {message}")]
    #[diagnostic(code(upp::pattern))]
    Pattern { pattern: String, message: String },

    #[error("expansion did not settle after {passes} passes")]
    #[diagnostic(
        code(upp::pass_limit),
        help("a macro probably expands to another invocation of itself; raise max_passes if the recursion is intended")
    )]
    PassLimit { passes: usize },

    #[error("internal error: {0}")]
    #[diagnostic(code(upp::internal))]
    Internal(String),

    #[error("cannot read {path}: {source}")]
    #[diagnostic(code(upp::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    #[diagnostic(code(upp::config))]
    Config(String),
}

impl UppError {
    pub fn parse(source: &SourceContext, message: impl Into<String>, span: Span) -> Self {
        UppError::Parse {
            message: message.into(),
            src: source.to_named_source(),
            span: to_source_span(span),
        }
    }

    pub fn consumption(
        source: &SourceContext,
        macro_name: &str,
        message: impl Into<String>,
        span: Span,
        node: Option<NodeId>,
    ) -> Self {
        UppError::Consumption {
            macro_name: macro_name.to_string(),
            message: message.into(),
            node,
            src: source.to_named_source(),
            span: to_source_span(span),
        }
    }

    pub fn macro_failure(
        source: &SourceContext,
        macro_name: &str,
        message: impl Into<String>,
        span: Span,
        node: Option<NodeId>,
    ) -> Self {
        UppError::Macro {
            macro_name: macro_name.to_string(),
            message: message.into(),
            node,
            src: source.to_named_source(),
            span: to_source_span(span),
        }
    }

    pub fn conflict(source: &SourceContext, existing: Span, new: Span) -> Self {
        UppError::ReplacementConflict {
            existing,
            new,
            src: source.to_named_source(),
            span: to_source_span(new),
        }
    }

    pub fn pattern(pattern: &str, message: impl Into<String>) -> Self {
        UppError::Pattern {
            pattern: pattern.to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        UppError::Internal(message.into())
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        UppError::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the error category for test assertions
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse { .. } => ErrorCategory::Parse,
            Self::Consumption { .. } => ErrorCategory::Consumption,
            Self::Macro { .. } | Self::ReplacementConflict { .. } | Self::PassLimit { .. } => {
                ErrorCategory::Expansion
            }
            Self::MarkerInvalidated { .. } => ErrorCategory::Marker,
            Self::Pattern { .. } => ErrorCategory::Pattern,
            Self::Internal(_) => ErrorCategory::Internal,
            Self::Io { .. } | Self::Config(_) => ErrorCategory::Environment,
        }
    }

    /// The node an expansion failure is attached to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Consumption { node, .. } | Self::Macro { node, .. } => *node,
            _ => None,
        }
    }

    /// Byte span of the primary label, if the error has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Parse { span, .. }
            | Self::Consumption { span, .. }
            | Self::Macro { span, .. }
            | Self::ReplacementConflict { span, .. } => {
                Some(Span::new(span.offset(), span.offset() + span.len()))
            }
            _ => None,
        }
    }
}

// ============================================================================
// ERROR FORMATTING UTILITIES
// ============================================================================

/// Prints an error with full miette diagnostics to stderr.
pub fn print_error(error: UppError) {
    use miette::Report;
    let report = Report::new(error);
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_report_category_and_span() {
        let source = SourceContext::from_file("t.c", "int x = @m;");
        let err = UppError::consumption(&source, "m", "nothing to consume", Span::new(8, 10), None);
        assert_eq!(err.category(), ErrorCategory::Consumption);
        assert_eq!(err.span(), Some(Span::new(8, 10)));
        assert!(err.to_string().contains("macro 'm' failed to consume"));
    }

    #[test]
    fn unlocated_errors_have_no_span() {
        let err = UppError::PassLimit { passes: 3 };
        assert_eq!(err.category(), ErrorCategory::Expansion);
        assert_eq!(err.span(), None);
    }
}
