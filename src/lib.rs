//! # upp
//!
//! An AST-level macro preprocessor for C. Macros are invoked as `@name` or
//! `@name(args)` anywhere an expression, statement or top-level item may
//! appear, and rewrite the surrounding source through a replacement ledger
//! that keeps text, syntax tree and markers consistent across passes.
//!
//! ```no_run
//! use upp::{Driver, MacroRegistry, UppConfig};
//!
//! let mut registry = MacroRegistry::with_std();
//! registry.register_pattern("double", "$n", "($n)*2").unwrap();
//! let driver = Driver::new(registry, UppConfig::default());
//! let outcome = driver.expand("input.c", "int x = @double(2+3);").unwrap();
//! assert_eq!(outcome.text, "int x = (2+3)*2;");
//! ```

pub use crate::access::{NodeView, ViewCache};
pub use crate::config::UppConfig;
pub use crate::diagnostics::{DiagnosticEntry, Diagnostics};
pub use crate::errors::{ErrorCategory, SourceContext, UppError};
pub use crate::macros::{
    Driver, ExpansionContext, ExpansionOutcome, MacroDef, MacroRegistry, NativeMacro,
};
pub use crate::pattern::{compile, match_all, match_node, CaptureSet, Pattern};
pub use crate::syntax::{parse, Span, SyntaxNode, Tree};
pub use crate::tracker::{Document, MarkerHandle};

pub mod access;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod logging;
pub mod macros;
pub mod pattern;
pub mod syntax;
pub mod tracker;
