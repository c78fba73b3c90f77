//! # upp Macro Expansion System
//!
//! Macros are `@name` / `@name(args)` invocations in C source. A [`Driver`]
//! finds them in the tree, gives each one an [`ExpansionContext`], and lets
//! the macro claim nodes, register edits and schedule deferred work. Edits
//! are collected in the [`ledger`] and committed once per pass; passes repeat
//! until no invocation is left.
//!
//! ## Layout
//!
//! - [`ledger`]: pending replacements, placeholder tokens, the commit sweep
//! - [`context`]: the API macro code programs against, including `consume()`
//! - [`driver`]: discovery, the pass loop, deferred task scheduling
//! - [`registry`] / [`loader`]: native and pattern macro definitions
//! - [`std`]: built-in macros
//! - [`code`]: the `code!` builder for generated fragments

use ::std::fmt;

use crate::errors::UppError;
use crate::syntax::{NodeId, Span};

pub mod code;
pub mod context;
pub mod driver;
pub mod ledger;
pub mod loader;
pub mod registry;
pub mod std;

pub use code::Code;
pub use context::{ExpansionContext, IntoRange, ViewCaptures};
pub use driver::{Driver, ExpansionOutcome, PassRecord};
pub use ledger::{Ledger, Replacement, Scope};
pub use loader::{load_macros_from_file, parse_macros_from_str, MacroSpec};
pub use registry::{MacroDef, MacroRegistry, NativeMacro};

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// One macro invocation found in the current tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInvocation {
    pub name: String,
    pub range: Span,
    pub node: NodeId,
    /// The invocation carries an argument list.
    pub has_explicit_target: bool,
}

impl fmt::Display for MacroInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} at {}", self.name, self.range)
    }
}

/// Callback run later in the same pass, at the root or the enclosing block.
pub type TaskCallback = Box<dyn FnOnce(&mut ExpansionContext<'_>) -> Result<(), UppError>>;

/// Whole-tree hook run once after expansion settles.
pub type Transform = ::std::rc::Rc<dyn Fn(&mut ExpansionContext<'_>) -> Result<(), UppError>>;

pub struct DeferredTask {
    pub anchor: NodeId,
    pub anchor_span: Span,
    pub anchor_is_root: bool,
    pub origin: MacroInvocation,
    pub callback: TaskCallback,
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("anchor", &self.anchor)
            .field("anchor_span", &self.anchor_span)
            .field("anchor_is_root", &self.anchor_is_root)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
