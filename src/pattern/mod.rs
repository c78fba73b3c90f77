//! Structural patterns
//!
//! A pattern is a code fragment with embedded wildcards:
//!
//! | syntax                  | meaning                                          |
//! |-------------------------|--------------------------------------------------|
//! | `$name`                 | any single node                                  |
//! | `$name__T1__T2`         | a node of kind `T1` or `T2`                      |
//! | `$name__NOT_T`          | a node of any kind but `T`                       |
//! | `opt$name`              | zero or one node in a child slot                 |
//! | `$name__until`          | zero or more sibling nodes, shortest split first |
//! | `$name__plus`           | one or more sibling nodes, shortest split first  |
//!
//! Everything else must match literally, compared by node kind and leaf text
//! with comments ignored. A name used twice must capture equal text.

use std::fmt;

use crate::syntax::{Span, SyntaxNode};

pub mod compiler;
pub mod matcher;

pub use compiler::{compile, PatternCompiler};
pub use matcher::{match_all, match_node};

/// Capture key holding the node the whole pattern matched.
pub const MATCH_KEY: &str = "__match__";

// ============================================================================
// COMPILED PATTERN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Optional,
    VariadicUntil,
    VariadicPlus,
}

impl Cardinality {
    pub fn is_variadic(self) -> bool {
        matches!(self, Cardinality::VariadicUntil | Cardinality::VariadicPlus)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSpec {
    pub type_tag: String,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    pub name: String,
    pub constraints: Vec<ConstraintSpec>,
    pub cardinality: Cardinality,
}

impl Wildcard {
    /// Negated specs reject first; otherwise any positive spec must match
    /// when at least one is present.
    pub fn accepts(&self, kind: &str) -> bool {
        if self
            .constraints
            .iter()
            .any(|c| c.negated && c.type_tag == kind)
        {
            return false;
        }
        let mut positives = self.constraints.iter().filter(|c| !c.negated).peekable();
        positives.peek().is_none() || positives.any(|c| c.type_tag == kind)
    }

    /// True when a constraint names a statement or declaration kind.
    pub fn wants_statement(&self) -> bool {
        self.constraints.iter().any(|c| {
            !c.negated && (c.type_tag.ends_with("_statement") || c.type_tag == "declaration")
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternNode {
    Literal {
        kind: String,
        named: bool,
        /// Exact text, compared only for leaves.
        text: String,
        children: Vec<PatternNode>,
    },
    Wildcard(Wildcard),
}

impl PatternNode {
    pub fn kind(&self) -> Option<&str> {
        match self {
            PatternNode::Literal { kind, .. } => Some(kind),
            PatternNode::Wildcard(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    root: PatternNode,
    wildcards: Vec<Wildcard>,
}

impl Pattern {
    pub(crate) fn new(source: String, root: PatternNode, wildcards: Vec<Wildcard>) -> Self {
        Self {
            source,
            root,
            wildcards,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &PatternNode {
        &self.root
    }

    /// Wildcards in order of appearance, one entry per occurrence.
    pub fn wildcards(&self) -> &[Wildcard] {
        &self.wildcards
    }

    pub fn root_kind(&self) -> Option<&str> {
        self.root.kind()
    }
}

// ============================================================================
// CAPTURES
// ============================================================================

#[derive(Debug, Clone)]
pub enum Capture {
    Node(SyntaxNode),
    /// Named nodes of a variadic run, plus the source slice the run covered.
    Sequence {
        nodes: Vec<SyntaxNode>,
        span: Option<Span>,
        text: String,
    },
}

impl Capture {
    pub fn text(&self) -> &str {
        match self {
            Capture::Node(node) => node.text(),
            Capture::Sequence { text, .. } => text,
        }
    }

    pub fn nodes(&self) -> Vec<SyntaxNode> {
        match self {
            Capture::Node(node) => vec![node.clone()],
            Capture::Sequence { nodes, .. } => nodes.clone(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Capture::Node(node) => Some(node.span()),
            Capture::Sequence { span, .. } => *span,
        }
    }
}

/// Bindings of one match attempt. Backed by a persistent map so the matcher
/// can snapshot and roll back in constant time while backtracking.
#[derive(Debug, Clone, Default)]
pub struct CaptureSet {
    map: im::HashMap<String, Capture>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Capture> {
        self.map.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, capture: Capture) {
        self.map.insert(name.into(), capture);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Single node bound to `name`.
    pub fn node(&self, name: &str) -> Option<&SyntaxNode> {
        match self.map.get(name)? {
            Capture::Node(node) => Some(node),
            Capture::Sequence { .. } => None,
        }
    }

    /// Nodes of a variadic capture; a single capture yields one element.
    pub fn sequence(&self, name: &str) -> Option<Vec<SyntaxNode>> {
        self.map.get(name).map(Capture::nodes)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(Capture::text)
    }

    /// The node the whole pattern matched.
    pub fn matched(&self) -> Option<&SyntaxNode> {
        self.node(MATCH_KEY)
    }

    /// Capture names in sorted order, the reserved key excluded.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .map
            .keys()
            .filter(|k| k.as_str() != MATCH_KEY)
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Display for CaptureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.names() {
            match self.map.get(&name) {
                Some(Capture::Node(node)) => writeln!(f, "{} = {} {:?}", name, node.kind(), node.text())?,
                Some(Capture::Sequence { nodes, .. }) => {
                    let items: Vec<&str> = nodes.iter().map(|n| n.text()).collect();
                    writeln!(f, "{} = [{}]", name, items.join(", "))?
                }
                None => {}
            }
        }
        Ok(())
    }
}
