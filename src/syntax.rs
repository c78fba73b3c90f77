//! Syntax module for the upp preprocessor
//!
//! This module provides the concrete syntax tree the macro engine works on: an
//! immutable arena of nodes with byte ranges, positions, field names and the
//! named/anonymous distinction, plus cheap `SyntaxNode` handles into it.
//!
//! Trees are never mutated after parsing. Source edits go through
//! `tracker::Document::splice`, which notifies the tree via [`Tree::edit`] and
//! later reparses to obtain a fresh tree.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub mod parser;
pub mod query;

pub use parser::{parse, parse_with};
pub use query::{Query, QueryMatch};

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// Kind of the synthetic node produced when the grammar rejects the input.
pub const ERROR_KIND: &str = "ERROR";

/// Kind used for comment nodes.
pub const COMMENT_KIND: &str = "comment";

/// Represents a byte span `[start, end)` in the source code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True when `other` lies within `self` (identical spans included).
    pub fn covers(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when `other` lies within `self` and differs from it. An empty span
    /// sitting on one of `self`'s boundaries is adjacent, not contained.
    pub fn strictly_contains(&self, other: &Span) -> bool {
        if self == other || self.is_empty() || !self.covers(other) {
            return false;
        }
        if other.is_empty() {
            return self.start < other.start && other.start < self.end;
        }
        true
    }

    /// True when the spans intersect without one containing the other.
    pub fn partially_overlaps(&self, other: &Span) -> bool {
        if self == other || self.covers(other) || other.covers(self) {
            return false;
        }
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Zero-based row and byte column of a source position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// Identity of one parsed tree. Every parse mints a fresh id.
pub type TreeId = u64;

/// Stable identity of a node: its tree plus its arena index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId {
    pub tree: TreeId,
    pub index: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tree, self.index)
    }
}

/// Describes one textual edit so the tree can account for it before reparsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_position: Point,
    pub old_end_position: Point,
    pub new_end_position: Point,
}

/// Why an edit notification was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeEditError {
    #[error("edit {start}..{old_end} is out of bounds for a document of {len} bytes")]
    OutOfBounds {
        start: usize,
        old_end: usize,
        len: usize,
    },
    #[error("edit range is inverted ({start} > {old_end})")]
    Inverted { start: usize, old_end: usize },
}

/// Grammar failure retained on an error tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub message: String,
    pub span: Span,
}

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

fn next_tree_id() -> TreeId {
    NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Node as produced by the grammar adapter, before flattening into a tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawNode {
    pub kind: String,
    pub named: bool,
    pub span: Span,
    pub field: Option<&'static str>,
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn named(kind: impl Into<String>, span: Span, children: Vec<RawNode>) -> Self {
        Self {
            kind: kind.into(),
            named: true,
            span,
            field: None,
            children,
        }
    }

    pub fn anonymous(text: &str, span: Span) -> Self {
        Self {
            kind: text.to_string(),
            named: false,
            span,
            field: None,
            children: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }
}

#[derive(Debug)]
struct NodeData {
    kind: String,
    named: bool,
    span: Span,
    start_position: Point,
    field: Option<&'static str>,
    parent: Option<u32>,
    children: Vec<u32>,
}

/// An immutable syntax tree over one snapshot of source text.
#[derive(Debug)]
pub struct Tree {
    id: TreeId,
    source: String,
    nodes: Vec<NodeData>,
    error: Option<ParseFailure>,
    edits: RefCell<Vec<InputEdit>>,
}

impl Tree {
    pub(crate) fn from_raw(source: String, root: RawNode, error: Option<ParseFailure>) -> Rc<Tree> {
        let lines = LineIndex::new(&source);
        let mut nodes = Vec::new();
        flatten(root, None, &lines, &mut nodes);
        Rc::new(Tree {
            id: next_tree_id(),
            source,
            nodes,
            error,
            edits: RefCell::new(Vec::new()),
        })
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    /// The source snapshot this tree was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root_node(self: &Rc<Self>) -> SyntaxNode {
        SyntaxNode {
            tree: Rc::clone(self),
            index: 0,
        }
    }

    /// Returns the node stored under `id`, if it belongs to this tree.
    pub fn node(self: &Rc<Self>, id: NodeId) -> Option<SyntaxNode> {
        if id.tree != self.id || id.index as usize >= self.nodes.len() {
            return None;
        }
        Some(SyntaxNode {
            tree: Rc::clone(self),
            index: id.index,
        })
    }

    pub fn error(&self) -> Option<&ParseFailure> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.nodes.iter().any(|n| n.kind == ERROR_KIND)
    }

    /// Records an edit notification. Offsets are in the coordinates of the text
    /// after all previously recorded edits.
    pub fn edit(&self, edit: &InputEdit) -> Result<(), TreeEditError> {
        if edit.start_byte > edit.old_end_byte {
            return Err(TreeEditError::Inverted {
                start: edit.start_byte,
                old_end: edit.old_end_byte,
            });
        }
        let len = self.edited_len();
        if edit.old_end_byte > len {
            return Err(TreeEditError::OutOfBounds {
                start: edit.start_byte,
                old_end: edit.old_end_byte,
                len,
            });
        }
        self.edits.borrow_mut().push(edit.clone());
        Ok(())
    }

    /// Length of the document once every recorded edit is applied.
    pub fn edited_len(&self) -> usize {
        self.edits.borrow().iter().fold(self.source.len(), |len, e| {
            len + (e.new_end_byte - e.start_byte) - (e.old_end_byte - e.start_byte)
        })
    }

    pub fn pending_edits(&self) -> usize {
        self.edits.borrow().len()
    }
}

fn flatten(raw: RawNode, parent: Option<u32>, lines: &LineIndex, nodes: &mut Vec<NodeData>) -> u32 {
    let index = nodes.len() as u32;
    nodes.push(NodeData {
        kind: raw.kind,
        named: raw.named,
        span: raw.span,
        start_position: lines.point(raw.span.start),
        field: raw.field,
        parent,
        children: Vec::with_capacity(raw.children.len()),
    });
    for child in raw.children {
        let child_index = flatten(child, Some(index), lines, nodes);
        nodes[index as usize].children.push(child_index);
    }
    index
}

// ============================================================================
// NODE HANDLES
// ============================================================================

/// A read-only handle to one node of a tree.
#[derive(Clone)]
pub struct SyntaxNode {
    tree: Rc<Tree>,
    index: u32,
}

impl SyntaxNode {
    fn data(&self) -> &NodeData {
        &self.tree.nodes[self.index as usize]
    }

    fn at(&self, index: u32) -> SyntaxNode {
        SyntaxNode {
            tree: Rc::clone(&self.tree),
            index,
        }
    }

    pub fn id(&self) -> NodeId {
        NodeId {
            tree: self.tree.id,
            index: self.index,
        }
    }

    pub fn tree(&self) -> &Rc<Tree> {
        &self.tree
    }

    pub fn kind(&self) -> &str {
        &self.data().kind
    }

    pub fn is_named(&self) -> bool {
        self.data().named
    }

    pub fn is_error(&self) -> bool {
        self.kind() == ERROR_KIND
    }

    pub fn is_comment(&self) -> bool {
        self.kind() == COMMENT_KIND
    }

    pub fn text(&self) -> &str {
        let span = self.data().span;
        &self.tree.source[span.start..span.end]
    }

    pub fn span(&self) -> Span {
        self.data().span
    }

    pub fn start(&self) -> usize {
        self.data().span.start
    }

    pub fn end(&self) -> usize {
        self.data().span.end
    }

    pub fn start_position(&self) -> Point {
        self.data().start_position
    }

    /// Field name this node occupies in its parent, if any.
    pub fn field_name(&self) -> Option<&'static str> {
        self.data().field
    }

    pub fn child_count(&self) -> usize {
        self.data().children.len()
    }

    pub fn child(&self, i: usize) -> Option<SyntaxNode> {
        self.data().children.get(i).map(|&c| self.at(c))
    }

    pub fn children(&self) -> impl Iterator<Item = SyntaxNode> + '_ {
        self.data().children.iter().map(move |&c| self.at(c))
    }

    pub fn named_children(&self) -> impl Iterator<Item = SyntaxNode> + '_ {
        self.children().filter(|c| c.is_named())
    }

    pub fn named_child_count(&self) -> usize {
        self.named_children().count()
    }

    pub fn named_child(&self, i: usize) -> Option<SyntaxNode> {
        self.named_children().nth(i)
    }

    pub fn last_named_child(&self) -> Option<SyntaxNode> {
        self.named_children().last()
    }

    pub fn child_by_field_name(&self, field: &str) -> Option<SyntaxNode> {
        self.children().find(|c| c.field_name() == Some(field))
    }

    pub fn parent(&self) -> Option<SyntaxNode> {
        self.data().parent.map(|p| self.at(p))
    }

    /// Position of this node among its parent's children.
    pub fn index_in_parent(&self) -> Option<usize> {
        let parent = self.parent()?;
        parent
            .data()
            .children
            .iter()
            .position(|&c| c == self.index)
    }

    pub fn next_sibling(&self) -> Option<SyntaxNode> {
        let parent = self.parent()?;
        let pos = self.index_in_parent()?;
        parent.child(pos + 1)
    }

    pub fn next_named_sibling(&self) -> Option<SyntaxNode> {
        let parent = self.parent()?;
        let pos = self.index_in_parent()?;
        let found = parent.children().skip(pos + 1).find(|c| c.is_named());
        found
    }

    pub fn prev_named_sibling(&self) -> Option<SyntaxNode> {
        let parent = self.parent()?;
        let pos = self.index_in_parent()?;
        let found = parent.children().take(pos).filter(|c| c.is_named()).last();
        found
    }

    pub fn ancestors(&self) -> impl Iterator<Item = SyntaxNode> {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    pub fn is_same_node(&self, other: &SyntaxNode) -> bool {
        self.id() == other.id()
    }

    /// True when `self` lies strictly below `ancestor` in the same tree.
    pub fn is_descendant_of(&self, ancestor: &SyntaxNode) -> bool {
        self.tree.id == ancestor.tree.id && self.ancestors().any(|a| a.index == ancestor.index)
    }

    /// Pre-order iterator over this node and all of its descendants.
    pub fn descendants(&self) -> Descendants {
        Descendants {
            stack: vec![self.clone()],
        }
    }

    /// Smallest node whose span covers `[start, end)`.
    pub fn descendant_for_byte_range(&self, start: usize, end: usize) -> Option<SyntaxNode> {
        let target = Span::new(start, end);
        if !self.span().covers(&target) {
            return None;
        }
        let mut current = self.clone();
        'descend: loop {
            let children: Vec<SyntaxNode> = current.children().collect();
            for child in children {
                let span = child.span();
                let fits = if target.is_empty() {
                    span.start <= start && start < span.end
                } else {
                    span.covers(&target)
                };
                if fits {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    /// Renders the subtree as an s-expression of named nodes.
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        write_sexp(self, &mut out);
        out
    }
}

fn write_sexp(node: &SyntaxNode, out: &mut String) {
    out.push('(');
    if let Some(field) = node.field_name() {
        out.push_str(field);
        out.push_str(": ");
    }
    out.push_str(node.kind());
    for child in node.named_children() {
        out.push(' ');
        write_sexp(&child, out);
    }
    out.push(')');
}

impl PartialEq for SyntaxNode {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for SyntaxNode {}

impl fmt::Debug for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {:?}", self.kind(), self.span(), self.text())
    }
}

pub struct Descendants {
    stack: Vec<SyntaxNode>,
}

impl Iterator for Descendants {
    type Item = SyntaxNode;

    fn next(&mut self) -> Option<SyntaxNode> {
        let node = self.stack.pop()?;
        let children: Vec<_> = node.children().collect();
        self.stack.extend(children.into_iter().rev());
        Some(node)
    }
}

/// Serializable snapshot of a subtree, used for `upp ast --json`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDump {
    pub kind: String,
    pub named: bool,
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDump>,
}

impl From<&SyntaxNode> for NodeDump {
    fn from(node: &SyntaxNode) -> Self {
        let children: Vec<NodeDump> = node.children().map(|c| NodeDump::from(&c)).collect();
        NodeDump {
            kind: node.kind().to_string(),
            named: node.is_named(),
            start: node.start(),
            end: node.end(),
            field: node.field_name(),
            text: children.is_empty().then(|| node.text().to_string()),
            children,
        }
    }
}

// ============================================================================
// POSITIONS
// ============================================================================

/// Byte offsets of line starts, for offset to row/column conversion.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn point(&self, offset: usize) -> Point {
        let row = match self.starts.binary_search(&offset) {
            Ok(row) => row,
            Err(next) => next - 1,
        };
        Point::new(row, offset - self.starts[row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_maps_offsets() {
        let lines = LineIndex::new("ab\ncd\n\nx");
        assert_eq!(lines.point(0), Point::new(0, 0));
        assert_eq!(lines.point(2), Point::new(0, 2));
        assert_eq!(lines.point(3), Point::new(1, 0));
        assert_eq!(lines.point(7), Point::new(3, 0));
    }

    #[test]
    fn span_containment_treats_boundary_insertions_as_adjacent() {
        let outer = Span::new(4, 10);
        assert!(outer.strictly_contains(&Span::new(5, 7)));
        assert!(outer.strictly_contains(&Span::new(6, 6)));
        assert!(!outer.strictly_contains(&Span::new(4, 4)));
        assert!(!outer.strictly_contains(&Span::new(10, 10)));
        assert!(!outer.strictly_contains(&outer));
        assert!(outer.partially_overlaps(&Span::new(8, 12)));
        assert!(!outer.partially_overlaps(&Span::new(10, 12)));
    }

    #[test]
    fn tree_edit_validates_bounds() {
        let tree = parse("int x;");
        let ok = InputEdit {
            start_byte: 4,
            old_end_byte: 5,
            new_end_byte: 7,
            start_position: Point::new(0, 4),
            old_end_position: Point::new(0, 5),
            new_end_position: Point::new(0, 7),
        };
        assert!(tree.edit(&ok).is_ok());
        assert_eq!(tree.edited_len(), 8);
        let bad = InputEdit {
            start_byte: 2,
            old_end_byte: 20,
            ..ok
        };
        assert!(matches!(tree.edit(&bad), Err(TreeEditError::OutOfBounds { .. })));
    }
}
