//! Offset and marker tracking
//!
//! A [`Document`] owns one source buffer together with its current tree and a
//! side-table of markers. [`Document::splice`] is the only way text changes:
//! it shifts or invalidates markers, notifies the tree of the edit and marks
//! the document dirty. The next [`Document::reparse`] produces a fresh tree
//! and re-homes the markers onto it.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};

use crate::errors::{SourceContext, UppError};
use crate::syntax::{parse, parse_with, InputEdit, LineIndex, SyntaxNode, Tree, TreeId};

// ============================================================================
// IDS
// ============================================================================

/// Monotonic counter shared by a document and every nested document created
/// from it, so generated names and tokens never collide across them.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator(Rc<Cell<u64>>);

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        let id = self.0.get();
        self.0.set(id + 1);
        id
    }

    pub fn peek(&self) -> u64 {
        self.0.get()
    }
}

// ============================================================================
// MARKERS
// ============================================================================

/// Opaque handle to a marker in one document's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(usize);

impl MarkerHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerPayload {
    /// Free-form tag set by macro code.
    Label(String),
    /// An invocation whose expansion failed and must not be retried.
    Invocation { name: String },
    /// Position of a sibling invocation swallowed as an opaque placeholder.
    ConsumedPlaceholder { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub tree: TreeId,
    pub offset: usize,
    pub payload: MarkerPayload,
    pub valid: bool,
}

/// Side-table of markers owned by one document. Destroyed slots stay empty so
/// a stale handle can never alias a newer marker.
#[derive(Debug, Default)]
pub struct MarkerTable {
    slots: Vec<Option<Marker>>,
}

impl MarkerTable {
    fn insert(&mut self, marker: Marker) -> MarkerHandle {
        self.slots.push(Some(marker));
        MarkerHandle(self.slots.len() - 1)
    }

    pub fn get(&self, handle: MarkerHandle) -> Option<&Marker> {
        self.slots.get(handle.0).and_then(|m| m.as_ref())
    }

    fn remove(&mut self, handle: MarkerHandle) -> Option<Marker> {
        self.slots.get_mut(handle.0).and_then(|m| m.take())
    }

    pub fn iter(&self) -> impl Iterator<Item = (MarkerHandle, &Marker)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_ref().map(|m| (MarkerHandle(i), m)))
    }

    fn shift(&mut self, tree: TreeId, offset: usize, delete: usize, inserted: usize) {
        let old_end = offset + delete;
        for marker in self.slots.iter_mut().flatten() {
            if marker.tree != tree || !marker.valid {
                continue;
            }
            if marker.offset >= old_end {
                marker.offset = marker.offset - delete + inserted;
            } else if marker.offset >= offset {
                marker.valid = false;
            }
        }
    }

    fn migrate(&mut self, old: TreeId, new: TreeId) -> usize {
        let mut moved = 0;
        for marker in self.slots.iter_mut().flatten() {
            if marker.tree == old {
                marker.tree = new;
                moved += 1;
            }
        }
        moved
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Identity of the document a nested document was created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub path: String,
    pub document: u64,
}

#[derive(Debug)]
pub struct Document {
    id: u64,
    path: String,
    text: String,
    tree: Rc<Tree>,
    markers: MarkerTable,
    ids: IdGenerator,
    parent: Option<ParentLink>,
    dirty: bool,
}

impl Document {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_ids(path, text, IdGenerator::new(), None)
    }

    fn with_ids(
        path: impl Into<String>,
        text: impl Into<String>,
        ids: IdGenerator,
        parent: Option<ParentLink>,
    ) -> Self {
        let text = text.into();
        let tree = parse(&text);
        Document {
            id: ids.next_id(),
            path: path.into(),
            text,
            tree,
            markers: MarkerTable::default(),
            ids,
            parent,
            dirty: false,
        }
    }

    /// Creates a document for a fragment expanded on behalf of this one. The
    /// child shares this document's id generator.
    pub fn nested(&self, text: impl Into<String>) -> Document {
        let link = ParentLink {
            path: self.path.clone(),
            document: self.id,
        };
        Self::with_ids(
            format!("{}#nested", self.path),
            text,
            self.ids.clone(),
            Some(link),
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tree(&self) -> &Rc<Tree> {
        &self.tree
    }

    pub fn root(&self) -> SyntaxNode {
        self.tree.root_node()
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn markers(&self) -> &MarkerTable {
        &self.markers
    }

    pub fn source_context(&self) -> SourceContext {
        SourceContext::from_file(self.path.clone(), self.text.clone())
    }

    /// Deletes `delete` bytes at `offset` and inserts `insert` there. Both
    /// arguments are clamped to the text. Returns the new text.
    pub fn splice(&mut self, offset: usize, delete: usize, insert: &str) -> &str {
        let len = self.text.len();
        let mut offset = offset.min(len);
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        let mut old_end = offset + delete.min(len - offset);
        while !self.text.is_char_boundary(old_end) {
            old_end += 1;
        }
        let delete = old_end - offset;
        let new_end = offset + insert.len();

        self.markers
            .shift(self.tree.id(), offset, delete, insert.len());

        let before = LineIndex::new(&self.text);
        let start_position = before.point(offset);
        let old_end_position = before.point(old_end);
        self.text.replace_range(offset..old_end, insert);
        let new_end_position = LineIndex::new(&self.text).point(new_end);

        let edit = InputEdit {
            start_byte: offset,
            old_end_byte: old_end,
            new_end_byte: new_end,
            start_position,
            old_end_position,
            new_end_position,
        };
        if let Err(e) = self.tree.edit(&edit) {
            debug!("edit notification for {} rejected: {}", self.path, e);
        }
        trace!(
            "splice {}: {}..{} -> {} bytes",
            self.path,
            offset,
            old_end,
            insert.len()
        );
        self.dirty = true;
        &self.text
    }

    /// Brings the tree up to date with the text and re-homes markers.
    pub fn reparse(&mut self) {
        if !self.dirty {
            return;
        }
        let old = Rc::clone(&self.tree);
        let new = parse_with(&self.text, Some(&old));
        let moved = self.migrate(old.id(), new.id());
        debug!(
            "{}: tree {} -> {} ({} marker(s) migrated)",
            self.path,
            old.id(),
            new.id(),
            moved
        );
        self.tree = new;
        self.dirty = false;
    }

    /// Re-homes every marker registered under `old` onto `new`.
    pub fn migrate(&mut self, old: TreeId, new: TreeId) -> usize {
        self.markers.migrate(old, new)
    }

    pub fn create_marker(&mut self, offset: usize, payload: MarkerPayload) -> MarkerHandle {
        let marker = Marker {
            tree: self.tree.id(),
            offset: offset.min(self.text.len()),
            payload,
            valid: true,
        };
        self.markers.insert(marker)
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&Marker> {
        self.markers.get(handle)
    }

    /// Finds the smallest node containing the marker's offset or, with
    /// `kind`, the nearest node of that kind enclosing it.
    pub fn resolve_marker(
        &mut self,
        handle: MarkerHandle,
        kind: Option<&str>,
    ) -> Result<Option<SyntaxNode>, UppError> {
        self.reparse();
        let marker = self
            .markers
            .get(handle)
            .ok_or(UppError::MarkerInvalidated { handle: handle.0 })?;
        if !marker.valid || marker.tree != self.tree.id() {
            return Err(UppError::MarkerInvalidated { handle: handle.0 });
        }
        let root = self.tree.root_node();
        let Some(node) = root.descendant_for_byte_range(marker.offset, marker.offset) else {
            return Ok(None);
        };
        match kind {
            None => Ok(Some(node)),
            Some(kind) => Ok(std::iter::once(node.clone())
                .chain(node.ancestors())
                .find(|n| n.kind() == kind)),
        }
    }

    pub fn destroy_marker(&mut self, handle: MarkerHandle) -> bool {
        self.markers.remove(handle).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_shifts_and_invalidates_markers() {
        let mut doc = Document::new("t.c", "abcdef");
        let at0 = doc.create_marker(0, MarkerPayload::Label("a".into()));
        let at2 = doc.create_marker(2, MarkerPayload::Label("c".into()));
        let at5 = doc.create_marker(5, MarkerPayload::Label("f".into()));

        assert_eq!(doc.splice(2, 1, "XY"), "abXYdef");

        assert_eq!(doc.marker(at0).map(|m| (m.offset, m.valid)), Some((0, true)));
        assert_eq!(doc.marker(at5).map(|m| (m.offset, m.valid)), Some((6, true)));
        assert_eq!(doc.marker(at2).map(|m| m.valid), Some(false));
        assert!(doc.is_dirty());
    }

    #[test]
    fn splice_clamps_arguments() {
        let mut doc = Document::new("t.c", "abc");
        assert_eq!(doc.splice(10, 5, "!"), "abc!");
        assert_eq!(doc.splice(1, 99, ""), "a");
    }

    #[test]
    fn reparse_migrates_markers_and_resolves_nodes() {
        let mut doc = Document::new("t.c", "int a;\nint b;\n");
        let handle = doc.create_marker(11, MarkerPayload::Label("b".into()));
        let old = doc.tree().id();

        doc.splice(0, 0, "int z;\n");
        let node = doc
            .resolve_marker(handle, Some("declaration"))
            .expect("marker resolves")
            .expect("declaration found");
        assert_ne!(doc.tree().id(), old);
        assert_eq!(node.text(), "int b;");
        assert_eq!(doc.marker(handle).map(|m| m.tree), Some(doc.tree().id()));
    }

    #[test]
    fn resolving_a_deleted_position_fails_loudly() {
        let mut doc = Document::new("t.c", "int a;\nint b;\n");
        let handle = doc.create_marker(8, MarkerPayload::Label("b".into()));
        doc.splice(7, 7, "");
        let err = doc.resolve_marker(handle, None).expect_err("invalidated");
        assert!(matches!(err, UppError::MarkerInvalidated { .. }));
    }

    #[test]
    fn unmigrated_markers_are_stale() {
        let mut doc = Document::new("t.c", "int a;");
        let handle = doc.create_marker(0, MarkerPayload::Label("a".into()));
        doc.splice(6, 0, " ");
        doc.tree = parse(doc.text());
        doc.dirty = false;
        assert!(doc.resolve_marker(handle, None).is_err());
    }

    #[test]
    fn nested_documents_share_ids() {
        let doc = Document::new("t.c", "int a;");
        let before = doc.ids().peek();
        let child = doc.nested("int b;");
        assert_eq!(child.parent().map(|p| p.document), Some(doc.id()));
        assert!(doc.ids().peek() > before);
    }
}
