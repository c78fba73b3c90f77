//! Node access layer
//!
//! Macro code never sees [`SyntaxNode`] directly; it gets [`NodeView`]s. Views
//! are cached per run, so wrapping the same node twice yields the same view
//! (`NodeView::ptr_eq`). Navigating upward through `parent()` or `root()`
//! works but leaves a one-time advisory: deferred work belongs in `at_root` or
//! `in_scope`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use log::warn;

use crate::syntax::{NodeId, Point, Span, SyntaxNode};

/// Identity-preserving wrap cache, scoped to one driver run.
#[derive(Debug, Default)]
pub struct ViewCache {
    views: RefCell<HashMap<NodeId, NodeView>>,
    advised: RefCell<HashSet<&'static str>>,
    advisories: RefCell<Vec<String>>,
    advise_upward: bool,
}

impl ViewCache {
    pub fn new(advise_upward: bool) -> Rc<Self> {
        Rc::new(Self {
            advise_upward,
            ..Self::default()
        })
    }

    pub fn wrap(self: &Rc<Self>, node: SyntaxNode) -> NodeView {
        let id = node.id();
        if let Some(view) = self.views.borrow().get(&id) {
            return view.clone();
        }
        let view = NodeView {
            inner: Rc::new(ViewInner {
                node,
                cache: Rc::downgrade(self),
            }),
        };
        self.views.borrow_mut().insert(id, view.clone());
        view
    }

    pub fn len(&self) -> usize {
        self.views.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.borrow().is_empty()
    }

    /// Drops cached views of trees that are no longer current.
    pub fn retain_tree(&self, tree: u64) {
        self.views.borrow_mut().retain(|id, _| id.tree == tree);
    }

    /// Advisories emitted since the last call.
    pub fn take_advisories(&self) -> Vec<String> {
        std::mem::take(&mut *self.advisories.borrow_mut())
    }

    fn advise(&self, accessor: &'static str, node: &SyntaxNode) {
        if !self.advise_upward || !self.advised.borrow_mut().insert(accessor) {
            return;
        }
        let message = format!(
            "{}() used on {} at {}; prefer at_root/in_scope for edits outside the invocation",
            accessor,
            node.kind(),
            node.span()
        );
        warn!("{}", message);
        self.advisories.borrow_mut().push(message);
    }
}

#[derive(Debug)]
struct ViewInner {
    node: SyntaxNode,
    cache: Weak<ViewCache>,
}

/// Read-only view of a node handed to macro code.
#[derive(Clone)]
pub struct NodeView {
    inner: Rc<ViewInner>,
}

impl NodeView {
    fn wrap(&self, node: SyntaxNode) -> NodeView {
        match self.inner.cache.upgrade() {
            Some(cache) => cache.wrap(node),
            None => NodeView {
                inner: Rc::new(ViewInner {
                    node,
                    cache: Weak::new(),
                }),
            },
        }
    }

    /// The underlying node.
    pub fn node(&self) -> &SyntaxNode {
        &self.inner.node
    }

    pub fn id(&self) -> NodeId {
        self.inner.node.id()
    }

    pub fn kind(&self) -> &str {
        self.inner.node.kind()
    }

    pub fn text(&self) -> &str {
        self.inner.node.text()
    }

    pub fn span(&self) -> Span {
        self.inner.node.span()
    }

    pub fn start(&self) -> usize {
        self.inner.node.start()
    }

    pub fn end(&self) -> usize {
        self.inner.node.end()
    }

    pub fn start_position(&self) -> Point {
        self.inner.node.start_position()
    }

    pub fn is_named(&self) -> bool {
        self.inner.node.is_named()
    }

    pub fn field_name(&self) -> Option<&'static str> {
        self.inner.node.field_name()
    }

    pub fn child_count(&self) -> usize {
        self.inner.node.child_count()
    }

    pub fn named_child_count(&self) -> usize {
        self.inner.node.named_child_count()
    }

    pub fn child(&self, i: usize) -> Option<NodeView> {
        self.inner.node.child(i).map(|n| self.wrap(n))
    }

    pub fn named_child(&self, i: usize) -> Option<NodeView> {
        self.inner.node.named_child(i).map(|n| self.wrap(n))
    }

    pub fn children(&self) -> Vec<NodeView> {
        self.inner.node.children().map(|n| self.wrap(n)).collect()
    }

    pub fn named_children(&self) -> Vec<NodeView> {
        self.inner
            .node
            .named_children()
            .map(|n| self.wrap(n))
            .collect()
    }

    pub fn child_for_field_name(&self, field: &str) -> Option<NodeView> {
        self.inner
            .node
            .child_by_field_name(field)
            .map(|n| self.wrap(n))
    }

    pub fn next_named_sibling(&self) -> Option<NodeView> {
        self.inner.node.next_named_sibling().map(|n| self.wrap(n))
    }

    pub fn prev_named_sibling(&self) -> Option<NodeView> {
        self.inner.node.prev_named_sibling().map(|n| self.wrap(n))
    }

    pub fn last_named_child(&self) -> Option<NodeView> {
        self.inner.node.last_named_child().map(|n| self.wrap(n))
    }

    pub fn is_descendant_of(&self, other: &NodeView) -> bool {
        self.inner.node.is_descendant_of(&other.inner.node)
    }

    pub fn is_same_node(&self, other: &NodeView) -> bool {
        self.inner.node.is_same_node(&other.inner.node)
    }

    /// True when both values are the same cached view object.
    pub fn ptr_eq(&self, other: &NodeView) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn parent(&self) -> Option<NodeView> {
        if let Some(cache) = self.inner.cache.upgrade() {
            cache.advise("parent", &self.inner.node);
        }
        self.inner.node.parent().map(|n| self.wrap(n))
    }

    pub fn root(&self) -> NodeView {
        if let Some(cache) = self.inner.cache.upgrade() {
            cache.advise("root", &self.inner.node);
        }
        self.wrap(self.inner.node.tree().root_node())
    }

    pub fn to_sexp(&self) -> String {
        self.inner.node.to_sexp()
    }
}

impl fmt::Debug for NodeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeView({:?})", self.inner.node)
    }
}

impl PartialEq for NodeView {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for NodeView {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    #[test]
    fn wrapping_is_identity_preserving() {
        let tree = parse("int x; int y;");
        let cache = ViewCache::new(true);
        let root = cache.wrap(tree.root_node());
        let a = root.named_child(0).expect("first");
        let b = root.named_child(0).expect("first again");
        assert!(a.ptr_eq(&b));
        assert!(a.next_named_sibling().is_some_and(|s| s.text() == "int y;"));
    }

    #[test]
    fn upward_navigation_is_advised_once() {
        let tree = parse("int x; int y;");
        let cache = ViewCache::new(true);
        let decl = cache.wrap(tree.root_node()).named_child(1).expect("decl");
        let parent = decl.parent().expect("parent");
        assert_eq!(parent.kind(), "translation_unit");
        decl.parent();
        decl.root();
        let advisories = cache.take_advisories();
        assert_eq!(advisories.len(), 2);
        assert!(cache.take_advisories().is_empty());
    }

    #[test]
    fn advisories_can_be_disabled() {
        let tree = parse("int x;");
        let cache = ViewCache::new(false);
        let decl = cache.wrap(tree.root_node()).named_child(0).expect("decl");
        assert!(decl.parent().is_some());
        assert!(cache.take_advisories().is_empty());
    }
}
