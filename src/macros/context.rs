//! Expansion context
//!
//! One [`ExpansionContext`] exists per running macro (and per deferred task).
//! It is the only door macro code has into the document: reads go through
//! [`NodeView`]s, writes go to the ledger, and `consume()` claims the code
//! the macro operates on.
//!
//! Edit scope is judged against the context's active expansion record (the
//! invocation range, or the anchor for deferred tasks):
//!
//! - inside the record: local
//! - strictly enclosing it: outward, registered on the enclosing range and
//!   reported back as a placeholder token
//! - anywhere else: global
//!
//! Edits that land strictly inside another still-pending invocation are
//! refused.

use log::{debug, warn};

use super::driver::{self, Session};
use super::{DeferredTask, MacroInvocation, Scope, Transform};
use crate::access::NodeView;
use crate::config::UppConfig;
use crate::errors::UppError;
use crate::pattern::{self, CaptureSet};
use crate::syntax::{Query, Span, SyntaxNode};
use crate::tracker::{MarkerHandle, MarkerPayload};

/// Kinds whose children form an open-ended list. An invocation sitting in one
/// of these never receives an implicit target.
const LIST_KINDS: &[&str] = &[
    "translation_unit",
    "compound_statement",
    "field_declaration_list",
    "argument_list",
    "parameter_list",
    "initializer_list",
    "enumerator_list",
    "expression_statement",
];

const SCOPE_KINDS: &[&str] = &["compound_statement"];

/// Anything that designates a byte range of the current text.
pub trait IntoRange {
    fn byte_range(&self) -> Span;
}

impl IntoRange for Span {
    fn byte_range(&self) -> Span {
        *self
    }
}

impl IntoRange for NodeView {
    fn byte_range(&self) -> Span {
        self.span()
    }
}

impl IntoRange for SyntaxNode {
    fn byte_range(&self) -> Span {
        self.span()
    }
}

impl<T: IntoRange + ?Sized> IntoRange for &T {
    fn byte_range(&self) -> Span {
        (**self).byte_range()
    }
}

/// Captures of one query match, as views.
#[derive(Debug, Clone, Default)]
pub struct ViewCaptures {
    entries: Vec<(String, NodeView)>,
}

impl ViewCaptures {
    pub fn get(&self, name: &str) -> Option<&NodeView> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn all(&self, name: &str) -> Vec<&NodeView> {
        self.entries
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeView)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

#[derive(Debug, Clone)]
enum Cursor {
    Start,
    Children { parent: SyntaxNode, boundary: usize },
    After(SyntaxNode),
    Offset(usize),
    Exhausted,
}

pub struct ExpansionContext<'s> {
    session: &'s mut Session,
    invocation: MacroInvocation,
    node: SyntaxNode,
    active: Span,
    cursor: Cursor,
    position: usize,
    placeholders: Vec<MarkerHandle>,
}

impl<'s> ExpansionContext<'s> {
    pub(crate) fn for_invocation(
        session: &'s mut Session,
        invocation: MacroInvocation,
        node: SyntaxNode,
    ) -> Self {
        let active = invocation.range;
        Self {
            session,
            position: active.end,
            invocation,
            node,
            active,
            cursor: Cursor::Start,
            placeholders: Vec::new(),
        }
    }

    pub(crate) fn for_task(session: &'s mut Session, origin: MacroInvocation, anchor: SyntaxNode) -> Self {
        let active = anchor.span();
        Self {
            session,
            position: active.start,
            invocation: origin,
            cursor: Cursor::Children {
                parent: anchor.clone(),
                boundary: 0,
            },
            node: anchor,
            active,
            placeholders: Vec::new(),
        }
    }

    // ========================================================================
    // READ ACCESS
    // ========================================================================

    pub fn invocation(&self) -> &MacroInvocation {
        &self.invocation
    }

    pub fn name(&self) -> &str {
        &self.invocation.name
    }

    /// The invocation node, or the anchor node inside a deferred task.
    pub fn node(&self) -> NodeView {
        self.view(self.node.clone())
    }

    pub fn argument_list(&self) -> Option<NodeView> {
        self.argument_list_node().map(|n| self.view(n))
    }

    /// Explicit arguments, comments excluded.
    pub fn arguments(&self) -> Vec<NodeView> {
        self.argument_list_node()
            .map(|args| {
                args.named_children()
                    .filter(|c| !c.is_comment())
                    .map(|c| self.view(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn argument_list_node(&self) -> Option<SyntaxNode> {
        if self.node.kind() != "macro_invocation" {
            return None;
        }
        self.node.child_by_field_name("arguments")
    }

    /// The expression statement consisting of nothing but this invocation.
    pub fn enclosing_statement(&self) -> Option<NodeView> {
        let parent = self.node.parent()?;
        let only = parent.kind() == "expression_statement"
            && parent.named_children().filter(|c| !c.is_comment()).count() == 1;
        only.then(|| self.view(parent))
    }

    pub fn source_text(&self) -> &str {
        self.session.doc.text()
    }

    pub fn path(&self) -> &str {
        self.session.doc.path()
    }

    pub fn config(&self) -> &UppConfig {
        &self.session.config
    }

    pub(crate) fn view(&self, node: SyntaxNode) -> NodeView {
        self.session.views.wrap(node)
    }

    /// Markers for sibling invocations swallowed by `consume()`.
    pub fn placeholders(&self) -> &[MarkerHandle] {
        &self.placeholders
    }

    // ========================================================================
    // EDITS
    // ========================================================================

    fn scope_of(&self, range: Span) -> (Scope, bool) {
        if self.active.covers(&range) {
            (Scope::Local, false)
        } else if range.strictly_contains(&self.active) {
            (Scope::Global, true)
        } else {
            (Scope::Global, false)
        }
    }

    fn guard_pending(&self, range: Span) -> Result<(), UppError> {
        let blocked = self
            .session
            .pending
            .iter()
            .find(|(id, span)| **id != self.invocation.node && span.strictly_contains(&range));
        match blocked {
            Some((_, span)) => Err(UppError::macro_failure(
                &self.session.source,
                &self.invocation.name,
                format!("edit at {} falls inside the unexpanded invocation at {}", range, span),
                range,
                Some(self.invocation.node),
            )),
            None => Ok(()),
        }
    }

    /// Replacing a pending invocation outright takes it out of the pass.
    fn claim_pending_exact(&mut self, range: Span) {
        let exact: Vec<_> = self
            .session
            .pending
            .iter()
            .filter(|(_, span)| **span == range)
            .map(|(id, _)| *id)
            .collect();
        for id in exact {
            self.session.pending.remove(&id);
            self.session.consumed.insert(id);
        }
    }

    /// Replaces `target` with `content`. Returns the placeholder token when
    /// the target encloses the invocation; embed it wherever the enclosing
    /// content should appear.
    pub fn replace(&mut self, target: impl IntoRange, content: impl Into<String>) -> Result<Option<String>, UppError> {
        let range = target.byte_range();
        self.guard_pending(range)?;
        self.claim_pending_exact(range);
        let (scope, outward) = self.scope_of(range);
        let token = self.session.ledger.replace(
            range,
            content,
            scope,
            Some(self.invocation.node),
            &self.session.source,
        )?;
        if outward {
            debug!("{}: outward edit of {} as {}", self.invocation, range, token);
        }
        Ok(outward.then_some(token))
    }

    pub fn insert(&mut self, offset: usize, text: &str) -> Result<(), UppError> {
        let range = Span::new(offset, offset);
        self.guard_pending(range)?;
        let (scope, _) = self.scope_of(range);
        self.session.ledger.insert(
            offset,
            text,
            scope,
            Some(self.invocation.node),
            &self.session.source,
        )?;
        Ok(())
    }

    pub fn insert_before(&mut self, target: impl IntoRange, text: &str) -> Result<(), UppError> {
        self.insert(target.byte_range().start, text)
    }

    pub fn insert_after(&mut self, target: impl IntoRange, text: &str) -> Result<(), UppError> {
        self.insert(target.byte_range().end, text)
    }

    /// Source of `target` with pending edits inside it shown as tokens.
    pub fn pending_text(&self, target: impl IntoRange) -> String {
        self.session
            .ledger
            .pending_text(target.byte_range(), self.session.doc.text())
    }

    // ========================================================================
    // CONSUMPTION
    // ========================================================================

    fn is_candidate(&self, node: &SyntaxNode) -> bool {
        node.is_named()
            && !node.is_comment()
            && node.id() != self.invocation.node
            && !self.session.consumed.contains(&node.id())
    }

    fn implicit_target(&self) -> Option<SyntaxNode> {
        if self.invocation.has_explicit_target || self.node.kind() != "macro_invocation" {
            return None;
        }
        let parent = self.node.parent()?;
        if LIST_KINDS.contains(&parent.kind()) {
            return None;
        }
        let others: Vec<SyntaxNode> = parent
            .named_children()
            .filter(|c| self.is_candidate(c))
            .collect();
        match others.as_slice() {
            [only] if only.start() >= self.node.end() => Some(only.clone()),
            _ => None,
        }
    }

    fn next_candidate(&mut self) -> Option<SyntaxNode> {
        loop {
            match self.cursor.clone() {
                Cursor::Start => {
                    if let Some(implicit) = self.implicit_target() {
                        self.cursor = Cursor::After(implicit.clone());
                        return Some(implicit);
                    }
                    self.cursor = match (self.argument_list_node(), self.node.parent()) {
                        (Some(args), _) => Cursor::Children {
                            parent: args,
                            boundary: 0,
                        },
                        // `@m;` continues after its statement
                        (None, Some(parent))
                            if parent.kind() == "expression_statement"
                                && parent.named_children().filter(|c| !c.is_comment()).count() == 1 =>
                        {
                            Cursor::After(parent)
                        }
                        (None, Some(_)) => Cursor::After(self.node.clone()),
                        (None, None) => Cursor::Offset(self.node.end()),
                    };
                }
                Cursor::Children { parent, boundary } => {
                    let found = parent
                        .children()
                        .enumerate()
                        .skip(boundary)
                        .find(|(_, c)| self.is_candidate(c));
                    return match found {
                        Some((i, child)) => {
                            self.cursor = Cursor::Children {
                                parent,
                                boundary: i + 1,
                            };
                            Some(child)
                        }
                        None => {
                            self.cursor = Cursor::Exhausted;
                            None
                        }
                    };
                }
                Cursor::After(node) => {
                    let mut next = node.next_named_sibling();
                    while let Some(candidate) = next {
                        if self.is_candidate(&candidate) {
                            self.cursor = Cursor::After(candidate.clone());
                            return Some(candidate);
                        }
                        next = candidate.next_named_sibling();
                    }
                    self.cursor = Cursor::Exhausted;
                    return None;
                }
                Cursor::Offset(pos) => {
                    let root = self.session.doc.root();
                    let found = root
                        .descendants()
                        .find(|n| n.start() >= pos && !n.is_same_node(&root) && self.is_candidate(n));
                    self.cursor = match &found {
                        Some(node) => Cursor::Offset(node.end().max(pos + 1)),
                        None => Cursor::Exhausted,
                    };
                    return found;
                }
                Cursor::Exhausted => return None,
            }
        }
    }

    /// True when `[from, to)` holds only whitespace, or whitespace and
    /// comments when comments are transparent.
    fn gap_is_blank(&self, from: usize, to: usize) -> bool {
        if from >= to {
            return true;
        }
        let text = self.session.doc.text();
        let Some(gap) = text.get(from..to) else {
            return false;
        };
        if gap.chars().all(char::is_whitespace) {
            return true;
        }
        if !self.session.config.transparent_comments {
            return false;
        }
        let mut rest = String::with_capacity(gap.len());
        let mut cursor = from;
        let comments = self
            .session
            .doc
            .root()
            .descendants()
            .filter(|n| n.is_comment() && n.start() >= from && n.end() <= to);
        for comment in comments {
            rest.push_str(&text[cursor..comment.start()]);
            cursor = comment.end();
        }
        rest.push_str(&text[cursor..to]);
        rest.chars().all(char::is_whitespace)
    }

    fn take(&mut self, node: &SyntaxNode) -> Result<NodeView, UppError> {
        let is_placeholder = node.kind() == "macro_invocation"
            && self.session.pending.contains_key(&node.id())
            && self.gap_is_blank(self.position, node.start());
        if is_placeholder {
            let handle = self.session.doc.create_marker(
                node.end(),
                MarkerPayload::ConsumedPlaceholder {
                    kind: node.kind().to_string(),
                },
            );
            self.placeholders.push(handle);
            debug!("{}: took pending {:?} as a placeholder", self.invocation, node);
        }
        self.replace(node, "")?;
        self.session.consumed.insert(node.id());
        self.position = node.end();
        Ok(self.view(node.clone()))
    }

    /// Claims the next relevant node, or `None` when nothing is left.
    pub fn consume(&mut self) -> Result<Option<NodeView>, UppError> {
        match self.next_candidate() {
            Some(node) => self.take(&node).map(Some),
            None => Ok(None),
        }
    }

    /// Claims the next node and requires it to be of `kind`.
    pub fn consume_kind(&mut self, kind: &str) -> Result<NodeView, UppError> {
        self.consume_matching(&[kind], |_| true)
    }

    /// Claims the next node, requiring one of `kinds` (any kind when empty)
    /// and acceptance by `validator`.
    pub fn consume_matching<F>(&mut self, kinds: &[&str], validator: F) -> Result<NodeView, UppError>
    where
        F: Fn(&NodeView) -> bool,
    {
        let Some(node) = self.next_candidate() else {
            let wanted = if kinds.is_empty() {
                "a node".to_string()
            } else {
                kinds.join(" or ")
            };
            return Err(UppError::consumption(
                &self.session.source,
                &self.invocation.name,
                format!("expected {} after the invocation, found nothing", wanted),
                self.invocation.range,
                Some(self.invocation.node),
            ));
        };
        if !kinds.is_empty() && !kinds.contains(&node.kind()) {
            return Err(UppError::consumption(
                &self.session.source,
                &self.invocation.name,
                format!("expected {}, found {}", kinds.join(" or "), node.kind()),
                node.span(),
                Some(node.id()),
            ));
        }
        if !validator(&self.view(node.clone())) {
            return Err(UppError::consumption(
                &self.session.source,
                &self.invocation.name,
                format!("{} was rejected by the macro's validator", node.kind()),
                node.span(),
                Some(node.id()),
            ));
        }
        self.take(&node)
    }

    // ========================================================================
    // SCHEDULING
    // ========================================================================

    fn schedule(&mut self, anchor: SyntaxNode, callback: super::TaskCallback) {
        let anchor_is_root = anchor.parent().is_none();
        self.session.tasks.push(DeferredTask {
            anchor: anchor.id(),
            anchor_span: anchor.span(),
            anchor_is_root,
            origin: self.invocation.clone(),
            callback,
        });
    }

    /// Runs `callback` once the pass has expanded every invocation, with the
    /// translation unit as its node.
    pub fn at_root<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut ExpansionContext<'_>) -> Result<(), UppError> + 'static,
    {
        let root = self.session.doc.root();
        self.schedule(root, Box::new(callback));
    }

    /// Like [`Self::at_root`], anchored at the nearest enclosing block.
    pub fn in_scope<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut ExpansionContext<'_>) -> Result<(), UppError> + 'static,
    {
        let anchor = self
            .node
            .ancestors()
            .find(|a| SCOPE_KINDS.contains(&a.kind()))
            .unwrap_or_else(|| self.session.doc.root());
        self.schedule(anchor, Box::new(callback));
    }

    /// Registers a whole-tree hook to run after expansion settles.
    pub fn register_transform<F>(&mut self, transform: F)
    where
        F: Fn(&mut ExpansionContext<'_>) -> Result<(), UppError> + 'static,
    {
        let transform: Transform = std::rc::Rc::new(transform);
        self.session.transforms.push(transform);
    }

    /// Returns true the first time `key` is seen in this run.
    pub fn once(&mut self, key: &str) -> bool {
        self.session.flags.insert(key.to_string())
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    pub fn query(&self, source: &str, node: &NodeView) -> Result<Vec<ViewCaptures>, UppError> {
        let query = Query::new(source).map_err(|e| UppError::pattern(source, e.to_string()))?;
        Ok(query
            .matches(node.node())
            .into_iter()
            .map(|m| ViewCaptures {
                entries: m
                    .captures
                    .into_iter()
                    .map(|c| (c.name, self.view(c.node)))
                    .collect(),
            })
            .collect())
    }

    /// Pre-order walk. Callback errors are logged and the walk goes on.
    pub fn walk<F>(&self, node: &NodeView, mut visit: F)
    where
        F: FnMut(&NodeView) -> Result<(), UppError>,
    {
        for descendant in node.node().descendants() {
            let view = self.view(descendant);
            if let Err(e) = visit(&view) {
                debug!("walk: skipping error at {:?}: {}", view, e);
            }
        }
    }

    pub fn match_pattern(
        &mut self,
        node: &NodeView,
        pattern: &str,
        deep: bool,
    ) -> Result<Option<CaptureSet>, UppError> {
        let compiled = self.session.patterns.compile(pattern)?;
        Ok(pattern::match_node(node.node(), &compiled, deep))
    }

    pub fn match_all(
        &mut self,
        node: &NodeView,
        pattern: &str,
        deep: bool,
    ) -> Result<Vec<CaptureSet>, UppError> {
        let compiled = self.session.patterns.compile(pattern)?;
        Ok(pattern::match_all(node.node(), &compiled, deep))
    }

    /// Lexical lookup of `name` from `node` outward: earlier declarations in
    /// enclosing blocks, then function parameters, then file scope.
    pub fn resolve_symbol(&self, name: &str, node: &NodeView) -> Option<NodeView> {
        let at = node.start();
        for scope in node.node().ancestors() {
            match scope.kind() {
                "compound_statement" | "translation_unit" => {
                    let found = scope
                        .named_children()
                        .filter(|c| c.end() <= at || scope.kind() == "translation_unit")
                        .filter(|c| {
                            matches!(
                                c.kind(),
                                "declaration" | "function_definition" | "type_definition"
                            )
                        })
                        .filter(|c| declared_names(c).iter().any(|n| n.text() == name))
                        .last();
                    if let Some(decl) = found {
                        return Some(self.view(decl));
                    }
                }
                "function_definition" => {
                    let params = scope
                        .descendants()
                        .find(|n| n.kind() == "parameter_list");
                    if let Some(params) = params {
                        let found = params
                            .named_children()
                            .filter(|p| p.kind() == "parameter_declaration")
                            .find(|p| declared_names(p).iter().any(|n| n.text() == name));
                        if let Some(param) = found {
                            return Some(self.view(param));
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }

    // ========================================================================
    // DIAGNOSTICS AND IDENTIFIERS
    // ========================================================================

    /// Builds the error that aborts this macro, attached to `node`.
    pub fn error(&self, node: &NodeView, message: impl Into<String>) -> UppError {
        UppError::macro_failure(
            &self.session.source,
            &self.invocation.name,
            message,
            node.span(),
            Some(node.id()),
        )
    }

    pub fn warn(&mut self, node: Option<&NodeView>, message: impl Into<String>) {
        let message = format!("@{}: {}", self.invocation.name, message.into());
        warn!("{}", message);
        self.session.diagnostics.warn(message, node.map(|n| n.span()));
    }

    /// A fresh identifier `<prefix>_<n>` not present anywhere in the text.
    pub fn create_unique_identifier(&mut self, prefix: &str) -> String {
        loop {
            let candidate = format!("{}_{}", prefix, self.session.doc.ids().next_id());
            if !self.session.doc.text().contains(&candidate) {
                return candidate;
            }
        }
    }

    // ========================================================================
    // MARKERS AND NESTING
    // ========================================================================

    pub fn create_marker(&mut self, offset: usize, label: &str) -> MarkerHandle {
        self.session
            .doc
            .create_marker(offset, MarkerPayload::Label(label.to_string()))
    }

    pub fn resolve_marker(
        &mut self,
        handle: MarkerHandle,
        kind: Option<&str>,
    ) -> Result<Option<NodeView>, UppError> {
        let node = self.session.doc.resolve_marker(handle, kind)?;
        Ok(node.map(|n| self.view(n)))
    }

    pub fn destroy_marker(&mut self, handle: MarkerHandle) -> bool {
        self.session.doc.destroy_marker(handle)
    }

    /// Fully expands `text` in a child document and returns the result.
    pub fn expand_nested(&mut self, text: &str) -> Result<String, UppError> {
        driver::expand_nested(self.session, text)
    }
}

/// Identifiers introduced by a declaration-like node, following declarator
/// fields through pointers, arrays, initializers and function declarators.
pub(crate) fn declared_names(node: &SyntaxNode) -> Vec<SyntaxNode> {
    fn innermost(declarator: SyntaxNode) -> Option<SyntaxNode> {
        let mut current = declarator;
        loop {
            if current.kind() == "identifier" {
                return Some(current);
            }
            current = current.child_by_field_name("declarator")?;
        }
    }

    node.children()
        .filter(|c| c.field_name() == Some("declarator"))
        .filter_map(innermost)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::config::UppConfig;
    use crate::errors::{ErrorCategory, UppError};
    use crate::macros::{Driver, ExpansionContext, MacroRegistry, NativeMacro};

    fn native<F>(f: F) -> NativeMacro
    where
        F: Fn(&mut ExpansionContext<'_>) -> Result<Option<String>, UppError> + 'static,
    {
        Rc::new(f)
    }

    fn run(registry: MacroRegistry, text: &str) -> Result<String, UppError> {
        Driver::new(registry, UppConfig::default())
            .expand("t.c", text)
            .map(|outcome| outcome.text)
    }

    #[test]
    fn consume_walks_siblings_once_each() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mut registry = MacroRegistry::new();
        registry.register_native(
            "take",
            native(move |ctx| {
                for _ in 0..4 {
                    let taken = ctx.consume()?.map(|n| n.text().to_string());
                    log.borrow_mut().push(taken);
                }
                Ok(Some(String::new()))
            }),
        );
        let text = run(registry, "void f(void) { @take a(); b(); c(); }").expect("expands");
        assert_eq!(
            *seen.borrow(),
            vec![
                Some("a();".to_string()),
                Some("b();".to_string()),
                Some("c();".to_string()),
                None
            ]
        );
        assert_eq!(text.split_whitespace().collect::<Vec<_>>(), ["void", "f(void)", "{", "}"]);
    }

    #[test]
    fn consume_kind_reports_the_offending_node() {
        let mut registry = MacroRegistry::new();
        registry.register_native(
            "loop_only",
            native(|ctx| {
                ctx.consume_kind("for_statement")?;
                Ok(None)
            }),
        );
        let err = run(registry, "void f(void) { @loop_only x = 1; }").expect_err("wrong kind");
        assert_eq!(err.category(), ErrorCategory::Consumption);
        assert!(err.to_string().contains("expression_statement"));
    }

    #[test]
    fn a_statement_macro_takes_the_following_statement() {
        let mut registry = MacroRegistry::new();
        registry.register_native(
            "twice",
            native(|ctx| {
                let body = ctx.consume_kind("expression_statement")?;
                Ok(Some(format!("{0} {0}", body.text())))
            }),
        );
        let text = run(registry, "void f(void) {\n  @twice;\n  tick();\n}\n").expect("expands");
        assert_eq!(text, "void f(void) {\n  tick(); tick();;\n  \n}\n");
    }

    #[test]
    fn pending_sibling_invocations_become_placeholders() {
        let count = Rc::new(RefCell::new(0));
        let placeholders = Rc::clone(&count);
        let mut registry = MacroRegistry::new();
        registry.register_native(
            "outer",
            native(move |ctx| {
                let taken = ctx.consume()?.map(|n| n.text().to_string()).unwrap_or_default();
                *placeholders.borrow_mut() = ctx.placeholders().len();
                Ok(Some(format!("wrapped({});", taken)))
            }),
        );
        registry.register_native("inner", native(|_| Ok(Some("1".to_string()))));
        let text = run(registry, "@outer @inner x;").expect("expands");
        assert_eq!(*count.borrow(), 1);
        assert_eq!(text, "wrapped(1);  x;");
    }

    #[test]
    fn outward_edits_hand_back_a_token() {
        let mut registry = MacroRegistry::new();
        registry.register_native(
            "wrap_stmt",
            native(|ctx| {
                let statement = ctx.enclosing_statement().expect("statement");
                let inner = ctx.pending_text(&statement);
                let token = ctx
                    .replace(&statement, format!("{{ {} }}", inner))?
                    .expect("outward");
                assert!(token.starts_with("__UPP_MARKER_"));
                Ok(Some("go()".to_string()))
            }),
        );
        let text = run(registry, "void f(void) { @wrap_stmt; }").expect("expands");
        assert_eq!(text, "void f(void) { { go(); } }");
    }

    #[test]
    fn edits_inside_a_pending_invocation_are_refused() {
        let mut registry = MacroRegistry::new();
        registry.register_native(
            "poke",
            native(|ctx| {
                let next = ctx
                    .node()
                    .next_named_sibling()
                    .expect("sibling invocation");
                let arg = next.named_child(1).expect("argument list");
                ctx.replace(&arg, "(0)")?;
                Ok(None)
            }),
        );
        registry.register_native("other", native(|_| Ok(None)));
        let err = run(registry, "@poke @other(1) x;").expect_err("guarded");
        assert!(err.to_string().contains("unexpanded invocation"));
    }
}
