//! Expansion driver
//!
//! A run repeats passes until the tree holds no expandable invocation:
//!
//! 1. reparse and discover invocations in document order
//! 2. expand each one outermost-first, deferring invocations that sit inside
//!    a range an earlier macro already claimed
//! 3. run deferred tasks, innermost anchors first and root tasks last
//! 4. commit the ledger
//!
//! Transforms registered along the way run once after the last pass.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, info, warn};

use super::context::ExpansionContext;
use super::registry::MacroRegistry;
use super::{DeferredTask, Ledger, MacroInvocation, Transform};
use crate::access::ViewCache;
use crate::config::UppConfig;
use crate::diagnostics::Diagnostics;
use crate::errors::{SourceContext, UppError};
use crate::pattern::PatternCompiler;
use crate::syntax::{NodeId, Query, Span, SyntaxNode};
use crate::tracker::{Document, MarkerPayload};

const INVOCATION_QUERY: &str = "(macro_invocation name: (identifier) @name) @invocation";

/// How deep `expand_nested` may recurse.
pub const MAX_NESTING: usize = 32;

// ============================================================================
// PUBLIC SURFACE
// ============================================================================

/// Text after one committed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    pub number: usize,
    pub expanded: usize,
    pub text: String,
}

#[derive(Debug)]
pub struct ExpansionOutcome {
    pub text: String,
    pub passes: Vec<PassRecord>,
    pub diagnostics: Diagnostics,
    /// Invocations run across all passes, failed ones included.
    pub expanded: usize,
}

pub struct Driver {
    registry: Rc<MacroRegistry>,
    config: Rc<UppConfig>,
    transforms: Vec<Transform>,
}

impl Driver {
    pub fn new(registry: MacroRegistry, config: UppConfig) -> Self {
        Self {
            registry: Rc::new(registry),
            config: Rc::new(config),
            transforms: Vec::new(),
        }
    }

    /// Standard macros plus every pattern macro listed in `config`.
    pub fn with_std(config: UppConfig) -> Result<Self, UppError> {
        let mut registry = MacroRegistry::with_std();
        for spec in &config.macros {
            registry.register_spec(spec)?;
        }
        Ok(Self::new(registry, config))
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    pub fn config(&self) -> &UppConfig {
        &self.config
    }

    pub fn register_transform<F>(&mut self, transform: F)
    where
        F: Fn(&mut ExpansionContext<'_>) -> Result<(), UppError> + 'static,
    {
        self.transforms.push(Rc::new(transform));
    }

    pub fn expand(&self, path: &str, text: &str) -> Result<ExpansionOutcome, UppError> {
        self.expand_document(Document::new(path, text))
    }

    pub fn expand_file(&self, path: &str) -> Result<ExpansionOutcome, UppError> {
        let text = std::fs::read_to_string(path).map_err(|e| UppError::io(path, e))?;
        self.expand(path, &text)
    }

    pub fn expand_document(&self, doc: Document) -> Result<ExpansionOutcome, UppError> {
        let mut session = Session::new(
            doc,
            Rc::clone(&self.registry),
            Rc::clone(&self.config),
            self.transforms.clone(),
            0,
        );
        let (expanded, passes) = run(&mut session)?;
        Ok(ExpansionOutcome {
            text: session.doc.text().to_string(),
            passes,
            diagnostics: session.diagnostics,
            expanded,
        })
    }
}

// ============================================================================
// SESSION STATE
// ============================================================================

/// Everything one run mutates. Contexts borrow it for the length of a macro.
pub(crate) struct Session {
    pub(crate) doc: Document,
    pub(crate) source: SourceContext,
    pub(crate) ledger: Ledger,
    pub(crate) registry: Rc<MacroRegistry>,
    pub(crate) config: Rc<UppConfig>,
    pub(crate) views: Rc<ViewCache>,
    pub(crate) patterns: PatternCompiler,
    pub(crate) consumed: HashSet<NodeId>,
    pub(crate) pending: HashMap<NodeId, Span>,
    pub(crate) tasks: Vec<DeferredTask>,
    pub(crate) transforms: Vec<Transform>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) flags: HashSet<String>,
    depth: usize,
}

struct Checkpoint {
    ledger: Ledger,
    consumed: HashSet<NodeId>,
    pending: HashMap<NodeId, Span>,
    tasks: usize,
    flags: HashSet<String>,
}

impl Session {
    pub(crate) fn new(
        doc: Document,
        registry: Rc<MacroRegistry>,
        config: Rc<UppConfig>,
        transforms: Vec<Transform>,
        depth: usize,
    ) -> Self {
        let views = ViewCache::new(config.advise_upward_navigation);
        Self {
            source: doc.source_context(),
            ledger: Ledger::new(doc.ids().clone()),
            doc,
            registry,
            config,
            views,
            patterns: PatternCompiler::new(),
            consumed: HashSet::new(),
            pending: HashMap::new(),
            tasks: Vec::new(),
            transforms,
            diagnostics: Diagnostics::new(),
            flags: HashSet::new(),
            depth,
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            ledger: self.ledger.clone(),
            consumed: self.consumed.clone(),
            pending: self.pending.clone(),
            tasks: self.tasks.len(),
            flags: self.flags.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.ledger = checkpoint.ledger;
        self.consumed = checkpoint.consumed;
        self.pending = checkpoint.pending;
        self.tasks.truncate(checkpoint.tasks);
        self.flags = checkpoint.flags;
    }

    /// Fatal mode propagates `err`. Otherwise the macro's edits are rolled
    /// back, the error is recorded, and the invocation is poisoned so later
    /// passes leave it alone.
    fn fail(
        &mut self,
        checkpoint: Checkpoint,
        invocation: Option<&MacroInvocation>,
        err: UppError,
    ) -> Result<(), UppError> {
        if self.config.fatal_errors {
            return Err(err);
        }
        self.restore(checkpoint);
        warn!("{}", err);
        self.diagnostics.record(&err);
        if let Some(invocation) = invocation {
            self.doc.create_marker(
                invocation.range.start,
                MarkerPayload::Invocation {
                    name: invocation.name.clone(),
                },
            );
        }
        Ok(())
    }

    fn drain_advisories(&mut self) {
        for advisory in self.views.take_advisories() {
            self.diagnostics.warn(advisory, None);
        }
    }

    fn refresh(&mut self) {
        self.doc.reparse();
        self.source = self.doc.source_context();
        self.views.retain_tree(self.doc.tree().id());
    }
}

// ============================================================================
// PASS LOOP
// ============================================================================

pub(crate) fn run(session: &mut Session) -> Result<(usize, Vec<PassRecord>), UppError> {
    let query = Query::new(INVOCATION_QUERY).map_err(|e| UppError::internal(e.to_string()))?;
    let mut warned = HashSet::new();
    let mut passes: Vec<PassRecord> = Vec::new();
    let mut total = 0;

    loop {
        session.refresh();
        if let Some(failure) = session.doc.tree().error() {
            return Err(UppError::parse(&session.source, failure.message.clone(), failure.span));
        }

        let invocations = discover(session, &query, &mut warned);
        if invocations.is_empty() {
            break;
        }
        if passes.len() >= session.config.max_passes {
            return Err(UppError::PassLimit {
                passes: passes.len(),
            });
        }

        let number = passes.len() + 1;
        debug!("pass {}: {} invocation(s) found", number, invocations.len());
        let expanded = run_pass(session, invocations)?;
        run_tasks(session)?;
        session.drain_advisories();
        let edits = session.ledger.commit(&mut session.doc)?;
        info!("pass {}: expanded {} invocation(s), {} edit(s)", number, expanded, edits);

        total += expanded;
        passes.push(PassRecord {
            number,
            expanded,
            text: session.doc.text().to_string(),
        });
    }

    if !session.transforms.is_empty() {
        run_transforms(session)?;
    }
    Ok((total, passes))
}

fn discover(
    session: &mut Session,
    query: &Query,
    warned: &mut HashSet<String>,
) -> Vec<(MacroInvocation, SyntaxNode)> {
    let tree_id = session.doc.tree().id();
    let poisoned: Vec<(usize, String)> = session
        .doc
        .markers()
        .iter()
        .filter(|(_, m)| m.valid && m.tree == tree_id)
        .filter_map(|(_, m)| match &m.payload {
            MarkerPayload::Invocation { name } => Some((m.offset, name.clone())),
            _ => None,
        })
        .collect();

    let root = session.doc.root();
    let mut found = Vec::new();
    for m in query.matches(&root) {
        let (Some(node), Some(name)) = (m.capture("invocation"), m.capture("name")) else {
            continue;
        };
        let name = name.text().to_string();
        if poisoned.iter().any(|(offset, n)| *offset == node.start() && *n == name) {
            continue;
        }
        if !session.registry.contains(&name) {
            if warned.insert(name.clone()) {
                warn!("unknown macro @{} left in place", name);
                session
                    .diagnostics
                    .warn(format!("unknown macro @{}", name), Some(node.span()));
            }
            continue;
        }
        let invocation = MacroInvocation {
            name,
            range: node.span(),
            node: node.id(),
            has_explicit_target: node.child_by_field_name("arguments").is_some(),
        };
        found.push((invocation, node.clone()));
    }
    found
}

fn run_pass(
    session: &mut Session,
    invocations: Vec<(MacroInvocation, SyntaxNode)>,
) -> Result<usize, UppError> {
    session.consumed.clear();
    session.pending = invocations
        .iter()
        .map(|(inv, _)| (inv.node, inv.range))
        .collect();

    let mut expanded = 0;
    for (invocation, node) in invocations {
        if session.consumed.contains(&invocation.node) {
            debug!("{} was consumed", invocation);
            continue;
        }
        if session.ledger.claimed(invocation.range) {
            debug!("{} deferred to the next pass", invocation);
            continue;
        }
        session.pending.remove(&invocation.node);

        let Some(def) = session.registry.get(&invocation.name).cloned() else {
            continue;
        };
        let checkpoint = session.checkpoint();
        let token = session
            .ledger
            .reserve(invocation.range, Some(invocation.node), &session.source)?;

        let result = {
            let mut ctx = ExpansionContext::for_invocation(session, invocation.clone(), node);
            def.expand(&mut ctx)
        };
        match result {
            Ok(output) => session.ledger.fill(&token, output)?,
            Err(err) => session.fail(checkpoint, Some(&invocation), err)?,
        }
        expanded += 1;
    }
    session.pending.clear();
    Ok(expanded)
}

/// Runs deferred tasks until none are left. Tasks added while running are
/// picked up in the next round.
fn run_tasks(session: &mut Session) -> Result<(), UppError> {
    loop {
        let mut tasks = std::mem::take(&mut session.tasks);
        if tasks.is_empty() {
            return Ok(());
        }
        tasks.sort_by_key(|t| (t.anchor_is_root, t.anchor_span.end, Reverse(t.anchor_span.start)));

        for task in tasks {
            let anchor = session.doc.tree().node(task.anchor).ok_or_else(|| {
                UppError::internal(format!("anchor of task for {} is gone", task.origin))
            })?;
            let checkpoint = session.checkpoint();
            let origin = task.origin.clone();
            let result = {
                let mut ctx = ExpansionContext::for_task(session, task.origin, anchor);
                (task.callback)(&mut ctx)
            };
            if let Err(err) = result {
                session.fail(checkpoint, None, err)?;
                debug!("deferred task of {} rolled back", origin);
            }
        }
    }
}

fn run_transforms(session: &mut Session) -> Result<(), UppError> {
    let transforms = session.transforms.clone();
    for transform in transforms {
        session.refresh();
        let root = session.doc.root();
        let origin = MacroInvocation {
            name: "<transform>".to_string(),
            range: root.span(),
            node: root.id(),
            has_explicit_target: false,
        };
        let checkpoint = session.checkpoint();
        let result = {
            let mut ctx = ExpansionContext::for_task(session, origin, root);
            transform(&mut ctx)
        };
        if let Err(err) = result {
            session.fail(checkpoint, None, err)?;
        }
        run_tasks(session)?;
        session.drain_advisories();
        session.ledger.commit(&mut session.doc)?;
    }
    session.refresh();
    Ok(())
}

/// Expands `text` in a child document that shares the parent's id space.
pub(crate) fn expand_nested(session: &mut Session, text: &str) -> Result<String, UppError> {
    if session.depth >= MAX_NESTING {
        return Err(UppError::internal(format!(
            "nested expansion deeper than {} levels",
            MAX_NESTING
        )));
    }
    let doc = session.doc.nested(text);
    let mut child = Session::new(
        doc,
        Rc::clone(&session.registry),
        Rc::clone(&session.config),
        Vec::new(),
        session.depth + 1,
    );
    run(&mut child)?;
    let result = child.doc.text().to_string();
    session.diagnostics.extend(child.diagnostics);
    Ok(result)
}
