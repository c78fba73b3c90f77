//! Replacement ledger
//!
//! Every edit a macro asks for lands here first. Entries are keyed by byte
//! range of the current text and each one owns a placeholder token
//! `__UPP_MARKER_<n>__`. At the end of a pass [`Ledger::commit`] resolves the
//! tokens, drops entries swallowed by an enclosing entry, and splices the rest
//! into the document in descending offset order.

use std::collections::HashSet;

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{SourceContext, UppError};
use crate::syntax::{NodeId, Span};
use crate::tracker::{Document, IdGenerator};

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__UPP_MARKER_(\d+)__").expect("token regex is valid"));

/// Renders the placeholder token for entry id `n`.
pub fn token_for(n: u64) -> String {
    format!("__UPP_MARKER_{}__", n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Inside the invocation currently being expanded.
    Local,
    /// Anywhere else in the document.
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub range: Span,
    /// `None` marks a reservation whose content is not known yet.
    pub content: Option<String>,
    pub scope: Scope,
    pub owner: Option<NodeId>,
    pub seq: u64,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    entries: Vec<Replacement>,
    ids: IdGenerator,
    seq: u64,
}

impl Ledger {
    pub fn new(ids: IdGenerator) -> Self {
        Self {
            entries: Vec::new(),
            ids,
            seq: 0,
        }
    }

    pub fn entries(&self) -> &[Replacement] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_conflicts(&self, range: Span, source: &SourceContext) -> Result<(), UppError> {
        match self.entries.iter().find(|e| e.range.partially_overlaps(&range)) {
            Some(existing) => Err(UppError::conflict(source, existing.range, range)),
            None => Ok(()),
        }
    }

    fn push(
        &mut self,
        range: Span,
        content: Option<String>,
        scope: Scope,
        owner: Option<NodeId>,
    ) -> String {
        let token = token_for(self.ids.next_id());
        self.seq += 1;
        trace!("ledger: {} {} {:?}", token, range, content);
        self.entries.push(Replacement {
            range,
            content,
            scope,
            owner,
            seq: self.seq,
            token: token.clone(),
        });
        token
    }

    /// Reserves `range` for content supplied later through [`Ledger::fill`].
    pub fn reserve(
        &mut self,
        range: Span,
        owner: Option<NodeId>,
        source: &SourceContext,
    ) -> Result<String, UppError> {
        self.check_conflicts(range, source)?;
        if let Some(existing) = self.entries.iter().find(|e| e.range == range) {
            return Ok(existing.token.clone());
        }
        Ok(self.push(range, None, Scope::Global, owner))
    }

    /// Records a replacement of `range`. An entry for the identical range is
    /// overwritten in place and keeps its token.
    pub fn replace(
        &mut self,
        range: Span,
        content: impl Into<String>,
        scope: Scope,
        owner: Option<NodeId>,
        source: &SourceContext,
    ) -> Result<String, UppError> {
        self.check_conflicts(range, source)?;
        let content = content.into();
        self.seq += 1;
        let seq = self.seq;
        if let Some(existing) = self.entries.iter_mut().find(|e| e.range == range) {
            existing.content = Some(content);
            existing.scope = scope;
            existing.owner = owner;
            existing.seq = seq;
            return Ok(existing.token.clone());
        }
        Ok(self.push(range, Some(content), scope, owner))
    }

    /// Inserts `text` at `offset`. Insertions at the same offset are
    /// concatenated in registration order.
    pub fn insert(
        &mut self,
        offset: usize,
        text: &str,
        scope: Scope,
        owner: Option<NodeId>,
        source: &SourceContext,
    ) -> Result<String, UppError> {
        let range = Span::new(offset, offset);
        self.check_conflicts(range, source)?;
        if let Some(existing) = self.entries.iter_mut().find(|e| e.range == range) {
            existing.content.get_or_insert_with(String::new).push_str(text);
            return Ok(existing.token.clone());
        }
        Ok(self.push(range, Some(text.to_string()), scope, owner))
    }

    /// Supplies the content of a reservation. `None` keeps content already
    /// written to the range and otherwise deletes it.
    pub fn fill(&mut self, token: &str, content: Option<String>) -> Result<(), UppError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.token == token)
            .ok_or_else(|| UppError::internal(format!("no ledger entry for {}", token)))?;
        match content {
            Some(text) => entry.content = Some(text),
            None => {
                entry.content.get_or_insert_with(String::new);
            }
        }
        Ok(())
    }

    /// True when `range` lies strictly inside an entry's range.
    pub fn claimed(&self, range: Span) -> bool {
        self.entries.iter().any(|e| e.range.strictly_contains(&range))
    }

    pub fn entry(&self, token: &str) -> Option<&Replacement> {
        self.entries.iter().find(|e| e.token == token)
    }

    /// Text of `range` with every pending entry inside it shown as its token.
    /// A pending entry for exactly `range` is returned as its token.
    pub fn pending_text(&self, range: Span, text: &str) -> String {
        if let Some(exact) = self.entries.iter().find(|e| e.range == range) {
            return exact.token.clone();
        }
        let inner: Vec<&Replacement> = self
            .entries
            .iter()
            .filter(|e| range.strictly_contains(&e.range))
            .collect();
        let mut outermost: Vec<&Replacement> = inner
            .iter()
            .copied()
            .filter(|e| !inner.iter().any(|o| o.range.strictly_contains(&e.range)))
            .collect();
        outermost.sort_by(|a, b| {
            (b.range.start, b.range.end, b.seq).cmp(&(a.range.start, a.range.end, a.seq))
        });

        let mut out = text[range.start..range.end].to_string();
        for entry in outermost {
            let start = entry.range.start - range.start;
            let end = entry.range.end - range.start;
            out.replace_range(start..end, &entry.token);
        }
        out
    }

    fn resolve(&self, token: &str, visiting: &mut Vec<String>, used: &mut HashSet<String>) -> Result<String, UppError> {
        if visiting.iter().any(|t| t == token) {
            return Err(UppError::internal(format!(
                "placeholder cycle: {} -> {}",
                visiting.join(" -> "),
                token
            )));
        }
        let Some(entry) = self.entry(token) else {
            return Ok(token.to_string());
        };
        used.insert(token.to_string());
        let content = entry.content.clone().unwrap_or_default();
        visiting.push(token.to_string());

        let mut out = String::with_capacity(content.len());
        let mut last = 0;
        for m in TOKEN.find_iter(&content) {
            out.push_str(&content[last..m.start()]);
            out.push_str(&self.resolve(m.as_str(), visiting, used)?);
            last = m.end();
        }
        out.push_str(&content[last..]);

        visiting.pop();
        Ok(out)
    }

    /// Applies every pending entry to `doc` and empties the ledger. Returns
    /// the number of splices performed.
    pub fn commit(&mut self, doc: &mut Document) -> Result<usize, UppError> {
        let entries = std::mem::take(&mut self.entries);
        let ledger = Ledger {
            entries,
            ids: self.ids.clone(),
            seq: self.seq,
        };

        let mut top: Vec<&Replacement> = ledger
            .entries
            .iter()
            .filter(|e| !ledger.entries.iter().any(|o| o.range.strictly_contains(&e.range)))
            .collect();
        top.sort_by(|a, b| {
            (b.range.start, b.range.end, b.seq).cmp(&(a.range.start, a.range.end, a.seq))
        });

        let mut used = HashSet::new();
        let mut resolved = Vec::with_capacity(top.len());
        for entry in &top {
            let text = ledger.resolve(&entry.token, &mut Vec::new(), &mut used)?;
            resolved.push((entry.range, text));
        }

        for entry in &ledger.entries {
            if !used.contains(&entry.token) {
                debug!(
                    "dropping replacement {} at {} swallowed by an enclosing edit",
                    entry.token, entry.range
                );
            }
        }

        for (range, text) in &resolved {
            doc.splice(range.start, range.len(), text);
        }
        Ok(resolved.len())
    }
}
