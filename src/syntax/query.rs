//! Tree queries
//!
//! A small s-expression query language over [`SyntaxNode`] trees:
//!
//! - `(kind child...)` matches a named node of `kind` whose children contain
//!   the child patterns as an ordered subsequence; `(_)` matches any named node
//! - `"text"` matches an anonymous token with that text
//! - `_` matches any node
//! - `field: pattern` additionally requires the node to occupy that field
//! - `pattern @name` captures the matched node
//!
//! Comment nodes are skipped by child matching unless a pattern asks for
//! `(comment)` explicitly.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::{SyntaxNode, COMMENT_KIND};

#[derive(Parser)]
#[grammar = "syntax/query.pest"]
struct QueryParser;

/// Error produced when query source text cannot be compiled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid query at offset {offset}: {message}")]
pub struct QueryError {
    pub message: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Kind(String),
    AnyNamed,
    Anonymous(String),
    Any,
}

#[derive(Debug, Clone, PartialEq)]
struct QueryNode {
    field: Option<String>,
    test: NodeTest,
    children: Vec<QueryNode>,
    captures: Vec<String>,
}

/// A compiled query. Holds one or more top-level patterns.
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    patterns: Vec<QueryNode>,
}

#[derive(Debug, Clone)]
pub struct QueryCapture {
    pub name: String,
    pub node: SyntaxNode,
}

/// One successful match of one top-level pattern.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub pattern_index: usize,
    pub captures: Vec<QueryCapture>,
}

impl QueryMatch {
    /// First node captured under `name`.
    pub fn capture(&self, name: &str) -> Option<&SyntaxNode> {
        self.captures.iter().find(|c| c.name == name).map(|c| &c.node)
    }
}

impl Query {
    pub fn new(source: &str) -> Result<Query, QueryError> {
        let mut pairs = QueryParser::parse(Rule::query, source).map_err(|e| {
            let offset = match e.location {
                pest::error::InputLocation::Pos(p) => p,
                pest::error::InputLocation::Span((s, _)) => s,
            };
            QueryError {
                message: e.variant.message().into_owned(),
                offset,
            }
        })?;
        let query = pairs.next().ok_or_else(|| QueryError {
            message: "empty query".to_string(),
            offset: 0,
        })?;
        let patterns = query
            .into_inner()
            .filter(|p| p.as_rule() == Rule::pattern)
            .map(build_pattern)
            .collect();
        Ok(Query {
            source: source.to_string(),
            patterns,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// All matches under `root` (inclusive), in document pre-order. For one
    /// node, patterns are tried in declaration order.
    pub fn matches(&self, root: &SyntaxNode) -> Vec<QueryMatch> {
        let mut out = Vec::new();
        for node in root.descendants() {
            for (pattern_index, pattern) in self.patterns.iter().enumerate() {
                let mut captures = Vec::new();
                if match_node(pattern, &node, &mut captures) {
                    out.push(QueryMatch {
                        pattern_index,
                        captures,
                    });
                }
            }
        }
        out
    }

    /// Every node captured under `name`, in match order.
    pub fn captures(&self, root: &SyntaxNode, name: &str) -> Vec<SyntaxNode> {
        self.matches(root)
            .into_iter()
            .flat_map(|m| m.captures.into_iter())
            .filter(|c| c.name == name)
            .map(|c| c.node)
            .collect()
    }
}

// ============================================================================
// COMPILATION
// ============================================================================

fn build_pattern(pair: Pair<Rule>) -> QueryNode {
    let mut node = QueryNode {
        field: None,
        test: NodeTest::Any,
        children: Vec::new(),
        captures: Vec::new(),
    };
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::field_prefix => {
                node.field = part.into_inner().next().map(|n| n.as_str().to_string());
            }
            Rule::node_pattern => {
                let mut inner = part.into_inner();
                let kind = inner.next().map(|n| n.as_str()).unwrap_or("_");
                node.test = if kind == "_" {
                    NodeTest::AnyNamed
                } else {
                    NodeTest::Kind(kind.to_string())
                };
                node.children = inner.filter(|p| p.as_rule() == Rule::pattern).map(build_pattern).collect();
            }
            Rule::anon_pattern => {
                let text = part.into_inner().next().map(|t| t.as_str()).unwrap_or("");
                node.test = NodeTest::Anonymous(text.to_string());
            }
            Rule::any_pattern => node.test = NodeTest::Any,
            Rule::capture => {
                if let Some(name) = part.into_inner().next() {
                    node.captures.push(name.as_str().to_string());
                }
            }
            _ => {}
        }
    }
    node
}

// ============================================================================
// MATCHING
// ============================================================================

fn test_node(test: &NodeTest, node: &SyntaxNode) -> bool {
    match test {
        NodeTest::Kind(kind) => node.is_named() && node.kind() == kind,
        NodeTest::AnyNamed => node.is_named(),
        NodeTest::Anonymous(text) => !node.is_named() && node.kind() == text,
        NodeTest::Any => true,
    }
}

fn match_node(pattern: &QueryNode, node: &SyntaxNode, captures: &mut Vec<QueryCapture>) -> bool {
    if !test_node(&pattern.test, node) {
        return false;
    }
    if let Some(field) = &pattern.field {
        if node.field_name() != Some(field.as_str()) {
            return false;
        }
    }
    let mark = captures.len();
    let wants_comments = pattern
        .children
        .iter()
        .any(|c| c.test == NodeTest::Kind(COMMENT_KIND.to_string()));
    let children: Vec<SyntaxNode> = node
        .children()
        .filter(|c| wants_comments || !c.is_comment())
        .collect();
    if !match_children(&pattern.children, &children, captures) {
        captures.truncate(mark);
        return false;
    }
    for name in &pattern.captures {
        captures.push(QueryCapture {
            name: name.clone(),
            node: node.clone(),
        });
    }
    true
}

/// Ordered-subsequence match with backtracking.
fn match_children(patterns: &[QueryNode], nodes: &[SyntaxNode], captures: &mut Vec<QueryCapture>) -> bool {
    let Some((first, rest)) = patterns.split_first() else {
        return true;
    };
    for (i, node) in nodes.iter().enumerate() {
        let mark = captures.len();
        if match_node(first, node, captures) && match_children(rest, &nodes[i + 1..], captures) {
            return true;
        }
        captures.truncate(mark);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    #[test]
    fn finds_invocations_in_document_order() {
        let tree = parse("@a(1); int x; @b;");
        let query = Query::new("(macro_invocation name: (identifier) @name) @inv").expect("query");
        let names: Vec<String> = query
            .captures(&tree.root_node(), "name")
            .iter()
            .map(|n| n.text().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn children_match_as_ordered_subsequence() {
        let tree = parse("f(a, b);");
        let root = tree.root_node();
        let ok = Query::new("(argument_list \"(\" (identifier) @x \")\")").expect("query");
        let caps = ok.captures(&root, "x");
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].text(), "a");

        let reversed = Query::new("(argument_list \")\" \"(\")").expect("query");
        assert!(reversed.matches(&root).is_empty());
    }

    #[test]
    fn field_constraints_are_checked() {
        let tree = parse("x = y;");
        let query = Query::new("(assignment_expression right: (identifier) @r)").expect("query");
        let caps = query.captures(&tree.root_node(), "r");
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].text(), "y");
    }

    #[test]
    fn malformed_query_is_rejected() {
        assert!(Query::new("(identifier").is_err());
    }
}
