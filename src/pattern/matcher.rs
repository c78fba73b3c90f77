//! Structural matcher
//!
//! Matches a compiled [`Pattern`] against a subtree. Child sequences are
//! matched with explicit recursive backtracking; variadic wildcards try split
//! points shortest-first and accept the first split after which the rest of
//! the pattern still matches.

use log::trace;

use super::{Capture, CaptureSet, Cardinality, Pattern, PatternNode, Wildcard, MATCH_KEY};
use crate::syntax::{NodeId, Span, SyntaxNode};

/// Kinds that match each other although the grammar tells them apart.
const EQUIVALENT_KINDS: &[(&str, &str)] = &[("parameter_declaration", "declaration")];

/// Matches `pattern` at `target`, or with `deep` at the first node of a
/// pre-order walk of `target`'s subtree where it matches.
pub fn match_node(target: &SyntaxNode, pattern: &Pattern, deep: bool) -> Option<CaptureSet> {
    if !deep {
        return match_at(target, pattern);
    }
    target.descendants().find_map(|node| match_at(&node, pattern))
}

/// Like [`match_node`], but returns every match. With `deep`, matching
/// continues below nodes that already matched.
pub fn match_all(target: &SyntaxNode, pattern: &Pattern, deep: bool) -> Vec<CaptureSet> {
    if !deep {
        return match_at(target, pattern).into_iter().collect();
    }
    target
        .descendants()
        .filter_map(|node| match_at(&node, pattern))
        .collect()
}

fn match_at(target: &SyntaxNode, pattern: &Pattern) -> Option<CaptureSet> {
    let mut captures = CaptureSet::new();
    let mut guard = Vec::new();
    if structural_match(target, pattern.root(), &mut captures, &mut guard) {
        trace!("pattern {:?} matched {:?}", pattern.source(), target);
        captures.insert(MATCH_KEY, Capture::Node(target.clone()));
        Some(captures)
    } else {
        None
    }
}

fn kinds_match(pattern: &str, target: &str) -> bool {
    pattern == target
        || EQUIVALENT_KINDS
            .iter()
            .any(|&(a, b)| (a == pattern && b == target) || (b == pattern && a == target))
}

fn significant_children(node: &SyntaxNode) -> Vec<SyntaxNode> {
    node.children().filter(|c| !c.is_comment()).collect()
}

fn structural_match(
    target: &SyntaxNode,
    pattern: &PatternNode,
    captures: &mut CaptureSet,
    guard: &mut Vec<NodeId>,
) -> bool {
    if target.is_error() || guard.contains(&target.id()) {
        return false;
    }

    match pattern {
        PatternNode::Wildcard(wildcard) => bind_node(wildcard, target, captures),
        PatternNode::Literal {
            kind,
            named,
            text,
            children,
        } => {
            if *named != target.is_named() || !kinds_match(kind, target.kind()) {
                return false;
            }
            let mut targets = significant_children(target);
            let mut children = children.as_slice();
            if kind != target.kind() {
                // A declaration and a parameter differ only by the `;`.
                if let Some((PatternNode::Literal { kind: last, .. }, rest)) = children.split_last() {
                    if last == ";" {
                        children = rest;
                    }
                }
                if targets.last().is_some_and(|t| t.kind() == ";") {
                    targets.pop();
                }
            }
            if children.is_empty() && targets.is_empty() {
                return target.text() == text;
            }
            guard.push(target.id());
            let ok = match_sequence(children, &targets, captures, guard);
            guard.pop();
            ok
        }
    }
}

fn bind_node(wildcard: &Wildcard, target: &SyntaxNode, captures: &mut CaptureSet) -> bool {
    if !wildcard.accepts(target.kind()) {
        return false;
    }
    if let Some(existing) = captures.text(&wildcard.name) {
        return existing == target.text();
    }
    captures.insert(wildcard.name.clone(), Capture::Node(target.clone()));
    true
}

fn bind_sequence(wildcard: &Wildcard, slice: &[SyntaxNode], captures: &mut CaptureSet) -> bool {
    let span = match (slice.first(), slice.last()) {
        (Some(first), Some(last)) => Some(Span::new(first.start(), last.end())),
        _ => None,
    };
    let text = match (span, slice.first()) {
        (Some(span), Some(first)) => first.tree().source()[span.start..span.end].to_string(),
        _ => String::new(),
    };
    if let Some(existing) = captures.text(&wildcard.name) {
        return existing == text;
    }
    let nodes = slice.iter().filter(|n| n.is_named()).cloned().collect();
    captures.insert(
        wildcard.name.clone(),
        Capture::Sequence { nodes, span, text },
    );
    true
}

/// Matches `patterns` against `targets`; both must be used up exactly.
fn match_sequence(
    patterns: &[PatternNode],
    targets: &[SyntaxNode],
    captures: &mut CaptureSet,
    guard: &mut Vec<NodeId>,
) -> bool {
    let Some((first, rest)) = patterns.split_first() else {
        return targets.is_empty();
    };

    match first {
        PatternNode::Wildcard(wildcard) if wildcard.cardinality.is_variadic() => {
            let min = if wildcard.cardinality == Cardinality::VariadicPlus {
                1
            } else {
                0
            };
            for take in min..=targets.len() {
                let slice = &targets[..take];
                if wildcard.cardinality == Cardinality::VariadicPlus
                    && !slice.iter().any(|n| n.is_named())
                {
                    continue;
                }
                if !slice
                    .iter()
                    .filter(|n| n.is_named())
                    .all(|n| wildcard.accepts(n.kind()))
                {
                    continue;
                }
                let snapshot = captures.clone();
                if bind_sequence(wildcard, slice, captures)
                    && match_sequence(rest, &targets[take..], captures, guard)
                {
                    return true;
                }
                *captures = snapshot;
            }
            false
        }
        PatternNode::Wildcard(wildcard) if wildcard.cardinality == Cardinality::Optional => {
            if let Some((head, tail)) = targets.split_first() {
                let snapshot = captures.clone();
                if bind_node(wildcard, head, captures) && match_sequence(rest, tail, captures, guard) {
                    return true;
                }
                *captures = snapshot;
            }
            match_sequence(rest, targets, captures, guard)
        }
        other => {
            let Some((head, tail)) = targets.split_first() else {
                return false;
            };
            let snapshot = captures.clone();
            if structural_match(head, other, captures, guard)
                && match_sequence(rest, tail, captures, guard)
            {
                return true;
            }
            *captures = snapshot;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::compile;
    use crate::syntax::parse;

    fn first_statement(text: &str) -> SyntaxNode {
        let tree = parse(text);
        tree.root_node().named_child(0).expect("statement")
    }

    #[test]
    fn repeated_names_require_equal_text() {
        let pattern = compile("$x = $x;").expect("compiles");
        assert!(match_node(&first_statement("a = a;"), &pattern, false).is_some());
        assert!(match_node(&first_statement("a = b;"), &pattern, false).is_none());
    }

    #[test]
    fn until_takes_the_shortest_successful_split() {
        let pattern = compile("f($args__until, $last)").expect("compiles");
        let caps = match_node(&first_statement("f(1,2,3);"), &pattern, true).expect("match");
        let args: Vec<String> = caps
            .sequence("args")
            .expect("args")
            .iter()
            .map(|n| n.text().to_string())
            .collect();
        assert_eq!(args, vec!["1", "2"]);
        assert_eq!(caps.text("last"), Some("3"));
        assert_eq!(caps.matched().map(|n| n.kind().to_string()), Some("call_expression".into()));
    }

    #[test]
    fn declarations_and_parameters_match_each_other() {
        let tree = parse("void f(int a) {}");
        let parameter = tree
            .root_node()
            .descendants()
            .find(|n| n.kind() == "parameter_declaration")
            .expect("parameter");
        let declaration = compile("int $x;").expect("compiles");
        let caps = match_node(&parameter, &declaration, false).expect("declaration matches parameter");
        assert_eq!(caps.text("x"), Some("a"));

        let lone = compile("int $x").expect("compiles");
        let caps = match_node(&first_statement("int b;"), &lone, false).expect("parameter matches declaration");
        assert_eq!(caps.text("x"), Some("b"));
        assert!(match_node(&first_statement("char c;"), &lone, false).is_none());
    }

    #[test]
    fn plus_needs_at_least_one_node() {
        let pattern = compile("f($a__plus)").expect("compiles");
        assert!(match_node(&first_statement("f();"), &pattern, true).is_none());
        let caps = match_node(&first_statement("f(x, y);"), &pattern, true).expect("match");
        assert_eq!(caps.text("a"), Some("x, y"));
    }

    #[test]
    fn optional_matches_zero_or_one() {
        let pattern = compile("g(opt$a)").expect("compiles");
        assert!(match_node(&first_statement("g();"), &pattern, true).is_some());
        let caps = match_node(&first_statement("g(7);"), &pattern, true).expect("match");
        assert_eq!(caps.text("a"), Some("7"));
    }

    #[test]
    fn literal_patterns_ignore_comments_but_not_text() {
        let pattern = compile("x + 1;").expect("compiles");
        assert!(match_node(&first_statement("x /* c */ + 1;"), &pattern, false).is_some());
        assert!(match_node(&first_statement("x + 2;"), &pattern, false).is_none());
        assert!(match_node(&first_statement("x - 1;"), &pattern, false).is_none());
    }

    #[test]
    fn deep_match_all_finds_nested_matches() {
        let pattern = compile("$a + $b").expect("compiles");
        let tree = parse("y = (1 + 2) + 3;");
        let all = match_all(&tree.root_node(), &pattern, true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text("b"), Some("3"));
        assert_eq!(all[1].text("a"), Some("1"));
    }

    #[test]
    fn error_nodes_never_match() {
        let pattern = compile("$x").expect("compiles");
        let tree = parse("int = ;");
        assert!(match_node(&tree.root_node(), &pattern, false).is_none());
    }
}
