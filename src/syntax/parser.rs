//! upp Parser - pest grammar adapter
//!
//! Converts C source text into a [`Tree`]. The pest grammar produces a pair
//! tree; this module folds expression chains into the usual binary/call/field
//! node shapes, collapses pass-through expression rules, names anonymous
//! tokens by their text and assigns field names.
//!
//! Parsing never fails outright: a grammar rejection yields a tree whose root
//! is an `ERROR` node, with the failure retained on the tree.

use std::rc::Rc;

use log::debug;
use once_cell::sync::Lazy;
use pest::error::{Error, InputLocation};
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use super::{ParseFailure, RawNode, Span, Tree, COMMENT_KIND, ERROR_KIND};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct CParser;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::op_or, Assoc::Left))
        .op(Op::infix(Rule::op_and, Assoc::Left))
        .op(Op::infix(Rule::op_bitor, Assoc::Left))
        .op(Op::infix(Rule::op_xor, Assoc::Left))
        .op(Op::infix(Rule::op_bitand, Assoc::Left))
        .op(Op::infix(Rule::op_eq, Assoc::Left) | Op::infix(Rule::op_ne, Assoc::Left))
        .op(Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left))
        .op(Op::infix(Rule::op_shl, Assoc::Left) | Op::infix(Rule::op_shr, Assoc::Left))
        .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
        .op(Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_div, Assoc::Left)
            | Op::infix(Rule::op_mod, Assoc::Left))
});

const TYPE_KINDS: &[&str] = &[
    "primitive_type",
    "type_identifier",
    "sized_type_specifier",
    "struct_specifier",
    "union_specifier",
    "enum_specifier",
];

const DECLARATOR_KINDS: &[&str] = &[
    "identifier",
    "pointer_declarator",
    "function_declarator",
    "array_declarator",
    "init_declarator",
    "abstract_pointer_declarator",
];

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse C source text into a fresh tree.
pub fn parse(text: &str) -> Rc<Tree> {
    parse_with(text, None)
}

/// Parse `text`, reusing `old` when it already describes exactly this text
/// and has no pending edit notifications.
pub fn parse_with(text: &str, old: Option<&Rc<Tree>>) -> Rc<Tree> {
    if let Some(old) = old {
        if old.pending_edits() == 0 && old.source() == text {
            return Rc::clone(old);
        }
        debug!(
            "reparsing {} bytes after {} edit(s) to tree {}",
            text.len(),
            old.pending_edits(),
            old.id()
        );
    }

    match CParser::parse(Rule::translation_unit, text) {
        Ok(mut pairs) => match pairs.next() {
            Some(unit) => Tree::from_raw(text.to_string(), build_node(unit), None),
            None => error_tree(
                text,
                ParseFailure {
                    message: "empty parse result".to_string(),
                    span: Span::new(0, text.len()),
                },
            ),
        },
        Err(e) => error_tree(text, convert_parse_error(&e, text.len())),
    }
}

fn error_tree(text: &str, failure: ParseFailure) -> Rc<Tree> {
    debug!("parse failed at {}: {}", failure.span, failure.message);
    let root = RawNode::named(ERROR_KIND, Span::new(0, text.len()), Vec::new());
    Tree::from_raw(text.to_string(), root, Some(failure))
}

fn convert_parse_error(error: &Error<Rule>, len: usize) -> ParseFailure {
    let span = match error.location {
        InputLocation::Pos(pos) => Span::new(pos, (pos + 1).min(len).max(pos)),
        InputLocation::Span((start, end)) => Span::new(start, end),
    };
    ParseFailure {
        message: error.variant.message().into_owned(),
        span,
    }
}

// ============================================================================
// NODE BUILDERS
// ============================================================================

fn span_of(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    Span::new(span.start(), span.end())
}

fn rule_name(rule: Rule) -> String {
    format!("{:?}", rule)
}

fn is_anonymous(rule: Rule) -> bool {
    let name = rule_name(rule);
    name.starts_with("tok_") || name.starts_with("op_")
}

fn kind_name(rule: Rule) -> String {
    match rule {
        Rule::COMMENT => COMMENT_KIND.to_string(),
        Rule::true_literal => "true".to_string(),
        Rule::false_literal => "false".to_string(),
        Rule::null_literal => "null".to_string(),
        Rule::macro_name => "identifier".to_string(),
        other => rule_name(other),
    }
}

fn significant(pair: &Pair<Rule>) -> bool {
    !matches!(pair.as_rule(), Rule::COMMENT | Rule::EOI)
}

fn build_node(pair: Pair<Rule>) -> RawNode {
    let span = span_of(&pair);
    let rule = pair.as_rule();

    match rule {
        Rule::binary_chain => build_binary(pair),
        Rule::postfix_chain => build_postfix(pair),
        Rule::assignment_expression | Rule::conditional_expression => {
            let kind = kind_name(rule);
            let children: Vec<RawNode> = pair
                .into_inner()
                .filter(|p| p.as_rule() != Rule::EOI)
                .map(build_node)
                .collect();
            let significant = children.iter().filter(|c| c.kind != COMMENT_KIND).count();
            if significant == 1 {
                if let Some(only) = children.into_iter().find(|c| c.kind != COMMENT_KIND) {
                    return only;
                }
                return RawNode::named(ERROR_KIND, span, Vec::new());
            }
            finish(kind, span, children)
        }
        _ if is_anonymous(rule) => RawNode::anonymous(pair.as_str(), span),
        _ => {
            let kind = kind_name(rule);
            let children = pair
                .into_inner()
                .filter(|p| p.as_rule() != Rule::EOI)
                .map(build_node)
                .collect();
            finish(kind, span, children)
        }
    }
}

/// pest skips trailing whitespace and comments while trying optional
/// elements, so a rule's raw span can run past its last real child. The span
/// is clamped to that child and comments past it move up to the parent.
fn finish(kind: String, span: Span, children: Vec<RawNode>) -> RawNode {
    let mut children = hoist_trailing_comments(children);
    assign_fields(&kind, &mut children);
    let span = match children.iter().rev().find(|c| c.kind != COMMENT_KIND) {
        Some(last) if kind != "translation_unit" => Span::new(span.start, last.span.end),
        _ => span,
    };
    RawNode::named(kind, span, children)
}

fn hoist_trailing_comments(children: Vec<RawNode>) -> Vec<RawNode> {
    let mut out = Vec::with_capacity(children.len());
    for mut child in children {
        let keep = child
            .children
            .iter()
            .rposition(|c| c.kind != COMMENT_KIND)
            .map_or(0, |i| i + 1);
        let trailing = child.children.split_off(keep);
        out.push(child);
        out.extend(trailing);
    }
    out
}

/// Folds `unary (op unary)*` by operator precedence. Comments inside the
/// chain are dropped.
fn build_binary(pair: Pair<Rule>) -> RawNode {
    PRATT
        .map_primary(build_node)
        .map_infix(|lhs: RawNode, op: Pair<Rule>, rhs: RawNode| {
            let span = Span::new(lhs.span.start, rhs.span.end);
            let operator = RawNode::anonymous(op.as_str(), span_of(&op)).with_field("operator");
            RawNode::named(
                "binary_expression",
                span,
                vec![lhs.with_field("left"), operator, rhs.with_field("right")],
            )
        })
        .parse(pair.into_inner().filter(significant))
}

/// Folds `primary suffix*` left to right into call, subscript, field and
/// postfix update expressions.
fn build_postfix(pair: Pair<Rule>) -> RawNode {
    let span = span_of(&pair);
    let mut inner = pair.into_inner().filter(significant);
    let Some(first) = inner.next() else {
        return RawNode::named(ERROR_KIND, span, Vec::new());
    };

    let mut acc = build_node(first);
    for suffix in inner {
        let whole = Span::new(acc.span.start, span_of(&suffix).end);
        acc = match suffix.as_rule() {
            Rule::argument_list => RawNode::named(
                "call_expression",
                whole,
                vec![acc.with_field("function"), build_node(suffix).with_field("arguments")],
            ),
            Rule::subscript_suffix => {
                let mut children = vec![acc.with_field("argument")];
                for part in suffix.into_inner() {
                    let node = build_node(part);
                    children.push(if node.named && node.kind != COMMENT_KIND {
                        node.with_field("index")
                    } else {
                        node
                    });
                }
                RawNode::named("subscript_expression", whole, children)
            }
            Rule::field_suffix => {
                let mut children = vec![acc.with_field("argument")];
                for part in suffix.into_inner() {
                    let node = build_node(part);
                    children.push(if node.named {
                        node.with_field("field")
                    } else {
                        node.with_field("operator")
                    });
                }
                RawNode::named("field_expression", whole, children)
            }
            Rule::postfix_update => {
                let mut children = vec![acc.with_field("argument")];
                children.extend(
                    suffix
                        .into_inner()
                        .map(|p| build_node(p).with_field("operator")),
                );
                RawNode::named("update_expression", whole, children)
            }
            other => {
                debug!("unexpected postfix suffix {:?}", other);
                acc
            }
        };
    }
    acc
}

// ============================================================================
// FIELD NAMES
// ============================================================================

fn assign_fields(parent: &str, children: &mut [RawNode]) {
    let mut named_index = 0;
    let mut last_anon: Option<String> = None;
    for child in children.iter_mut() {
        if child.kind == COMMENT_KIND {
            continue;
        }
        if child.field.is_none() {
            child.field = field_for(parent, child, named_index, last_anon.as_deref());
        }
        if child.named {
            named_index += 1;
        } else {
            last_anon = Some(child.kind.clone());
        }
    }
}

fn field_for(
    parent: &str,
    child: &RawNode,
    named_index: usize,
    last_anon: Option<&str>,
) -> Option<&'static str> {
    let kind = child.kind.as_str();
    let named = child.named;

    match parent {
        "function_definition" | "declaration" | "field_declaration" | "parameter_declaration"
        | "type_definition" | "type_descriptor" => {
            if TYPE_KINDS.contains(&kind) {
                Some("type")
            } else if DECLARATOR_KINDS.contains(&kind) {
                Some("declarator")
            } else if kind == "compound_statement" {
                Some("body")
            } else {
                None
            }
        }
        "init_declarator" if named => {
            if last_anon == Some("=") {
                Some("value")
            } else {
                Some("declarator")
            }
        }
        "function_declarator" => match kind {
            "parameter_list" => Some("parameters"),
            _ if named => Some("declarator"),
            _ => None,
        },
        "pointer_declarator" if DECLARATOR_KINDS.contains(&kind) => Some("declarator"),
        "array_declarator" if named => {
            if last_anon == Some("[") {
                Some("size")
            } else {
                Some("declarator")
            }
        }
        "struct_specifier" | "union_specifier" | "enum_specifier" => match kind {
            "type_identifier" => Some("name"),
            "field_declaration_list" | "enumerator_list" => Some("body"),
            _ => None,
        },
        "enumerator" if named => {
            if last_anon == Some("=") {
                Some("value")
            } else {
                Some("name")
            }
        }
        "if_statement" => match kind {
            "parenthesized_expression" if named_index == 0 => Some("condition"),
            "else_clause" => Some("alternative"),
            _ if named => Some("consequence"),
            _ => None,
        },
        "while_statement" | "do_statement" => match kind {
            "parenthesized_expression" => Some("condition"),
            _ if named => Some("body"),
            _ => None,
        },
        "for_statement" if named && last_anon == Some(")") => Some("body"),
        "macro_invocation" => match kind {
            "identifier" => Some("name"),
            "argument_list" => Some("arguments"),
            _ => None,
        },
        "unary_expression" | "pointer_expression" | "update_expression" => {
            if named {
                Some("argument")
            } else {
                Some("operator")
            }
        }
        "assignment_expression" => match (named, named_index) {
            (false, _) => Some("operator"),
            (true, 0) => Some("left"),
            (true, _) => Some("right"),
        },
        "conditional_expression" if named => match named_index {
            0 => Some("condition"),
            1 => Some("consequence"),
            _ => Some("alternative"),
        },
        "cast_expression" | "sizeof_expression" if named => {
            if kind == "type_descriptor" {
                Some("type")
            } else {
                Some("value")
            }
        }
        "preproc_include" if named => Some("path"),
        "preproc_def" => match kind {
            "identifier" => Some("name"),
            "preproc_params" => Some("parameters"),
            "preproc_arg" => Some("value"),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sexp(text: &str) -> String {
        parse(text).root_node().to_sexp()
    }

    #[test]
    fn binary_precedence_is_respected() {
        let tree = parse("x = 1 + 2 * 3;");
        let root = tree.root_node();
        let stmt = root.named_child(0).expect("statement");
        assert_eq!(stmt.kind(), "expression_statement");
        let assign = stmt.named_child(0).expect("assignment");
        assert_eq!(assign.kind(), "assignment_expression");
        let right = assign.child_by_field_name("right").expect("right");
        assert_eq!(right.kind(), "binary_expression");
        assert_eq!(right.child_by_field_name("operator").map(|o| o.text().to_string()), Some("+".into()));
        let product = right.child_by_field_name("right").expect("product");
        assert_eq!(product.text(), "2 * 3");
    }

    #[test]
    fn macro_invocations_parse_in_expression_and_statement_position() {
        assert_eq!(
            sexp("@double(2+3);"),
            "(translation_unit (expression_statement (macro_invocation (name: identifier) (arguments: argument_list (binary_expression (left: number_literal) (right: number_literal))))))"
        );
        let tree = parse("int main() { @defer { free(p); } int x; }");
        assert!(!tree.has_error());
        let kinds: Vec<String> = tree
            .root_node()
            .descendants()
            .filter(|n| n.kind() == "macro_invocation")
            .map(|n| n.text().to_string())
            .collect();
        assert_eq!(kinds, vec!["@defer"]);
    }

    #[test]
    fn keywords_are_valid_macro_names() {
        let tree = parse("int x = @int(1); @sizeof;");
        assert!(!tree.has_error());
        let names: Vec<String> = tree
            .root_node()
            .descendants()
            .filter(|n| n.kind() == "macro_invocation")
            .filter_map(|n| n.child_by_field_name("name"))
            .map(|n| format!("{}:{}", n.kind(), n.text()))
            .collect();
        assert_eq!(names, vec!["identifier:int", "identifier:sizeof"]);
    }

    #[test]
    fn spans_stop_at_the_last_child() {
        let tree = parse("@take\n  a();");
        let invocation = tree
            .root_node()
            .descendants()
            .find(|n| n.kind() == "macro_invocation")
            .expect("invocation");
        assert_eq!(invocation.text(), "@take");

        let tree = parse("void f(void) { if (x) y(); /* note */ z(); }");
        let branch = tree
            .root_node()
            .descendants()
            .find(|n| n.kind() == "if_statement")
            .expect("if statement");
        assert_eq!(branch.text(), "if (x) y();");
        let body = branch.parent().expect("body");
        assert!(body.named_children().any(|n| n.is_comment() && n.text() == "/* note */"));
    }

    #[test]
    fn anonymous_tokens_use_their_text_as_kind() {
        let tree = parse("f(a, b);");
        let args = tree
            .root_node()
            .descendants()
            .find(|n| n.kind() == "argument_list")
            .expect("argument list");
        let kinds: Vec<String> = args.children().map(|c| c.kind().to_string()).collect();
        assert_eq!(kinds, vec!["(", "identifier", ",", "identifier", ")"]);
    }

    #[test]
    fn comments_are_named_nodes() {
        let tree = parse("int x; // trailing\n/* block */ int y;");
        let comments: Vec<String> = tree
            .root_node()
            .named_children()
            .filter(|n| n.is_comment())
            .map(|n| n.text().to_string())
            .collect();
        assert_eq!(comments, vec!["// trailing", "/* block */"]);
    }

    #[test]
    fn casts_and_parenthesized_expressions_are_distinguished() {
        let tree = parse("y = (int)x; z = (a) * b;");
        let kinds: Vec<String> = tree
            .root_node()
            .descendants()
            .filter(|n| n.kind() == "cast_expression" || n.kind() == "parenthesized_expression")
            .map(|n| n.kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["cast_expression", "parenthesized_expression"]);
    }

    #[test]
    fn declarations_carry_type_and_declarator_fields() {
        let tree = parse("static const char *name = \"x\";");
        let decl = tree.root_node().named_child(0).expect("declaration");
        assert_eq!(decl.kind(), "declaration");
        assert_eq!(decl.child_by_field_name("type").map(|t| t.text().to_string()), Some("char".into()));
        let init = decl.child_by_field_name("declarator").expect("declarator");
        assert_eq!(init.kind(), "init_declarator");
        assert_eq!(init.child_by_field_name("value").map(|v| v.text().to_string()), Some("\"x\"".into()));
    }

    #[test]
    fn grammar_failure_yields_error_tree() {
        let tree = parse("int x = ;");
        assert!(tree.has_error());
        assert_eq!(tree.root_node().kind(), ERROR_KIND);
        assert!(tree.error().is_some());
    }

    #[test]
    fn unchanged_tree_is_reused() {
        let tree = parse("int x;");
        let again = parse_with("int x;", Some(&tree));
        assert_eq!(tree.id(), again.id());
        let changed = parse_with("int y;", Some(&tree));
        assert_ne!(tree.id(), changed.id());
    }
}
