//! Pattern compiler
//!
//! Wildcards are swapped for placeholder identifiers, the de-wildcarded text
//! is parsed with the target grammar, and the resulting tree is converted to
//! an owned [`PatternNode`] tree. Fragments that are not complete top-level
//! items are retried inside a synthetic function body, then as a call
//! argument, then as a function parameter.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Cardinality, ConstraintSpec, Pattern, PatternNode, Wildcard};
use crate::errors::UppError;
use crate::syntax::{parse, SyntaxNode};

static WILDCARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(opt)?\$([A-Za-z_][A-Za-z0-9_]*)").expect("wildcard regex is valid")
});

const PLACEHOLDER_PREFIX: &str = "__upp_wc_";
const WRAPPER_NAME: &str = "__upp_pattern__";

/// Compiles patterns and caches them by source text.
#[derive(Debug, Default)]
pub struct PatternCompiler {
    cache: HashMap<String, Rc<Pattern>>,
}

impl PatternCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, text: &str) -> Result<Rc<Pattern>, UppError> {
        if let Some(pattern) = self.cache.get(text) {
            return Ok(Rc::clone(pattern));
        }
        let pattern = Rc::new(compile(text)?);
        self.cache.insert(text.to_string(), Rc::clone(&pattern));
        Ok(pattern)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Compiles one pattern without caching.
pub fn compile(text: &str) -> Result<Pattern, UppError> {
    let (plain, wildcards) = extract_wildcards(text)?;
    let placeholders: HashMap<String, Wildcard> = wildcards
        .iter()
        .enumerate()
        .map(|(i, wc)| (placeholder(i), wc.clone()))
        .collect();

    let node = parse_fragment(&plain).ok_or_else(|| {
        UppError::pattern(text, "fragment does not parse as an item, statement or expression")
    })?;
    let root = convert(&node, &placeholders);
    trace!("compiled pattern {:?} as {}", text, node.kind());
    Ok(Pattern::new(text.to_string(), root, wildcards))
}

fn placeholder(index: usize) -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, index)
}

// ============================================================================
// WILDCARD SYNTAX
// ============================================================================

fn extract_wildcards(text: &str) -> Result<(String, Vec<Wildcard>), UppError> {
    let mut wildcards = Vec::new();
    let mut plain = String::with_capacity(text.len());
    let mut last = 0;

    for caps in WILDCARD.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let optional = caps.get(1).is_some();
        let spec = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let wildcard = parse_wildcard(text, spec, optional)?;

        plain.push_str(&text[last..whole.start()]);
        plain.push_str(&placeholder(wildcards.len()));
        last = whole.end();
        wildcards.push(wildcard);
    }
    plain.push_str(&text[last..]);
    Ok((plain, wildcards))
}

fn parse_wildcard(pattern: &str, spec: &str, optional: bool) -> Result<Wildcard, UppError> {
    let mut parts = spec.split("__");
    let name = parts.next().unwrap_or("");
    if name.is_empty() {
        return Err(UppError::pattern(pattern, format!("wildcard `${}` has no name", spec)));
    }

    let mut cardinality = if optional {
        Cardinality::Optional
    } else {
        Cardinality::Single
    };
    let mut constraints = Vec::new();
    for part in parts {
        let variadic = match part {
            "until" => Some(Cardinality::VariadicUntil),
            "plus" => Some(Cardinality::VariadicPlus),
            _ => None,
        };
        if let Some(variadic) = variadic {
            if cardinality != Cardinality::Single {
                return Err(UppError::pattern(
                    pattern,
                    format!("wildcard `{}` has conflicting cardinalities", name),
                ));
            }
            cardinality = variadic;
            continue;
        }
        let (type_tag, negated) = match part.strip_prefix("NOT_") {
            Some(rest) => (rest, true),
            None => (part, false),
        };
        if type_tag.is_empty() {
            return Err(UppError::pattern(
                pattern,
                format!("wildcard `{}` has an empty constraint", name),
            ));
        }
        constraints.push(ConstraintSpec {
            type_tag: type_tag.to_string(),
            negated,
        });
    }

    Ok(Wildcard {
        name: name.to_string(),
        constraints,
        cardinality,
    })
}

// ============================================================================
// FRAGMENT PARSING
// ============================================================================

fn significant_named(node: &SyntaxNode) -> Vec<SyntaxNode> {
    node.named_children().filter(|c| !c.is_comment()).collect()
}

fn parse_fragment(text: &str) -> Option<SyntaxNode> {
    let tree = parse(text);
    if !tree.has_error() {
        let items = significant_named(&tree.root_node());
        if items.len() == 1 {
            return items.into_iter().next();
        }
    }

    let body = format!("void {}(void) {{\n{}\n}}", WRAPPER_NAME, text);
    let tree = parse(&body);
    if !tree.has_error() {
        if let Some(block) = wrapper_body(&tree.root_node()) {
            let statements = significant_named(&block);
            if statements.len() == 1 {
                return statements.into_iter().next();
            }
            return Some(block);
        }
    }

    let call = format!("void {0}(void) {{\n{0}({1});\n}}", WRAPPER_NAME, text);
    let tree = parse(&call);
    if !tree.has_error() {
        let args = wrapper_body(&tree.root_node())
            .and_then(|block| block.descendants().find(|n| n.kind() == "argument_list"));
        if let Some(args) = args {
            let items = significant_named(&args);
            if items.len() == 1 {
                return items.into_iter().next();
            }
            return Some(args);
        }
    }

    // A lone parameter such as `int $x` has no `;` and only parses in a
    // parameter list.
    let params = format!("void {}({}) {{}}", WRAPPER_NAME, text);
    let tree = parse(&params);
    if tree.has_error() {
        return None;
    }
    let list = tree
        .root_node()
        .descendants()
        .find(|n| n.kind() == "parameter_list")?;
    let items = significant_named(&list);
    if items.len() == 1 {
        return items.into_iter().next();
    }
    None
}

fn wrapper_body(root: &SyntaxNode) -> Option<SyntaxNode> {
    let function = root
        .named_children()
        .find(|n| n.kind() == "function_definition")?;
    function.child_by_field_name("body")
}

// ============================================================================
// CONVERSION
// ============================================================================

fn convert(node: &SyntaxNode, placeholders: &HashMap<String, Wildcard>) -> PatternNode {
    if let Some(wildcard) = placeholders.get(node.text()) {
        return PatternNode::Wildcard(wildcard.clone());
    }
    if let Some(wildcard) = statement_wildcard(node, placeholders) {
        return PatternNode::Wildcard(wildcard);
    }
    let children: Vec<PatternNode> = node
        .children()
        .filter(|c| !c.is_comment())
        .map(|c| convert(&c, placeholders))
        .collect();
    PatternNode::Literal {
        kind: node.kind().to_string(),
        named: node.is_named(),
        text: if children.is_empty() {
            node.text().to_string()
        } else {
            String::new()
        },
        children,
    }
}

/// `$body__until;` stands for whole statements rather than an expression
/// statement holding one expression.
fn statement_wildcard(
    node: &SyntaxNode,
    placeholders: &HashMap<String, Wildcard>,
) -> Option<Wildcard> {
    if node.kind() != "expression_statement" {
        return None;
    }
    let inner = significant_named(node);
    let [only] = inner.as_slice() else {
        return None;
    };
    let wildcard = placeholders.get(only.text())?;
    if wildcard.cardinality != Cardinality::Single || wildcard.wants_statement() {
        Some(wildcard.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wildcard_suffixes() {
        let pattern = compile("$x__identifier__NOT_number_literal + opt$y").expect("compiles");
        let wcs = pattern.wildcards();
        assert_eq!(wcs.len(), 2);
        assert_eq!(wcs[0].name, "x");
        assert_eq!(
            wcs[0].constraints,
            vec![
                ConstraintSpec {
                    type_tag: "identifier".into(),
                    negated: false
                },
                ConstraintSpec {
                    type_tag: "number_literal".into(),
                    negated: true
                },
            ]
        );
        assert_eq!(wcs[1].cardinality, Cardinality::Optional);
    }

    #[test]
    fn expression_fragments_compile_through_the_call_wrapper() {
        let pattern = compile("f($args__until, $last)").expect("compiles");
        assert_eq!(pattern.root_kind(), Some("call_expression"));
        let lone = compile("$n").expect("compiles");
        assert!(matches!(lone.root(), PatternNode::Wildcard(w) if w.name == "n"));
    }

    #[test]
    fn statement_fragments_compile() {
        let pattern = compile("$x = $x;").expect("compiles");
        assert_eq!(pattern.root_kind(), Some("expression_statement"));
        let list = compile("a(); b();").expect("compiles");
        assert_eq!(list.root_kind(), Some("compound_statement"));
    }

    #[test]
    fn lone_parameters_compile_through_the_parameter_wrapper() {
        let pattern = compile("const char *$name").expect("compiles");
        assert_eq!(pattern.root_kind(), Some("parameter_declaration"));
        assert!(compile("int $a, int $b").is_err());
    }

    #[test]
    fn variadic_expression_statement_becomes_statement_wildcard() {
        let pattern = compile("while (1) { $body__until; }").expect("compiles");
        let PatternNode::Literal { children, .. } = pattern.root() else {
            panic!("literal root expected");
        };
        let block = children.last().expect("body");
        let PatternNode::Literal { children, .. } = block else {
            panic!("block expected");
        };
        assert!(matches!(&children[1], PatternNode::Wildcard(w) if w.cardinality == Cardinality::VariadicUntil));
    }

    #[test]
    fn bad_wildcards_are_rejected() {
        assert!(compile("$x__until__plus").is_err());
        assert!(compile("$x____foo").is_err());
        assert!(compile("int = ;").is_err());
    }

    #[test]
    fn compiler_caches_by_text() {
        let mut compiler = PatternCompiler::new();
        let a = compiler.compile("$x + 1").expect("compiles");
        let b = compiler.compile("$x + 1").expect("compiles");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(compiler.cached(), 1);
    }
}
