// tests/pattern_tests.rs

use upp::pattern::{compile, match_all, match_node, Cardinality};
use upp::syntax::parse;
use upp::ErrorCategory;

fn texts(nodes: Vec<upp::SyntaxNode>) -> Vec<String> {
    nodes.iter().map(|n| n.text().to_string()).collect()
}

#[test]
fn until_captures_every_argument_but_the_last() {
    let pattern = compile("f($args__until, $last)").expect("compiles");
    let tree = parse("f(1,2,3);");
    let caps = match_node(&tree.root_node(), &pattern, true).expect("matches");
    assert_eq!(texts(caps.sequence("args").expect("args")), vec!["1", "2"]);
    assert_eq!(caps.text("last"), Some("3"));
}

#[test]
fn plus_fails_on_empty_argument_lists() {
    let pattern = compile("f($a__plus)").expect("compiles");
    assert!(match_node(&parse("f();").root_node(), &pattern, true).is_none());
    assert!(match_node(&parse("f(1);").root_node(), &pattern, true).is_some());
}

#[test]
fn constraints_restrict_the_node_kind() {
    let pattern = compile("$x__number_literal + $y").expect("compiles");
    assert!(match_node(&parse("z = 1 + b;").root_node(), &pattern, true).is_some());
    assert!(match_node(&parse("z = a + b;").root_node(), &pattern, true).is_none());

    let negated = compile("$x__NOT_identifier + $y").expect("compiles");
    assert!(match_node(&parse("z = a + b;").root_node(), &negated, true).is_none());
    assert!(match_node(&parse("z = 2 + b;").root_node(), &negated, true).is_some());
}

#[test]
fn repeated_wildcards_compare_text() {
    let pattern = compile("$a == $a").expect("compiles");
    let tree = parse("if (x == x) y(); if (x == z) w();");
    let all = match_all(&tree.root_node(), &pattern, true);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].text("a"), Some("x"));
}

#[test]
fn statement_patterns_match_blocks() {
    let pattern = compile("if ($cond) { $body__until; }").expect("compiles");
    let tree = parse("void f(void) { if (ready) { a(); b(); } }");
    let caps = match_node(&tree.root_node(), &pattern, true).expect("matches");
    assert_eq!(caps.text("cond"), Some("ready"));
    assert_eq!(texts(caps.sequence("body").expect("body")), vec!["a();", "b();"]);
}

#[test]
fn optional_wildcards_render_empty_when_absent() {
    let pattern = compile("return opt$value;").expect("compiles");
    let with_value = parse("int f(void) { return 1; }");
    let caps = match_node(&with_value.root_node(), &pattern, true).expect("matches");
    assert_eq!(caps.text("value"), Some("1"));

    let bare = parse("void g(void) { return; }");
    let caps = match_node(&bare.root_node(), &pattern, true).expect("matches");
    assert!(!caps.contains("value"));
}

#[test]
fn wildcards_report_their_cardinality() {
    let pattern = compile("g(opt$a, $rest__plus)").expect("compiles");
    let cardinalities: Vec<Cardinality> = pattern.wildcards().iter().map(|w| w.cardinality).collect();
    assert_eq!(cardinalities, vec![Cardinality::Optional, Cardinality::VariadicPlus]);
}

#[test]
fn invalid_patterns_are_pattern_errors() {
    let err = compile("$a__until__plus").expect_err("conflicting cardinality");
    assert_eq!(err.category(), ErrorCategory::Pattern);
    assert!(compile("int = ;").is_err());
}
