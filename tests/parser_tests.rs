// tests/parser_tests.rs

use upp::syntax::{parse, NodeDump, Query};

fn kinds_of(text: &str, kind: &str) -> Vec<String> {
    parse(text)
        .root_node()
        .descendants()
        .filter(|n| n.kind() == kind)
        .map(|n| n.text().to_string())
        .collect()
}

#[test]
fn parses_a_small_program_without_errors() {
    let source = r#"
#include <stdio.h>
#define LIMIT 10

typedef struct point { int x; int y; } point_t;

enum color { RED, GREEN = 2, BLUE };

static int sum(const int *values, int n) {
    int total = 0;
    for (int i = 0; i < n; i++) {
        if (values[i] < 0) continue;
        else total += values[i];
    }
    while (total > LIMIT) total -= LIMIT;
    do { total--; } while (total > 5);
    return total;
}
"#;
    let tree = parse(source);
    assert!(!tree.has_error(), "unexpected parse failure: {:?}", tree.error());
    assert_eq!(kinds_of(source, "preproc_include"), vec!["#include <stdio.h>"]);
    assert_eq!(kinds_of(source, "function_definition").len(), 1);
    assert_eq!(kinds_of(source, "for_statement").len(), 1);
    assert_eq!(kinds_of(source, "do_statement").len(), 1);
}

#[test]
fn macro_invocations_are_allowed_in_struct_bodies_and_top_level() {
    let source = "@derive_debug\nstruct s { int a; @field(b) };\n";
    let tree = parse(source);
    assert!(!tree.has_error(), "unexpected parse failure: {:?}", tree.error());
    assert_eq!(
        kinds_of(source, "macro_invocation"),
        vec!["@derive_debug", "@field(b)"]
    );
}

#[test]
fn positions_are_reported_as_rows_and_columns() {
    let tree = parse("int a;\n  int b;\n");
    let second = tree.root_node().named_child(1).expect("second declaration");
    let point = second.start_position();
    assert_eq!((point.row, point.column), (1, 2));
    assert_eq!(second.span().start, 9);
}

#[test]
fn navigation_between_siblings_and_parents() {
    let tree = parse("void f(void) { a(); b(); }");
    let call = tree
        .root_node()
        .descendants()
        .find(|n| n.kind() == "expression_statement")
        .expect("first statement");
    let next = call.next_named_sibling().expect("second statement");
    assert_eq!(next.text(), "b();");
    assert_eq!(next.prev_named_sibling().map(|n| n.text().to_string()), Some("a();".into()));
    assert_eq!(call.parent().map(|p| p.kind().to_string()), Some("compound_statement".into()));
    assert!(call.is_descendant_of(&tree.root_node()));
}

#[test]
fn byte_ranges_resolve_to_the_smallest_covering_node() {
    let tree = parse("int x = a + bc;");
    let root = tree.root_node();
    let node = root.descendant_for_byte_range(12, 14).expect("covering node");
    assert_eq!((node.kind(), node.text()), ("identifier", "bc"));
    let point = root.descendant_for_byte_range(8, 8).expect("node at offset");
    assert_eq!(point.text(), "a");
    assert!(root.descendant_for_byte_range(0, 99).is_none());
}

#[test]
fn queries_capture_named_nodes() {
    let tree = parse("f(1); g(x, y); h();");
    let query = Query::new("(call_expression function: (identifier) @fn arguments: (argument_list)) @call")
        .expect("valid query");
    let names: Vec<String> = query
        .captures(&tree.root_node(), "fn")
        .iter()
        .map(|n| n.text().to_string())
        .collect();
    assert_eq!(names, vec!["f", "g", "h"]);
}

#[test]
fn malformed_queries_are_rejected() {
    assert!(Query::new("(call_expression").is_err());
}

#[test]
fn tree_dumps_serialize_to_json() {
    let tree = parse("x = 1;");
    let dump = NodeDump::from(&tree.root_node());
    let json = serde_json::to_value(&dump).expect("serializes");
    assert_eq!(json["kind"], "translation_unit");
    assert_eq!(json["children"][0]["kind"], "expression_statement");
}
