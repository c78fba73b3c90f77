// Regression tests for the upp binary.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

/// Writes `contents` to a scratch file unique to this test.
fn scratch(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("upp-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn upp() -> Command {
    Command::cargo_bin("upp").unwrap()
}

#[test]
fn expand_prints_the_expanded_file() {
    let file = scratch("expand.c", "const char *s = @stringify(a + b);\n");
    upp()
        .arg("expand")
        .arg(&file)
        .assert()
        .success()
        .stdout("const char *s = \"a + b\";\n");
}

#[test]
fn expand_loads_pattern_macros_from_yaml() {
    let macros = scratch(
        "double.yaml",
        "macros:\n  - name: double\n    pattern: \"$n\"\n    template: \"($n)*2\"\n",
    );
    let file = scratch("double.c", "int x = @double(3);\n");
    upp()
        .arg("expand")
        .arg(&file)
        .arg("--macros")
        .arg(&macros)
        .assert()
        .success()
        .stdout("int x = (3)*2;\n");
}

#[test]
fn expand_reports_parse_errors_with_miette() {
    let file = scratch("broken.c", "int main( {\n");
    upp()
        .arg("expand")
        .arg(&file)
        .assert()
        .failure()
        .stderr(contains("upp::parse").or(contains("parse error")));
}

#[test]
fn lenient_expansion_keeps_failed_invocations() {
    let file = scratch("lenient.c", "void f(void) { @swap(a, b); }\n");
    upp()
        .arg("expand")
        .arg("--lenient")
        .arg(&file)
        .assert()
        .success()
        .stdout("void f(void) { @swap(a, b); }\n")
        .stderr(contains("no declaration of `a`"));
}

#[test]
fn list_macros_shows_the_builtins() {
    upp()
        .arg("list-macros")
        .assert()
        .success()
        .stdout(contains("@swap").and(contains("@require")).and(contains("native")));
}

#[test]
fn ast_dumps_json() {
    let file = scratch("ast.c", "x = 1;\n");
    upp()
        .arg("ast")
        .arg("--json")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("\"translation_unit\"").and(contains("\"expression_statement\"")));
}

#[test]
fn match_lists_captures() {
    let file = scratch("match.c", "f(1);\ng(2);\n");
    upp()
        .arg("match")
        .arg(&file)
        .arg("--pattern")
        .arg("$fn($arg)")
        .arg("--all")
        .assert()
        .success()
        .stdout(contains("1:1: f(1)").and(contains("$fn = g")).and(contains("$arg = 2")));
}

#[test]
fn missing_files_fail_cleanly() {
    upp()
        .arg("expand")
        .arg("does/not/exist.c")
        .assert()
        .failure()
        .stderr(contains("cannot read"));
}
