//! Shared helpers for the upp integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::rc::Rc;

use upp::macros::ExpansionOutcome;
use upp::{Driver, ExpansionContext, MacroRegistry, NativeMacro, UppConfig, UppError};

pub fn init_logging() {
    upp::logging::init_test();
}

pub fn native<F>(f: F) -> NativeMacro
where
    F: Fn(&mut ExpansionContext<'_>) -> Result<Option<String>, UppError> + 'static,
{
    Rc::new(f)
}

/// Standard macros plus the given `(name, pattern, template)` pattern macros.
pub fn registry_with(patterns: &[(&str, &str, &str)]) -> MacroRegistry {
    let mut registry = MacroRegistry::with_std();
    for (name, pattern, template) in patterns {
        registry
            .register_pattern(name, pattern, template)
            .unwrap_or_else(|e| panic!("pattern macro {} failed to compile: {}", name, e));
    }
    registry
}

pub fn run(registry: MacroRegistry, text: &str) -> Result<ExpansionOutcome, UppError> {
    init_logging();
    Driver::new(registry, UppConfig::default()).expand("test.c", text)
}

/// Expands with the standard macros and panics on failure.
pub fn must_expand(text: &str) -> String {
    match run(MacroRegistry::with_std(), text) {
        Ok(outcome) => outcome.text,
        Err(e) => panic!("expansion of {:?} failed: {}", text, e),
    }
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}
