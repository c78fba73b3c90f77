//! Macro registry for storage and lookup of macro definitions.
//!
//! # Macro Types
//! - **Native macros**: Rust closures over an [`ExpansionContext`].
//! - **Pattern macros**: a structural pattern plus a text template with
//!   `$name` holes, usually loaded from YAML.
//!
//! # Summary Table
//! | Method             | Overwrites | Notes                                  |
//! |--------------------|------------|----------------------------------------|
//! | register_native    | Yes        | Native closure                         |
//! | register_pattern   | Yes        | Compiles the pattern eagerly           |
//! | register_spec      | Yes        | Pattern macro from a loaded spec       |
//! | merge              | Yes        | Later registry wins                    |
//! | get/contains       | N/A        | Case-sensitive lookup                  |
//!
//! Names are case-sensitive and never carry the leading `@`.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::context::ExpansionContext;
use super::loader::MacroSpec;
use crate::access::NodeView;
use crate::errors::UppError;
use crate::pattern::{compile, match_node, Pattern};

/// A native macro. Returns the invocation's replacement text, or `None` to
/// leave the reserved range to whatever else the macro registered.
pub type NativeMacro = Rc<dyn Fn(&mut ExpansionContext<'_>) -> Result<Option<String>, UppError>>;

static TEMPLATE_HOLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$|\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid template regex"));

#[derive(Clone)]
pub enum MacroDef {
    Native(NativeMacro),
    Pattern {
        pattern: Rc<Pattern>,
        template: String,
    },
}

impl fmt::Debug for MacroDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroDef::Native(_) => write!(f, "MacroDef::Native"),
            MacroDef::Pattern { pattern, template } => f
                .debug_struct("MacroDef::Pattern")
                .field("pattern", &pattern.source())
                .field("template", template)
                .finish(),
        }
    }
}

impl MacroDef {
    pub fn expand(&self, ctx: &mut ExpansionContext<'_>) -> Result<Option<String>, UppError> {
        match self {
            MacroDef::Native(f) => f(ctx),
            MacroDef::Pattern { pattern, template } => expand_pattern(ctx, pattern, template),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, MacroDef::Native(_))
    }
}

// ============================================================================
// PATTERN MACROS
// ============================================================================

/// Picks the node a pattern macro matches against: the whole argument list
/// when the pattern is itself a list, the single argument otherwise, or the
/// next consumable node for argument-less invocations.
fn pattern_target(ctx: &mut ExpansionContext<'_>, pattern: &Pattern) -> Result<NodeView, UppError> {
    if let Some(list) = ctx.argument_list() {
        if pattern.root_kind() == Some("argument_list") {
            return Ok(list);
        }
        let args = ctx.arguments();
        return match args.as_slice() {
            [single] => Ok(single.clone()),
            _ => Err(ctx.error(
                &list,
                format!(
                    "pattern `{}` takes one argument, got {}",
                    pattern.source(),
                    args.len()
                ),
            )),
        };
    }
    match ctx.consume()? {
        Some(node) => Ok(node),
        None => {
            let node = ctx.node();
            Err(ctx.error(&node, "nothing to match the pattern against"))
        }
    }
}

fn expand_pattern(
    ctx: &mut ExpansionContext<'_>,
    pattern: &Pattern,
    template: &str,
) -> Result<Option<String>, UppError> {
    let target = pattern_target(ctx, pattern)?;
    let Some(captures) = match_node(target.node(), pattern, false) else {
        return Err(ctx.error(
            &target,
            format!("`{}` does not match `{}`", target.text(), pattern.source()),
        ));
    };

    let mut unknown = None;
    let rendered = TEMPLATE_HOLE.replace_all(template, |caps: &Captures| {
        let Some(name) = caps.get(1) else {
            return "$".to_string();
        };
        let name = name.as_str();
        match captures.text(name) {
            Some(text) => text.to_string(),
            None if pattern.wildcards().iter().any(|w| w.name == name) => String::new(),
            None => {
                unknown.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    if let Some(name) = unknown {
        return Err(ctx.error(
            &target,
            format!("template refers to ${} which the pattern never binds", name),
        ));
    }
    Ok(Some(rendered.into_owned()))
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, MacroDef>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in macros.
    pub fn with_std() -> Self {
        let mut registry = Self::new();
        super::std::register_std_macros(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &str, def: MacroDef) -> Option<MacroDef> {
        self.macros.insert(bare(name).to_string(), def)
    }

    pub fn register_native(&mut self, name: &str, f: NativeMacro) -> Option<MacroDef> {
        self.register(name, MacroDef::Native(f))
    }

    /// Compiles `pattern` now so a bad pattern fails at load time.
    pub fn register_pattern(
        &mut self,
        name: &str,
        pattern: &str,
        template: &str,
    ) -> Result<Option<MacroDef>, UppError> {
        let compiled = compile(pattern)?;
        Ok(self.register(
            name,
            MacroDef::Pattern {
                pattern: Rc::new(compiled),
                template: template.to_string(),
            },
        ))
    }

    pub fn register_spec(&mut self, spec: &MacroSpec) -> Result<Option<MacroDef>, UppError> {
        self.register_pattern(&spec.name, &spec.pattern, &spec.template)
    }

    pub fn unregister(&mut self, name: &str) -> Option<MacroDef> {
        self.macros.remove(bare(name))
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(bare(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(bare(name))
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MacroDef)> {
        self.macros.iter()
    }

    /// Copies every definition of `other` in, replacing same-named ones.
    pub fn merge(&mut self, other: MacroRegistry) {
        self.macros.extend(other.macros);
    }
}

/// Names are stored without the `@` sigil.
fn bare(name: &str) -> &str {
    name.trim_start_matches('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_strips_the_sigil_and_overwrites() {
        let mut reg = MacroRegistry::new();
        assert!(reg.register_pattern("@twice", "$x", "$x $x").expect("compiles").is_none());
        assert!(reg.contains("twice"));
        assert!(reg.register_pattern("twice", "$x", "$x").expect("compiles").is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn lookups_and_removal_accept_either_spelling() {
        let mut reg = MacroRegistry::new();
        reg.register_pattern("twice", "$x", "$x $x").expect("compiles");
        assert!(reg.contains("@twice"));
        assert!(reg.get("@twice").is_some());
        assert!(reg.unregister("@twice").is_some());
        assert!(!reg.contains("twice"));
        assert!(reg.unregister("twice").is_none());
    }

    #[test]
    fn bad_patterns_are_rejected_at_registration() {
        let mut reg = MacroRegistry::new();
        assert!(reg.register_pattern("bad", "$x__until__plus", "").is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn names_are_sorted_and_merge_replaces() {
        let mut a = MacroRegistry::new();
        a.register_pattern("zeta", "$x", "z").expect("compiles");
        a.register_pattern("alpha", "$x", "a").expect("compiles");
        let mut b = MacroRegistry::new();
        b.register_pattern("alpha", "$x", "A").expect("compiles");
        a.merge(b);
        assert_eq!(a.names(), vec!["alpha", "zeta"]);
        match a.get("alpha") {
            Some(MacroDef::Pattern { template, .. }) => assert_eq!(template, "A"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn std_registry_has_the_builtins() {
        let reg = MacroRegistry::with_std();
        for name in ["stringify", "unique", "require", "swap"] {
            assert!(reg.contains(name), "missing {}", name);
        }
    }
}
