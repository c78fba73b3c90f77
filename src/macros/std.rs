//! Built-in macros
//!
//! - `@stringify(expr)`: the argument's source as a string literal
//! - `@unique` / `@unique(prefix)`: a fresh identifier
//! - `@require("header.h")` / `@require("<stdio.h>")`: adds the include at
//!   the top of the file once and removes the statement
//! - `@swap(a, b)`: swaps two variables through a temporary declared at the
//!   top of the enclosing block

use std::rc::Rc;

use super::context::ExpansionContext;
use super::registry::{MacroRegistry, NativeMacro};
use crate::access::NodeView;
use crate::code;
use crate::errors::UppError;

// ============================================================================
// REGISTRY: Standard Macro Registration
// ============================================================================

/// Registers all standard macros in the given registry.
pub fn register_std_macros(registry: &mut MacroRegistry) {
    registry.register_native("require", native(expand_require));
    registry.register_native("stringify", native(expand_stringify));
    registry.register_native("swap", native(expand_swap));
    registry.register_native("unique", native(expand_unique));
}

fn native(f: fn(&mut ExpansionContext<'_>) -> Result<Option<String>, UppError>) -> NativeMacro {
    Rc::new(f)
}

// ============================================================================
// HELPERS
// ============================================================================

/// Source text spanning all explicit arguments, or the next consumed node.
fn argument_text(ctx: &mut ExpansionContext<'_>) -> Result<String, UppError> {
    let args = ctx.arguments();
    if let (Some(first), Some(last)) = (args.first(), args.last()) {
        return Ok(ctx.source_text()[first.start()..last.end()].to_string());
    }
    if ctx.invocation().has_explicit_target {
        return Ok(String::new());
    }
    Ok(ctx.consume()?.map(|n| n.text().to_string()).unwrap_or_default())
}

fn escape_c_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(literal: &str) -> Option<&str> {
    literal.strip_prefix('"')?.strip_suffix('"')
}

fn expect_identifier(ctx: &ExpansionContext<'_>, arg: &NodeView) -> Result<String, UppError> {
    if arg.kind() == "identifier" {
        Ok(arg.text().to_string())
    } else {
        Err(ctx.error(arg, format!("expected a variable name, found {}", arg.kind())))
    }
}

// ============================================================================
// MACROS
// ============================================================================

fn expand_stringify(ctx: &mut ExpansionContext<'_>) -> Result<Option<String>, UppError> {
    let text = argument_text(ctx)?;
    Ok(Some(escape_c_string(&text)))
}

fn expand_unique(ctx: &mut ExpansionContext<'_>) -> Result<Option<String>, UppError> {
    let prefix = match ctx.arguments().as_slice() {
        [] => "tmp".to_string(),
        [arg] => expect_identifier(ctx, arg)?,
        [_, extra, ..] => return Err(ctx.error(extra, "@unique takes at most one prefix")),
    };
    Ok(Some(ctx.create_unique_identifier(&prefix)))
}

fn expand_require(ctx: &mut ExpansionContext<'_>) -> Result<Option<String>, UppError> {
    let args = ctx.arguments();
    let [arg] = args.as_slice() else {
        let node = ctx.node();
        return Err(ctx.error(&node, "@require takes exactly one header name"));
    };
    let Some(header) = (arg.kind() == "string_literal")
        .then(|| unquote(arg.text()))
        .flatten()
        .filter(|h| !h.is_empty())
    else {
        return Err(ctx.error(arg, "expected a header name as a string literal"));
    };
    let path = if header.starts_with('<') && header.ends_with('>') {
        header.to_string()
    } else {
        format!("\"{}\"", header)
    };

    if ctx.once(&format!("require:{}", path)) {
        ctx.at_root(move |root_ctx| {
            let root = root_ctx.node();
            let includes: Vec<NodeView> = root
                .named_children()
                .into_iter()
                .filter(|n| n.kind() == "preproc_include")
                .collect();
            let present = includes.iter().any(|inc| {
                inc.child_for_field_name("path")
                    .is_some_and(|p| p.text() == path)
            });
            if present {
                return Ok(());
            }
            match includes.last() {
                Some(last) => root_ctx.insert_after(last, &format!("\n#include {}", path)),
                None => root_ctx.insert(0, &format!("#include {}\n", path)),
            }
        });
    }

    if let Some(statement) = ctx.enclosing_statement() {
        ctx.replace(&statement, "")?;
    }
    Ok(Some(String::new()))
}

/// `*` for each pointer level between the declaration and `name`.
fn pointer_prefix(declaration: &NodeView, name: &str) -> String {
    for declarator in declaration
        .children()
        .into_iter()
        .filter(|c| c.field_name() == Some("declarator"))
    {
        let mut current = Some(declarator);
        let mut depth = 0;
        while let Some(node) = current {
            match node.kind() {
                "identifier" if node.text() == name => return "*".repeat(depth),
                "pointer_declarator" => depth += 1,
                _ => {}
            }
            current = node.child_for_field_name("declarator");
        }
    }
    String::new()
}

fn expand_swap(ctx: &mut ExpansionContext<'_>) -> Result<Option<String>, UppError> {
    let args = ctx.arguments();
    let [a, b] = args.as_slice() else {
        let node = ctx.node();
        return Err(ctx.error(&node, "@swap takes exactly two variables"));
    };
    let left = expect_identifier(ctx, a)?;
    let right = expect_identifier(ctx, b)?;

    let Some(declaration) = ctx.resolve_symbol(&left, a) else {
        return Err(ctx.error(a, format!("no declaration of `{}` in scope", left)));
    };
    let Some(ty) = declaration.child_for_field_name("type") else {
        return Err(ctx.error(&declaration, "cannot tell the type of this declaration"));
    };
    let declared = code!("{} {}", ty.text(), pointer_prefix(&declaration, &left));
    let tmp = ctx.create_unique_identifier("swap_tmp");

    let decl_tmp = tmp.clone();
    ctx.in_scope(move |scope| {
        let block = scope.node();
        let opening = block
            .child(0)
            .filter(|c| c.kind() == "{")
            .ok_or_else(|| scope.error(&block, "@swap must be used inside a block"))?;
        scope.insert_after(&opening, &format!(" {}{};", declared, decl_tmp))
    });

    Ok(Some(
        code!("{tmp} = {left}; {left} = {right}; {right} = {tmp}").into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_escaped_for_c() {
        assert_eq!(escape_c_string(r#"say "hi"\n"#), r#""say \"hi\"\\n""#);
        assert_eq!(unquote("\"a.h\""), Some("a.h"));
        assert_eq!(unquote("a.h"), None);
    }
}
