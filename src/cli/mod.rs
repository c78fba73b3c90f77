//! The upp Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::LevelFilter;

use crate::cli::args::{Command, UppArgs};
use crate::config::UppConfig;
use crate::errors::{print_error, SourceContext, UppError};
use crate::macros::{load_macros_from_file, Driver, MacroRegistry};
use crate::pattern::{compile, match_all, match_node};
use crate::syntax::{parse, NodeDump};
use crate::logging;

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = UppArgs::parse();
    logging::init_with_level(match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });

    let result = match args.command {
        Command::Expand {
            file,
            config,
            macros,
            trace,
            lenient,
            output,
        } => handle_expand(&file, config.as_deref(), &macros, trace, lenient, output.as_deref()),
        Command::Ast { file, json } => handle_ast(&file, json),
        Command::Match {
            file,
            pattern,
            all,
            deep,
        } => handle_match(&file, &pattern, all, deep),
        Command::ListMacros { macros } => handle_list_macros(&macros),
    };

    if let Err(e) = result {
        print_error(e);
        process::exit(1);
    }
}

fn read_source(path: &Path) -> Result<String, UppError> {
    fs::read_to_string(path).map_err(|e| UppError::io(path.display().to_string(), e))
}

fn build_driver(config: UppConfig, macro_files: &[PathBuf]) -> Result<Driver, UppError> {
    let mut registry = MacroRegistry::with_std();
    for spec in &config.macros {
        registry.register_spec(spec)?;
    }
    for path in macro_files {
        for spec in load_macros_from_file(path)? {
            registry.register_spec(&spec)?;
        }
    }
    Ok(Driver::new(registry, config))
}

/// Handles the `expand` subcommand.
fn handle_expand(
    file: &Path,
    config_path: Option<&Path>,
    macro_files: &[PathBuf],
    trace: bool,
    lenient: bool,
    output_path: Option<&Path>,
) -> Result<(), UppError> {
    let mut config = match config_path {
        Some(path) => UppConfig::load(path)?,
        None => UppConfig::default(),
    };
    if lenient {
        config.fatal_errors = false;
    }
    let driver = build_driver(config, macro_files)?;
    let name = file.display().to_string();
    let source = read_source(file)?;
    let outcome = driver.expand(&name, &source)?;

    if trace {
        output::print_trace(&source, &outcome.passes);
    }
    if !outcome.diagnostics.is_empty() {
        eprintln!(
            "{}",
            outcome
                .diagnostics
                .render(&SourceContext::from_file(name.clone(), source.clone()))
        );
    }
    match output_path {
        Some(path) => fs::write(path, &outcome.text)
            .map_err(|e| UppError::io(path.display().to_string(), e))?,
        None if !trace => print!("{}", outcome.text),
        None => {}
    }
    if outcome.diagnostics.has_errors() {
        output::print_warning(&format!(
            "{} macro error(s) left invocations unexpanded",
            outcome.diagnostics.errors().count()
        ));
    }
    Ok(())
}

/// Handles the `ast` subcommand.
fn handle_ast(file: &Path, json: bool) -> Result<(), UppError> {
    let source = read_source(file)?;
    let tree = parse(&source);
    if let Some(failure) = tree.error() {
        let context = SourceContext::from_file(file.display().to_string(), source.clone());
        return Err(UppError::parse(&context, failure.message.clone(), failure.span));
    }
    let root = tree.root_node();
    if json {
        let dump = NodeDump::from(&root);
        let text = serde_json::to_string_pretty(&dump)
            .map_err(|e| UppError::internal(format!("cannot serialize tree: {}", e)))?;
        println!("{}", text);
    } else {
        println!("{}", root.to_sexp());
    }
    Ok(())
}

/// Handles the `match` subcommand.
fn handle_match(file: &Path, pattern: &str, all: bool, deep: bool) -> Result<(), UppError> {
    let source = read_source(file)?;
    let compiled = compile(pattern)?;
    let tree = parse(&source);
    let root = tree.root_node();
    let matches = if all {
        match_all(&root, &compiled, deep)
    } else {
        match_node(&root, &compiled, deep).into_iter().collect()
    };
    if matches.is_empty() {
        output::print_warning(&format!("no match for `{}`", pattern));
    }
    print!("{}", output::format_matches(&source, &matches));
    Ok(())
}

/// Handles the `list-macros` subcommand.
fn handle_list_macros(macro_files: &[PathBuf]) -> Result<(), UppError> {
    let driver = build_driver(UppConfig::default(), macro_files)?;
    let registry = driver.registry();
    for name in registry.names() {
        let kind = match registry.get(name) {
            Some(def) if def.is_native() => "native",
            _ => "pattern",
        };
        println!("@{:<16} {}", name, kind);
    }
    Ok(())
}
