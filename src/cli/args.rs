//! Defines the command-line arguments and subcommands for the upp CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "upp",
    version,
    about = "An AST-level macro preprocessor for C."
)]
pub struct UppArgs {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand every macro invocation in a file.
    Expand {
        /// The C source file to expand.
        #[arg(required = true)]
        file: PathBuf,
        /// YAML run configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        /// YAML file of pattern macros. May be repeated.
        #[arg(long = "macros")]
        macros: Vec<PathBuf>,
        /// Print the text after each pass as a diff.
        #[arg(long)]
        trace: bool,
        /// Record macro errors and keep going instead of stopping.
        #[arg(long)]
        lenient: bool,
        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the syntax tree of a file.
    Ast {
        #[arg(required = true)]
        file: PathBuf,
        /// Dump the tree as JSON instead of an s-expression.
        #[arg(long)]
        json: bool,
    },
    /// Match a structural pattern against a file.
    Match {
        #[arg(required = true)]
        file: PathBuf,
        /// The pattern, e.g. `$fn($args__until)`.
        #[arg(short, long)]
        pattern: String,
        /// Report every match instead of the first.
        #[arg(long)]
        all: bool,
        /// Search the whole tree rather than matching at the root only.
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        deep: bool,
    },
    /// List the available macros.
    ListMacros {
        /// Also list the pattern macros in these files.
        #[arg(long = "macros")]
        macros: Vec<PathBuf>,
    },
}
