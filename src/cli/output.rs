//! Handles all user-facing output for the CLI.
//!
//! Pass traces are printed as colored line diffs; everything else is plain
//! text or JSON on stdout. Errors go to stderr through miette.

use std::io::Write;

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::macros::PassRecord;
use crate::pattern::CaptureSet;
use crate::syntax::LineIndex;

// ============================================================================
// CORE OUTPUT FUNCTIONS: User-facing CLI output utilities
// ============================================================================

/// Prints each pass as a diff against the text before it.
pub fn print_trace(original: &str, passes: &[PassRecord]) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut previous = original.to_string();

    for pass in passes {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
        let _ = writeln!(
            stdout,
            "--- Pass {}: {} invocation(s) ---",
            pass.number, pass.expanded
        );
        let _ = stdout.reset();

        let changeset = Changeset::new(&previous, &pass.text, "\n");
        print_diff(&mut stdout, &changeset.diffs);
        previous = pass.text.clone();
        let _ = writeln!(stdout);
    }
}

/// One line per match: position, matched text, then each capture.
pub fn format_matches(source: &str, matches: &[CaptureSet]) -> String {
    let lines = LineIndex::new(source);
    let mut out = String::new();
    for captures in matches {
        let Some(matched) = captures.matched() else {
            continue;
        };
        let point = lines.point(matched.start());
        out.push_str(&format!(
            "{}:{}: {}\n",
            point.row + 1,
            point.column + 1,
            matched.text()
        ));
        for name in captures.names() {
            out.push_str(&format!(
                "  ${} = {}\n",
                name,
                captures.text(&name).unwrap_or_default()
            ));
        }
    }
    out
}

pub fn print_warning(message: &str) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
    let _ = write!(stderr, "warning");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {}", message);
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn print_diff(stdout: &mut StandardStream, diffs: &[Difference]) {
    for diff in diffs {
        match diff {
            Difference::Same(x) => {
                let _ = stdout.reset();
                for line in x.lines() {
                    let _ = writeln!(stdout, " {}", line);
                }
            }
            Difference::Add(x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
                for line in x.lines() {
                    let _ = writeln!(stdout, "+{}", line);
                }
            }
            Difference::Rem(x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
                for line in x.lines() {
                    let _ = writeln!(stdout, "-{}", line);
                }
            }
        }
    }
    let _ = stdout.reset();
}
