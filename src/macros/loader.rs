//! Pattern macro loading
//!
//! Pattern macros are declared in YAML:
//!
//! ```yaml
//! macros:
//!   - name: double
//!     pattern: "$n"
//!     template: "($n)*2"
//! ```
//!
//! Duplicate names within one file are rejected.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::UppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroSpec {
    pub name: String,
    pub pattern: String,
    pub template: String,
}

#[derive(Debug, Default, Deserialize)]
struct MacroFile {
    #[serde(default)]
    macros: Vec<MacroSpec>,
}

/// Parses pattern macro specs from YAML text.
pub fn parse_macros_from_str(source: &str) -> Result<Vec<MacroSpec>, UppError> {
    let file: MacroFile =
        serde_yaml::from_str(source).map_err(|e| UppError::Config(format!("macro file: {}", e)))?;
    check_duplicates(&file.macros)?;
    Ok(file.macros)
}

/// Loads pattern macro specs from a YAML file.
pub fn load_macros_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<MacroSpec>, UppError> {
    let path_str = path.as_ref().to_string_lossy().to_string();
    let source = fs::read_to_string(&path).map_err(|e| UppError::io(path_str.clone(), e))?;
    parse_macros_from_str(&source).map_err(|e| match e {
        UppError::Config(message) => UppError::Config(format!("{}: {}", path_str, message)),
        other => other,
    })
}

pub(crate) fn check_duplicates(specs: &[MacroSpec]) -> Result<(), UppError> {
    let mut seen = HashSet::new();
    for spec in specs {
        let name = spec.name.trim_start_matches('@');
        if name.is_empty() {
            return Err(UppError::Config("macro with an empty name".to_string()));
        }
        if !seen.insert(name) {
            return Err(UppError::Config(format!("macro '{}' is defined twice", name)));
        }
    }
    Ok(())
}
