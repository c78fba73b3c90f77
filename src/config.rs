//! Run configuration
//!
//! ```yaml
//! max_passes: 64
//! transparent_comments: true
//! fatal_errors: true
//! advise_upward_navigation: true
//! macros:
//!   - name: double
//!     pattern: "$n"
//!     template: "($n)*2"
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::UppError;
use crate::macros::loader::check_duplicates;
use crate::macros::MacroSpec;

pub const DEFAULT_MAX_PASSES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UppConfig {
    /// Upper bound on expansion passes before giving up.
    pub max_passes: usize,
    /// Comments between an invocation and the next node do not block
    /// `consume()` from taking a pending sibling invocation.
    pub transparent_comments: bool,
    /// Abort the run on the first macro error instead of recording it.
    pub fatal_errors: bool,
    pub advise_upward_navigation: bool,
    pub macros: Vec<MacroSpec>,
}

impl Default for UppConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            transparent_comments: true,
            fatal_errors: true,
            advise_upward_navigation: true,
            macros: Vec::new(),
        }
    }
}

impl UppConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, UppError> {
        let config: UppConfig =
            serde_yaml::from_str(source).map_err(|e| UppError::Config(e.to_string()))?;
        if config.max_passes == 0 {
            return Err(UppError::Config("max_passes must be at least 1".to_string()));
        }
        check_duplicates(&config.macros)?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, UppError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let source = fs::read_to_string(&path).map_err(|e| UppError::io(path_str.clone(), e))?;
        Self::from_yaml_str(&source).map_err(|e| match e {
            UppError::Config(message) => UppError::Config(format!("{}: {}", path_str, message)),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = UppConfig::from_yaml_str("fatal_errors: false\n").expect("parses");
        assert!(!config.fatal_errors);
        assert_eq!(config.max_passes, DEFAULT_MAX_PASSES);
        assert!(config.transparent_comments);
        assert!(config.macros.is_empty());
    }

    #[test]
    fn inline_macros_are_read() {
        let config = UppConfig::from_yaml_str(
            "macros:\n  - name: neg\n    pattern: \"$x\"\n    template: \"-($x)\"\n",
        )
        .expect("parses");
        assert_eq!(config.macros.len(), 1);
        assert_eq!(config.macros[0].template, "-($x)");
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(
            UppConfig::from_yaml_str("max_passes: 0\n"),
            Err(UppError::Config(_))
        ));
        assert!(matches!(
            UppConfig::from_yaml_str("max_pases: 3\n"),
            Err(UppError::Config(_))
        ));
    }
}
