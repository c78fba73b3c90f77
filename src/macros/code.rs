//! Generated code fragments
//!
//! [`Code`] is what native macros build their output with. The text is kept
//! as written; a syntax tree is parsed on first request only, which lets
//! macros check that what they produce is well-formed.

use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::syntax::{parse, Tree};

#[derive(Clone, Default)]
pub struct Code {
    text: String,
    tree: OnceCell<Rc<Tree>>,
}

impl Code {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tree: OnceCell::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The fragment parsed as a translation unit.
    pub fn tree(&self) -> &Rc<Tree> {
        self.tree.get_or_init(|| parse(&self.text))
    }

    pub fn is_well_formed(&self) -> bool {
        !self.tree().has_error()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Code").field("text", &self.text).finish()
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.text
    }
}

impl From<String> for Code {
    fn from(text: String) -> Self {
        Code::new(text)
    }
}

impl From<&str> for Code {
    fn from(text: &str) -> Self {
        Code::new(text)
    }
}

/// Builds a [`Code`] fragment with `format!` syntax.
#[macro_export]
macro_rules! code {
    ($($arg:tt)*) => {
        $crate::macros::Code::new(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_parses_lazily() {
        let name = "tmp_1";
        let code = crate::code!("int {} = {};", name, 3);
        assert_eq!(code.as_str(), "int tmp_1 = 3;");
        assert!(code.is_well_formed());
        assert_eq!(
            code.tree().root_node().named_child(0).map(|n| n.kind().to_string()),
            Some("declaration".to_string())
        );
    }

    #[test]
    fn malformed_fragments_are_detected() {
        assert!(!Code::from("int = ;").is_well_formed());
        assert_eq!(String::from(Code::from("x;")), "x;");
    }
}
