use std::collections::HashMap;

use crate::diag::{AsmErrorKind, SourceLoc};
use crate::token::Token;

/// A text-substitution macro: the name expands to its replacement tokens
/// verbatim wherever it appears as an identifier.
#[derive(Debug, Clone)]
pub struct Macro {
    /// Tokens the name expands to.
    pub replacement: Vec<Token>,
    /// Where the macro was defined, for diagnostics.
    pub defined_at: SourceLoc,
}

/// Macros live from their `.define` until end of input or a matching
/// `.undef`. Loop variables come and go through the same table.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a macro. Redefinition is an error; `.undef` first.
    pub fn define(
        &mut self,
        name: &str,
        replacement: Vec<Token>,
        defined_at: SourceLoc,
    ) -> Result<(), AsmErrorKind> {
        if let Some(existing) = self.macros.get(name) {
            tracing::debug!(
                %name,
                first_defined_at = %existing.defined_at,
                "macro redefinition rejected"
            );
            return Err(AsmErrorKind::MacroRedefinition(name.to_owned()));
        }
        self.macros.insert(
            name.to_owned(),
            Macro {
                replacement,
                defined_at,
            },
        );
        Ok(())
    }

    /// Define or replace without the redefinition check. Loop variables are
    /// redefined on every iteration.
    pub fn define_loop_variable(
        &mut self,
        name: &str,
        value: i64,
        loc: SourceLoc,
    ) {
        self.macros.insert(
            name.to_owned(),
            Macro {
                replacement: vec![Token::synthetic_int(value, loc.clone())],
                defined_at: loc,
            },
        );
    }

    /// Remove a macro. Returns false when the name was not defined, which
    /// callers report as a warning rather than an error.
    pub fn undefine(&mut self, name: &str) -> bool {
        self.macros.remove(name).is_some()
    }

    /// Whether a macro with this name exists.
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Replacement tokens for `name`, if defined.
    pub fn lookup(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }
}
