use std::collections::HashMap;

use crate::lang::expr::Expr;

/// Name bindings produced by `const` instructions.
///
/// Bindings are single-assignment: a name may be defined at most once, and
/// `define` refuses to overwrite an existing binding.
#[derive(Debug, Default)]
pub struct SymbolTable {
    table: HashMap<String, Expr>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value`. Returns `false` (leaving the existing
    /// binding untouched) if the name is already defined.
    pub fn define(&mut self, name: &str, value: Expr) -> bool {
        if self.table.contains_key(name) {
            return false;
        }
        self.table.insert(name.to_string(), value);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Expr> {
        self.table.get(name)
    }
}
