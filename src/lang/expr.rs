use crate::lang::symbols::SymbolTable;

/// Operand expression in the assembly surface syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal: `5`, `0x2a`.
    Int(i64),

    /// Bare identifier, resolved through the symbol table.
    Ident(String),

    /// Bracketed address expression: `[5]`, `[cursor]`.
    ///
    /// Denotes the tape cell whose index is the value of the inner
    /// expression. It is a marker, not a value: `evaluate` refuses it, so
    /// an operand that denotes a cell can never be confused with one that
    /// denotes a count.
    AddressOf(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Identifier with no symbol-table binding.
    NotDefined(String),
    /// An address expression was evaluated without unwrapping it first.
    AddressAsValue,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::NotDefined(name) => write!(f, "'{}' is not defined", name),
            EvalError::AddressAsValue => {
                write!(f, "address expression cannot be used as a value")
            }
        }
    }
}

impl Expr {
    /// Evaluates the expression to an integer, resolving identifiers
    /// through `symbols`.
    ///
    /// # Errors
    /// - [`EvalError::NotDefined`] if an identifier has no binding.
    /// - [`EvalError::AddressAsValue`] if the expression is an
    ///   [`Expr::AddressOf`]; callers must unwrap the address marker and
    ///   evaluate the inner expression instead.
    pub fn evaluate(&self, symbols: &SymbolTable) -> Result<i64, EvalError> {
        match self {
            Expr::Int(value) => Ok(*value),
            Expr::Ident(name) => symbols
                .lookup(name)
                .ok_or_else(|| EvalError::NotDefined(name.clone()))?
                .evaluate(symbols),
            Expr::AddressOf(_) => Err(EvalError::AddressAsValue),
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Int(value) => write!(f, "{}", value),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::AddressOf(inner) => write!(f, "[{}]", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_int() {
        let symbols = SymbolTable::new();
        assert_eq!(Expr::Int(42).evaluate(&symbols), Ok(42));
    }

    #[test]
    fn test_evaluate_ident_chain() {
        let mut symbols = SymbolTable::new();
        assert!(symbols.define("a", Expr::Int(5)));
        assert!(symbols.define("b", Expr::Ident("a".to_string())));

        let expr = Expr::Ident("b".to_string());
        assert_eq!(expr.evaluate(&symbols), Ok(5));
    }

    #[test]
    fn test_evaluate_undefined() {
        let symbols = SymbolTable::new();
        let expr = Expr::Ident("missing".to_string());
        assert_eq!(
            expr.evaluate(&symbols),
            Err(EvalError::NotDefined("missing".to_string()))
        );
    }

    #[test]
    fn test_evaluate_address_fails_fast() {
        let symbols = SymbolTable::new();
        let expr = Expr::AddressOf(Box::new(Expr::Int(5)));
        assert_eq!(expr.evaluate(&symbols), Err(EvalError::AddressAsValue));
    }

    #[test]
    fn test_display() {
        let expr = Expr::AddressOf(Box::new(Expr::Ident("cursor".to_string())));
        assert_eq!(expr.to_string(), "[cursor]");
    }
}
