use crate::lang::expr::Expr;

/// A single parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Instruction line with up to two operands: `inc [0], 5`.
    Instr {
        name: String,
        dst: Option<Expr>,
        src: Option<Expr>,
    },

    /// Label line: `name:`.
    ///
    /// A label does not generate anything by itself; it binds the name to
    /// the value of the next `const` instruction and is then consumed.
    Label(String),
}
