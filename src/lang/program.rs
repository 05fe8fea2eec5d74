use crate::lang::stmt::Stmt;

/// Parsed assembly program.
///
/// Statement order is significant: it is the order the generator walks and
/// therefore the order the emitted code executes in.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}
