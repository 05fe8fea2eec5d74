use crate::lang::expr::EvalError;

/// Errors raised while generating tape-machine text.
///
/// Generation is all-or-nothing: the first error aborts the whole
/// compilation and no partial output escapes.
#[derive(Debug, Clone, PartialEq)]
pub enum GenError {
    /// An operand was missing, extra, or of the wrong kind.
    OperandMismatch { instr: String, reason: String },

    /// Identifier with no symbol-table binding.
    NotDefined { name: String },

    /// A `const` tried to rebind an already-defined name.
    DuplicateConst { name: String },

    /// A `const` with no label line before it.
    MissingLabel,

    /// Instruction name not in the instruction table.
    UnknownInstruction { name: String },

    /// `endwhile`/`else`/`endif` with no matching open construct.
    LoopUnderflow { instr: String },

    /// `while`/`if` constructs still open when generation finished.
    UnclosedLoop { depth: usize },

    /// An address expression was evaluated as a plain value.
    AddressAsValue,
}

impl GenError {
    pub fn operand(instr: &str, reason: &str) -> Self {
        GenError::OperandMismatch {
            instr: instr.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn duplicate_const(name: &str) -> Self {
        GenError::DuplicateConst {
            name: name.to_string(),
        }
    }

    pub fn unknown_instruction(name: &str) -> Self {
        GenError::UnknownInstruction {
            name: name.to_string(),
        }
    }

    pub fn loop_underflow(instr: &str) -> Self {
        GenError::LoopUnderflow {
            instr: instr.to_string(),
        }
    }
}

impl From<EvalError> for GenError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::NotDefined(name) => GenError::NotDefined { name },
            EvalError::AddressAsValue => GenError::AddressAsValue,
        }
    }
}

impl std::fmt::Display for GenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenError::OperandMismatch { instr, reason } => {
                write!(f, "codegen error: {}: {}", instr, reason)
            }
            GenError::NotDefined { name } => {
                write!(f, "codegen error: '{}' is not defined", name)
            }
            GenError::DuplicateConst { name } => {
                write!(
                    f,
                    "codegen error: const '{}' shadows an existing binding",
                    name
                )
            }
            GenError::MissingLabel => {
                write!(f, "codegen error: const must have a label before it")
            }
            GenError::UnknownInstruction { name } => {
                write!(f, "codegen error: not a valid instruction name: {}", name)
            }
            GenError::LoopUnderflow { instr } => {
                write!(f, "codegen error: {} without a matching open construct", instr)
            }
            GenError::UnclosedLoop { depth } => {
                write!(
                    f,
                    "codegen error: {} unclosed loop construct(s) at end of program",
                    depth
                )
            }
            GenError::AddressAsValue => {
                write!(
                    f,
                    "codegen error: address expression cannot be used as a value"
                )
            }
        }
    }
}

impl std::error::Error for GenError {}
