/// Errors detected while loading a program into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// No program bytes were supplied.
    NoMemory,
    /// Loop open/close counts differ across the raw input.
    BracketImbalance,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NoMemory => write!(f, "program memory not initialized"),
            LoadError::BracketImbalance => {
                write!(f, "loop start/end markers are out of balance")
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Fatal error during execution.
#[derive(Debug)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(msg: &str) -> Self {
        RuntimeError {
            message: msg.to_string(),
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}
