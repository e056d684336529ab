use thiserror::Error;

use super::LuaStatus;

/// Failure surfaced to the native caller.
///
/// Interpreter failures carry the message the runtime left on the stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LuaError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("memory error: {0}")]
    Memory(String),
    #[error("error in error handling: {0}")]
    Handler(String),
    #[error("cannot load file: {0}")]
    File(String),
    #[error("attempt to yield across the native boundary")]
    Yield,
    #[error("name {0:?} contains a NUL byte")]
    InvalidName(String),
    #[error("interpreter instance is closed")]
    Closed,
    #[error("no host context registered for this interpreter")]
    MissingContext,
}

impl LuaError {
    /// Build the error matching a non-`Ok` status.
    pub fn from_status(status: LuaStatus, message: String) -> Self {
        match status {
            LuaStatus::SyntaxError => LuaError::Syntax(message),
            LuaStatus::MemoryError => LuaError::Memory(message),
            LuaStatus::HandlerError => LuaError::Handler(message),
            LuaStatus::FileError => LuaError::File(message),
            LuaStatus::Yield => LuaError::Yield,
            LuaStatus::Ok | LuaStatus::RuntimeError => LuaError::Runtime(message),
        }
    }

    /// Status code equivalent, for callers that speak the C API's codes.
    pub fn status(&self) -> LuaStatus {
        match self {
            LuaError::Syntax(_) => LuaStatus::SyntaxError,
            LuaError::Memory(_) => LuaStatus::MemoryError,
            LuaError::Handler(_) => LuaStatus::HandlerError,
            LuaError::File(_) => LuaStatus::FileError,
            LuaError::Yield => LuaStatus::Yield,
            LuaError::Runtime(_)
            | LuaError::InvalidName(_)
            | LuaError::Closed
            | LuaError::MissingContext => LuaStatus::RuntimeError,
        }
    }

    /// The interpreter's own message, when there is one.
    pub fn message(&self) -> Option<&str> {
        match self {
            LuaError::Syntax(m)
            | LuaError::Runtime(m)
            | LuaError::Memory(m)
            | LuaError::Handler(m)
            | LuaError::File(m) => Some(m),
            _ => None,
        }
    }
}
