//! Errors raised while bridging a checked program onto the trust kernel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown speaker '{0}'")]
    UnknownSpeaker(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expected {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("expression used as a speaker reference must be a bare name")]
    NotASpeaker,
    #[error("value is not callable")]
    NotCallable,
    #[error("type error: {0}")]
    TypeError(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("kernel returned a broken status: {0}")]
    Kernel(kernel::Status),
    #[error(transparent)]
    World(#[from] world::WorldError),
    #[error(transparent)]
    Lang(#[from] lang::LangError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
