//! Error types for the language front-end.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("lex error at {line}:{col}: {message}")]
pub struct LexError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("parse error at {line}:{col}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

/// One of the four static axioms (speaker requirement, write ownership,
/// bounded loops, seal immutability) was violated.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("axiom {axiom_number} ({axiom_name}) violated at line {line}: {message}")]
pub struct AxiomViolation {
    pub axiom_number: u8,
    pub axiom_name: String,
    pub line: usize,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LangError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Axiom(#[from] AxiomViolation),
}

pub type Result<T> = std::result::Result<T, LangError>;
