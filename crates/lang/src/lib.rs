//! Lexer, parser, AST and axiom-checking compiler for the language
//! front-end. This crate knows nothing about the trust kernel; it only
//! turns source text into a checked AST.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{BinaryOp, Expr, LValue, Program, Stmt, UnaryOp};
pub use compiler::compile;
pub use error::{AxiomViolation, LangError, LexError, ParseError, Result};
pub use lexer::tokenize;
pub use parser::parse;
pub use token::{Span, Token, TokenKind};

/// Lex, parse and axiom-check `source` in one call.
pub fn compile_source(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    let program = parse(tokens)?;
    let checked = compile(program)?;
    Ok(checked)
}
