//! Axiom-checking compiler. A single recursive walk of the AST, checking
//! every static axiom in one pass rather than running each as a separate
//! traversal. The checked `Program` is the same AST the runtime dispatches
//! on — axiom-checking validates it in place rather than lowering to a
//! second representation.

use crate::ast::{Program, Stmt};
use crate::error::AxiomViolation;
use std::collections::HashSet;

const MAX_LOOP_BOUND: u64 = 1_000_000;

struct Checker {
    declared_speakers: HashSet<String>,
}

pub fn compile(program: Program) -> Result<Program, AxiomViolation> {
    let mut checker = Checker {
        declared_speakers: HashSet::new(),
    };
    collect_speaker_decls(&program, &mut checker.declared_speakers);
    checker.check_block(&program, None, false, &[])?;
    Ok(program)
}

fn collect_speaker_decls(stmts: &[Stmt], out: &mut HashSet<String>) {
    for stmt in stmts {
        if let Stmt::SpeakerDecl { name, .. } = stmt {
            out.insert(name.clone());
        }
    }
}

/// Declarations are legal at the pre-speaker top level; everything else
/// must run inside an `as` block or a function body.
fn is_declaration(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::SpeakerDecl { .. } | Stmt::WorldDecl { .. } | Stmt::FnDef { .. })
}

impl Checker {
    /// `current_speaker` is `Some(name)` only inside an `as <literal
    /// identifier>` block; used for the write-ownership axiom. `in_scope`
    /// is true once an `as` block or a function body has been entered —
    /// outside of it, only declarations are legal (speaker requirement).
    /// `sealed_in_scope` accumulates names sealed earlier in the same
    /// block, for seal immutability.
    fn check_block(
        &self,
        stmts: &[Stmt],
        current_speaker: Option<&str>,
        in_scope: bool,
        outer_sealed: &[String],
    ) -> Result<(), AxiomViolation> {
        let mut sealed_in_scope: Vec<String> = outer_sealed.to_vec();

        for stmt in stmts {
            if !in_scope && !is_declaration(stmt) {
                return Err(self.violate(
                    1,
                    "speaker_requirement",
                    stmt.line(),
                    "non-declaration statement must appear inside an `as` block or a function body",
                ));
            }

            match stmt {
                Stmt::FnDef { body, .. } => {
                    self.check_block(body, current_speaker, true, &[])?;
                }
                Stmt::AsBlock { speaker, body, .. } => {
                    let speaker_name = literal_speaker_name(speaker);
                    self.check_block(body, speaker_name.as_deref(), true, &[])?;
                }
                Stmt::While { max, body, line } => {
                    if *max == 0 || *max > MAX_LOOP_BOUND {
                        return Err(self.violate(
                            9,
                            "bounded_loops",
                            *line,
                            &format!("loop max must be between 1 and {MAX_LOOP_BOUND}, got {max}"),
                        ));
                    }
                    self.check_block(body, current_speaker, in_scope, &[])?;
                }
                Stmt::If { branches, else_body, .. } => {
                    for (_, body) in branches {
                        self.check_block(body, current_speaker, in_scope, &sealed_in_scope)?;
                    }
                    self.check_block(else_body, current_speaker, in_scope, &sealed_in_scope)?;
                }
                Stmt::When {
                    when_body,
                    otherwise_body,
                    broken_body,
                    ..
                } => {
                    self.check_block(when_body, current_speaker, in_scope, &sealed_in_scope)?;
                    self.check_block(otherwise_body, current_speaker, in_scope, &sealed_in_scope)?;
                    self.check_block(broken_body, current_speaker, in_scope, &sealed_in_scope)?;
                }
                Stmt::Request { target, line, .. } => {
                    if let Some(name) = literal_speaker_name(target) {
                        if !self.declared_speakers.contains(&name) {
                            return Err(self.violate(
                                1,
                                "speaker_requirement",
                                *line,
                                &format!("request target '{name}' is not a declared speaker"),
                            ));
                        }
                    }
                }
                Stmt::Seal { target, .. } => {
                    if let Some(speaker) = current_speaker {
                        self.check_write_ownership(target, speaker, stmt.line())?;
                    }
                    sealed_in_scope.push(target.base.clone());
                }
                Stmt::Let { target, line, .. } => {
                    if let Some(speaker) = current_speaker {
                        self.check_write_ownership(target, speaker, *line)?;
                    }
                    if sealed_in_scope.contains(&target.base) {
                        return Err(self.violate(
                            5,
                            "seal_immutability",
                            *line,
                            &format!("'{}' was sealed earlier in this block and cannot be written again", target.base),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_write_ownership(&self, target: &crate::ast::LValue, current_speaker: &str, line: usize) -> Result<(), AxiomViolation> {
        if let Some(prefix) = target.base.split('.').next() {
            if prefix != current_speaker && self.declared_speakers.contains(prefix) {
                return Err(self.violate(
                    8,
                    "write_ownership",
                    line,
                    &format!("speaker '{current_speaker}' cannot write into '{prefix}'s namespace"),
                ));
            }
        }
        Ok(())
    }

    fn violate(&self, axiom_number: u8, axiom_name: &str, line: usize, message: &str) -> AxiomViolation {
        AxiomViolation {
            axiom_number,
            axiom_name: axiom_name.to_string(),
            line,
            message: message.to_string(),
        }
    }
}

fn literal_speaker_name(expr: &crate::ast::Expr) -> Option<String> {
    match expr {
        crate::ast::Expr::Identifier(name) => Some(name.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn compile_source(src: &str) -> Result<Program, AxiomViolation> {
        compile(parse(tokenize(src).unwrap()).unwrap())
    }

    #[test]
    fn while_with_zero_max_is_rejected() {
        let err = compile_source("speaker A\nas A {\nwhile true max 0 {\npass\n}\n}\n").unwrap_err();
        assert_eq!(err.axiom_name, "bounded_loops");
        assert_eq!(err.axiom_number, 9);
    }

    #[test]
    fn bare_statement_outside_as_block_is_rejected() {
        let err = compile_source("let x = 5\n").unwrap_err();
        assert_eq!(err.axiom_name, "speaker_requirement");
        assert_eq!(err.axiom_number, 1);
    }

    #[test]
    fn request_to_undeclared_speaker_is_rejected() {
        let err = compile_source("speaker A\nas A {\nrequest Bob \"help\"\n}\n").unwrap_err();
        assert_eq!(err.axiom_name, "speaker_requirement");
        assert_eq!(err.axiom_number, 1);
    }

    #[test]
    fn request_to_declared_speaker_compiles() {
        compile_source("speaker A\nspeaker Bob\nas A {\nrequest Bob \"help\"\n}\n").unwrap();
    }

    #[test]
    fn write_after_seal_in_same_block_is_rejected() {
        let err = compile_source("speaker A\nas A {\nlet quota = 10\nseal quota\nlet quota = 0\n}\n").unwrap_err();
        assert_eq!(err.axiom_name, "seal_immutability");
        assert_eq!(err.axiom_number, 5);
    }

    #[test]
    fn cross_speaker_write_in_as_block_is_rejected() {
        let err = compile_source("speaker teacher\nspeaker student\nas teacher {\nlet student.grade = 1\n}\n").unwrap_err();
        assert_eq!(err.axiom_name, "write_ownership");
        assert_eq!(err.axiom_number, 8);
    }

    #[test]
    fn cross_speaker_write_nested_in_if_is_rejected() {
        let err = compile_source(
            "speaker teacher\nspeaker student\nas teacher {\nif true {\nlet student.grade = 1\n}\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.axiom_name, "write_ownership");
    }

    #[test]
    fn well_formed_program_compiles() {
        let program = compile_source("speaker teacher\nas teacher {\nlet grade = 1\n}\n").unwrap();
        assert_eq!(program.len(), 2);
    }
}
