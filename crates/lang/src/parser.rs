//! Recursive-descent parser. The statement dispatch and the expression
//! precedence chain (or → and → not → comparison → addition →
//! multiplication → unary → postfix → primary) are each one method.

use crate::ast::{BinaryOp, Expr, LValue, Program, Stmt, UnaryOp};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> PResult<Program> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.is_eof() {
            stmts.push(self.parse_statement()?);
            self.consume_terminator()?;
        }
        Ok(stmts)
    }

    // --- token stream plumbing -------------------------------------------

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].span.line
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(&format!("expected identifier, found {other:?}"))),
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let span = self.tokens[self.pos].span;
        ParseError {
            line: span.line,
            col: span.col,
            message: message.to_string(),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// A statement ends at a newline or at the start of a block's closing
    /// brace — both are valid terminators.
    fn consume_terminator(&mut self) -> PResult<()> {
        if self.check(&TokenKind::RBrace) || self.is_eof() {
            return Ok(());
        }
        self.expect(TokenKind::Newline, "newline")?;
        self.skip_newlines();
        Ok(())
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        self.skip_newlines();
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            stmts.push(self.parse_statement()?);
            self.consume_terminator()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    // --- statements --------------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Speaker => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Stmt::SpeakerDecl { name, line })
            }
            TokenKind::World => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Stmt::WorldDecl { name, line })
            }
            TokenKind::As => {
                self.advance();
                let speaker = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(Stmt::AsBlock { speaker, body, line })
            }
            TokenKind::Let => {
                self.advance();
                let target = self.parse_lvalue()?;
                self.expect(TokenKind::Eq, "'='")?;
                let value = self.parse_expression()?;
                Ok(Stmt::Let { target, value, line })
            }
            TokenKind::Speak => {
                self.advance();
                let value = self.parse_expression()?;
                Ok(Stmt::Speak { value, line })
            }
            TokenKind::When => self.parse_when(line),
            TokenKind::If => self.parse_if(line),
            TokenKind::While => self.parse_while(line),
            TokenKind::Fn => self.parse_fn(line),
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.peek(), TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                Ok(Stmt::Return { value, line })
            }
            TokenKind::Request => {
                self.advance();
                let target = self.parse_expression()?;
                let action = self.parse_string_literal()?;
                let data = if matches!(self.peek(), TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                Ok(Stmt::Request { target, action, data, line })
            }
            TokenKind::Respond => {
                self.advance();
                let request_id = self.parse_expression()?;
                let accept = if self.matches(&TokenKind::Accept) {
                    true
                } else {
                    self.expect(TokenKind::Refuse, "'accept' or 'refuse'")?;
                    false
                };
                let data = if matches!(self.peek(), TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                Ok(Stmt::Respond { request_id, accept, data, line })
            }
            TokenKind::Inspect => {
                self.advance();
                let target = self.parse_expression()?;
                Ok(Stmt::Inspect { target, line })
            }
            TokenKind::History => {
                self.advance();
                let target = self.parse_expression()?;
                Ok(Stmt::History { target, line })
            }
            TokenKind::Ledger => {
                self.advance();
                let last = if self.matches(&TokenKind::Last) {
                    Some(self.parse_int_literal()?)
                } else {
                    None
                };
                Ok(Stmt::LedgerRead { last, line })
            }
            TokenKind::Verify => {
                self.advance();
                self.expect(TokenKind::Ledger, "'ledger'")?;
                Ok(Stmt::VerifyLedger { line })
            }
            TokenKind::Seal => {
                self.advance();
                let target = self.parse_lvalue()?;
                Ok(Stmt::Seal { target, line })
            }
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt::Pass { line })
            }
            TokenKind::Fail => {
                self.advance();
                Ok(Stmt::Fail { line })
            }
            _ => {
                let value = self.parse_expression()?;
                Ok(Stmt::ExprStmt { value, line })
            }
        }
    }

    fn parse_when(&mut self, line: usize) -> PResult<Stmt> {
        self.expect(TokenKind::When, "'when'")?;
        let condition = self.parse_expression()?;
        let when_body = self.parse_block()?;
        self.skip_newlines();
        let otherwise_body = if self.matches(&TokenKind::Otherwise) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        self.skip_newlines();
        let broken_body = if self.matches(&TokenKind::Broken) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::When {
            condition,
            when_body,
            otherwise_body,
            broken_body,
            line,
        })
    }

    fn parse_if(&mut self, line: usize) -> PResult<Stmt> {
        self.expect(TokenKind::If, "'if'")?;
        let mut branches = Vec::new();
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        branches.push((cond, body));
        self.skip_newlines();
        while self.check(&TokenKind::Elif) {
            self.advance();
            let cond = self.parse_expression()?;
            let body = self.parse_block()?;
            branches.push((cond, body));
            self.skip_newlines();
        }
        let else_body = if self.matches(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If { branches, else_body, line })
    }

    fn parse_while(&mut self, line: usize) -> PResult<Stmt> {
        self.expect(TokenKind::While, "'while'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Max, "'max'")?;
        let max = self.parse_int_literal()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { condition, max, body, line })
    }

    fn parse_fn(&mut self, line: usize) -> PResult<Stmt> {
        self.expect(TokenKind::Fn, "'fn'")?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.expect_identifier()?);
            while self.matches(&TokenKind::Comma) {
                params.push(self.expect_identifier()?);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(Stmt::FnDef { name, params, body, line })
    }

    fn parse_lvalue(&mut self) -> PResult<LValue> {
        let mut base = self.expect_identifier()?;
        while self.matches(&TokenKind::Dot) {
            base.push('.');
            base.push_str(&self.expect_identifier()?);
        }
        let index = if self.matches(&TokenKind::LBracket) {
            let idx = self.parse_expression()?;
            self.expect(TokenKind::RBracket, "']'")?;
            Some(idx)
        } else {
            None
        };
        Ok(LValue { base, index })
    }

    fn parse_string_literal(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.error(&format!("expected string literal, found {other:?}"))),
        }
    }

    fn parse_int_literal(&mut self) -> PResult<u64> {
        match self.peek().clone() {
            TokenKind::Integer(n) if n >= 0 => {
                self.advance();
                Ok(n as u64)
            }
            other => Err(self.error(&format!("expected non-negative integer, found {other:?}"))),
        }
    }

    // --- expressions: or -> and -> not -> comparison -> addition ->
    //     multiplication -> unary -> postfix -> primary -----------------

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.matches(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_not()?;
        while self.matches(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.matches(&TokenKind::Not) {
            let operand = self.parse_not()?;
            Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_addition()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_addition()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_addition(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplication()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplication()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.matches(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
        } else if self.matches(&TokenKind::Read) {
            let operand = self.parse_unary()?;
            Ok(Expr::Read(Box::new(operand)))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(&TokenKind::Dot) {
                let name = self.expect_identifier()?;
                expr = Expr::MemberAccess(Box::new(expr), name);
            } else if self.matches(&TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    args.push(self.parse_expression()?);
                    while self.matches(&TokenKind::Comma) {
                        args.push(self.parse_expression()?);
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.matches(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Expr::Bool(b))
            }
            TokenKind::NoneLit => {
                self.advance();
                Ok(Expr::NoneLit)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier(name))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(self.error(&format!("unexpected token in expression: {other:?}"))),
        }
    }
}

pub fn parse(tokens: Vec<Token>) -> PResult<Program> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(src: &str) -> Program {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_let_with_dotted_name_and_index() {
        let program = parse_source("let roster.scores[0] = 1\n");
        match &program[0] {
            Stmt::Let { target, .. } => {
                assert_eq!(target.base, "roster.scores");
                assert!(target.index.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn precedence_climbs_correctly() {
        let program = parse_source("speak 1 + 2 * 3\n");
        match &program[0] {
            Stmt::Speak { value, .. } => {
                assert_eq!(
                    *value,
                    Expr::Binary(
                        BinaryOp::Add,
                        Box::new(Expr::Int(1)),
                        Box::new(Expr::Binary(BinaryOp::Mul, Box::new(Expr::Int(2)), Box::new(Expr::Int(3))))
                    )
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn read_is_a_transparent_prefix() {
        let program = parse_source("speak read a.b\n");
        match &program[0] {
            Stmt::Speak { value, .. } => {
                assert!(matches!(value, Expr::Read(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn while_requires_max_clause() {
        let program = parse_source("while true max 5 {\npass\n}\n");
        match &program[0] {
            Stmt::While { max, .. } => assert_eq!(*max, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn when_otherwise_broken_all_parse() {
        let program = parse_source("when true {\npass\n} otherwise {\npass\n} broken {\nfail\n}\n");
        match &program[0] {
            Stmt::When { when_body, otherwise_body, broken_body, .. } => {
                assert_eq!(when_body.len(), 1);
                assert_eq!(otherwise_body.len(), 1);
                assert_eq!(broken_body.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn request_with_optional_data_payload() {
        let program = parse_source("request target \"help\" 42\n");
        match &program[0] {
            Stmt::Request { action, data, .. } => {
                assert_eq!(action, "help");
                assert_eq!(*data, Some(Expr::Int(42)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
