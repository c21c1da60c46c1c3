//! Parser implementation
//!
//! On a syntactic mismatch the parser reports the offending token and its
//! location, drops the subtree under construction, and resynchronizes at the
//! next statement boundary. Null subtrees are discarded by their parent.

use crate::ast::*;
use crate::precedence;
use log::debug;
use newj_common::{Diagnostics, Span, Spanned};
use newj_lexer::{Token, TokenType, TokenUtils};
use smallvec::SmallVec;

/// Parser for the NewJ language
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    diagnostics: Diagnostics,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0, diagnostics: Diagnostics::new() }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::new();

        self.skip_separators();
        while !self.at_end() {
            let before = self.current;
            if let Some(item) = self.parse_top_level() {
                let span = item.span;
                let id = item.identifier().to_string();
                if program.add_item(item).is_err() {
                    self.diagnostics
                        .warning(format!("top-level item '{}' already exists", id), span);
                }
            }
            if self.current == before && !self.at_end() {
                // Whatever confused us did not get consumed; skip it rather
                // than loop forever.
                self.advance();
            }
            self.skip_separators();
        }

        debug!("parsed {} top-level items", program.items.len());
        program
    }

    fn parse_top_level(&mut self) -> Option<Item> {
        match self.peek_type() {
            TokenType::KeywordFunc => self.parse_function(),
            TokenType::KeywordConst => {
                let start = self.current_span();
                let decl = self.parse_var_decl(VarDeclKind::GlobalConst)?;
                let span = start.combine(decl.value.span);
                Some(Item { kind: ItemKind::Const(decl), span })
            }
            TokenType::KeywordStruct => self.parse_struct(),
            other => {
                let message = format!("token '{}' cannot start a top level item", other);
                let span = self.current_span();
                self.diagnostics.warning(message, span);
                self.recover_to_boundary();
                None
            }
        }
    }

    fn parse_function(&mut self) -> Option<Item> {
        let start = self.current_span();
        self.advance(); // func

        let name = self.expect_identifier("function name")?;

        let mut params = SmallVec::new();
        if *self.peek_type() == TokenType::LeftParen {
            params = self.parse_params()?;
        }

        let written_type = if *self.peek_type() == TokenType::Colon {
            self.advance();
            Some(self.expect_type_name()?)
        } else {
            None
        };

        let body = self.parse_statement()?;
        let span = start.combine(body.span);

        Some(Item {
            kind: ItemKind::Function(Function {
                name: OptTyped { name, written_type },
                params,
                body,
            }),
            span,
        })
    }

    fn parse_params(&mut self) -> Option<SmallVec<[Parameter; 4]>> {
        self.expect(TokenType::LeftParen)?;

        let mut params = SmallVec::new();
        if *self.peek_type() == TokenType::RightParen {
            self.advance();
            return Some(params);
        }

        loop {
            let name = self.expect_identifier("parameter name")?;
            self.expect(TokenType::Colon)?;
            let ty = self.expect_type_name()?;
            params.push(Parameter { span: name.span.combine(ty.span), name, ty });

            match self.peek_type() {
                TokenType::Comma => {
                    self.advance();
                }
                TokenType::RightParen => {
                    self.advance();
                    break;
                }
                other => {
                    let message = format!("expected ',' or ')' in parameter list, found '{}'", other);
                    let span = self.current_span();
                    self.diagnostics.warning(message, span);
                    return None;
                }
            }
        }

        Some(params)
    }

    fn parse_struct(&mut self) -> Option<Item> {
        let start = self.current_span();
        self.advance(); // struct

        let name = self.expect_identifier("struct name")?;
        self.expect(TokenType::LeftBrace)?;

        let mut fields = Vec::new();
        loop {
            self.skip_separators();
            if *self.peek_type() == TokenType::RightBrace {
                break;
            }
            if self.at_end() {
                self.diagnostics.warning("unterminated struct declaration", start);
                break;
            }
            let field_name = self.expect_identifier("field name")?;
            self.expect(TokenType::Colon)?;
            let ty = self.expect_type_name()?;
            fields.push((field_name, ty));
        }
        let end = self.current_span();
        if *self.peek_type() == TokenType::RightBrace {
            self.advance();
        }

        Some(Item {
            kind: ItemKind::Struct(StructDecl { name, fields }),
            span: start.combine(end),
        })
    }

    /// Parse a single statement. On failure the cursor is moved to the next
    /// statement boundary and `None` is returned.
    fn parse_statement(&mut self) -> Option<Stmt> {
        // Blank lines before a statement are silently consumed.
        self.skip_separators();

        let result = match self.peek_type() {
            TokenType::LeftBrace => self.parse_block(),
            TokenType::KeywordIf => self.parse_if(),
            TokenType::KeywordWhile => self.parse_while(),
            TokenType::KeywordReturn => self.parse_return(),
            TokenType::KeywordLet => self.parse_decl_stmt(VarDeclKind::Let),
            TokenType::KeywordConst => self.parse_decl_stmt(VarDeclKind::Const),
            TokenType::Identifier(_) => self.parse_assign_or_call(),
            other => {
                let message = format!("unexpected token '{}' in statement position", other);
                let span = self.current_span();
                self.diagnostics.warning(message, span);
                None
            }
        };

        if result.is_none() {
            self.recover_to_boundary();
        }
        result
    }

    fn parse_block(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // {

        let mut stmts = Vec::new();
        let end;
        loop {
            self.skip_separators();
            match self.peek_type() {
                TokenType::RightBrace => {
                    end = self.current_span();
                    self.advance();
                    break;
                }
                TokenType::EndOfFile => {
                    self.diagnostics.warning("unterminated block", start);
                    end = self.current_span();
                    break;
                }
                _ => {
                    let before = self.current;
                    if let Some(stmt) = self.parse_statement() {
                        stmts.push(stmt);
                    } else if self.current == before {
                        self.advance();
                    }
                }
            }
        }

        Some(Stmt { kind: StmtKind::Block(stmts), span: start.combine(end) })
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // if

        self.expect(TokenType::LeftParen)?;
        let cond = self.parse_expr_top()?;
        self.expect(TokenType::RightParen)?;

        let then_block = Box::new(self.parse_statement()?);

        // The else may sit on the following line.
        let saved = self.current;
        self.skip_separators();
        let else_block = if *self.peek_type() == TokenType::KeywordElse {
            self.advance();
            let else_stmt = if *self.peek_type() == TokenType::KeywordIf {
                self.parse_if()?
            } else {
                self.parse_statement()?
            };
            Some(Box::new(else_stmt))
        } else {
            self.current = saved;
            None
        };

        let end_span = else_block.as_ref().map(|e| e.span).unwrap_or(then_block.span);
        Some(Stmt {
            kind: StmtKind::If { cond, then_block, else_block },
            span: start.combine(end_span),
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.advance(); // while

        self.expect(TokenType::LeftParen)?;
        let condition = self.parse_expr_top()?;
        self.expect(TokenType::RightParen)?;

        let body = Box::new(self.parse_statement()?);
        let span = start.combine(body.span);
        Some(Stmt { kind: StmtKind::While { condition, body }, span })
    }

    fn parse_return(&mut self) -> Option<Stmt> {
        let ret_span = self.current_span();
        self.advance(); // return

        let value = match self.peek_type() {
            TokenType::Newline
            | TokenType::Semicolon
            | TokenType::RightBrace
            | TokenType::EndOfFile => None,
            _ => Some(self.parse_expr_top()?),
        };

        // The statement's span starts at the return keyword even when a
        // value is present.
        let span = value.as_ref().map(|v| ret_span.combine(v.span)).unwrap_or(ret_span);
        Some(Stmt { kind: StmtKind::Return(value), span })
    }

    fn parse_decl_stmt(&mut self, kind: VarDeclKind) -> Option<Stmt> {
        let start = self.current_span();
        let decl = self.parse_var_decl(kind)?;
        let span = start.combine(decl.value.span);
        Some(Stmt { kind: StmtKind::Decl(decl), span })
    }

    fn parse_var_decl(&mut self, kind: VarDeclKind) -> Option<VarDecl> {
        self.advance(); // let or const

        let name = self.expect_identifier("variable name")?;
        let written_type = if *self.peek_type() == TokenType::Colon {
            self.advance();
            Some(self.expect_type_name()?)
        } else {
            None
        };

        self.expect(TokenType::Assign)?;
        let value = self.parse_expr_top()?;

        Some(VarDecl { kind, name: OptTyped { name, written_type }, value })
    }

    fn parse_assign_or_call(&mut self) -> Option<Stmt> {
        let expr = self.parse_expr_top()?;

        if self.current_token().is_assign_op() {
            let op = match self.peek_type() {
                TokenType::PlusAssign => Some(BinaryOp::Add),
                TokenType::MinusAssign => Some(BinaryOp::Sub),
                TokenType::StarAssign => Some(BinaryOp::Mul),
                _ => None, // plain '='
            };
            self.advance();
            let value = self.parse_expr_top()?;
            let span = expr.span.combine(value.span);
            return Some(Stmt { kind: StmtKind::Assign { dest: expr, op, value }, span });
        }

        if matches!(expr.kind, ExprKind::Call { .. }) {
            return Some(Stmt { span: expr.span, kind: StmtKind::Call(expr) });
        }

        let span = self.current_span();
        self.diagnostics.warning(
            format!("expected assignment or call, found '{}'", self.peek_type()),
            span,
        );
        None
    }

    fn parse_expr_top(&mut self) -> Option<Expr> {
        self.parse_expr(0)
    }

    /// Precedence-climbing expression parser. A `(` after any subexpression
    /// turns it into the callee of a call.
    fn parse_expr(&mut self, min_prec: u8) -> Option<Expr> {
        let mut lhs = self.parse_primary()?;

        loop {
            if *self.peek_type() == TokenType::LeftParen {
                lhs = self.parse_call_tail(lhs)?;
                continue;
            }

            let Some(op) = precedence::binary_op(self.peek_type()) else { break };
            let prec = precedence::precedence(op);
            if prec < min_prec {
                break;
            }
            self.advance();

            let rhs = self.parse_expr(prec + 1)?;
            let span = lhs.span.combine(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                span,
            };
        }

        Some(lhs)
    }

    fn parse_call_tail(&mut self, callee: Expr) -> Option<Expr> {
        self.advance(); // (

        let mut args = Vec::new();
        if *self.peek_type() != TokenType::RightParen {
            loop {
                args.push(self.parse_expr_top()?);
                match self.peek_type() {
                    TokenType::Comma => {
                        self.advance();
                    }
                    TokenType::RightParen => break,
                    other => {
                        let message =
                            format!("expected ',' or ')' in argument list, found '{}'", other);
                        let span = self.current_span();
                        self.diagnostics.warning(message, span);
                        return None;
                    }
                }
            }
        }

        // The call's span ends at the closing paren.
        let close = self.current_span();
        self.advance(); // )
        let span = callee.span.combine(close);
        Some(Expr { kind: ExprKind::Call { callee: Box::new(callee), args }, span })
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let token = self.current_token().clone();
        match token.value {
            TokenType::Int(value) => {
                self.advance();
                Some(Expr { kind: ExprKind::Literal(Literal::Int(value)), span: token.span })
            }
            TokenType::Float(text) => {
                self.advance();
                Some(Expr { kind: ExprKind::Literal(Literal::Float(text)), span: token.span })
            }
            TokenType::Str(text) => {
                self.advance();
                Some(Expr { kind: ExprKind::Literal(Literal::Str(text)), span: token.span })
            }
            TokenType::Identifier(name) => {
                self.advance();
                Some(Expr { kind: ExprKind::Variable(name), span: token.span })
            }
            TokenType::LeftParen => {
                let open = self.current_span();
                self.advance();
                let inner = self.parse_expr_top()?;
                let close = self.current_span();
                self.expect(TokenType::RightParen)?;
                Some(Expr { kind: inner.kind, span: open.combine(close) })
            }
            other => {
                self.diagnostics.warning(
                    format!("unexpected token '{}' in expression", other),
                    token.span,
                );
                None
            }
        }
    }

    // Token stream helpers

    fn current_token(&self) -> &Token {
        let index = self.current.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn peek_type(&self) -> &TokenType {
        &self.current_token().value
    }

    fn current_span(&self) -> Span {
        self.current_token().span
    }

    fn advance(&mut self) -> Token {
        let token = self.current_token().clone();
        if self.current < self.tokens.len().saturating_sub(1) {
            self.current += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        *self.peek_type() == TokenType::EndOfFile
    }

    fn skip_separators(&mut self) {
        while self.current_token().is_separator() {
            self.advance();
        }
    }

    fn expect(&mut self, expected: TokenType) -> Option<Token> {
        if *self.peek_type() == expected {
            Some(self.advance())
        } else {
            let span = self.current_span();
            self.diagnostics.warning(
                format!("expected '{}', found '{}'", expected, self.peek_type()),
                span,
            );
            None
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Option<Spanned<String>> {
        let token = self.current_token().clone();
        if let TokenType::Identifier(name) = token.value {
            self.advance();
            Some(Spanned::new(name, token.span))
        } else {
            self.diagnostics.warning(
                format!("expected {}, found '{}'", what, token.value),
                token.span,
            );
            None
        }
    }

    fn expect_type_name(&mut self) -> Option<TypeName> {
        let token = self.current_token().clone();
        let name = match &token.value {
            TokenType::KeywordInt32 => "int32".to_string(),
            TokenType::KeywordInt64 => "int64".to_string(),
            TokenType::Identifier(name) => name.clone(),
            other => {
                self.diagnostics
                    .warning(format!("expected type name, found '{}'", other), token.span);
                return None;
            }
        };
        self.advance();
        Some(TypeName { name, span: token.span })
    }

    /// Move the cursor to the next statement boundary: a separator, a `}`
    /// or end of file. The boundary token itself is not consumed.
    fn recover_to_boundary(&mut self) {
        while !matches!(
            self.peek_type(),
            TokenType::Newline | TokenType::Semicolon | TokenType::RightBrace | TokenType::EndOfFile
        ) {
            self.advance();
        }
    }
}
