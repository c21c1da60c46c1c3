//! Operator precedence for expression parsing
//!
//! Call postfix binds tightest (25) and is handled directly by the parser;
//! the binary tiers below follow C ordering for the operators the language
//! shares with it.

use crate::ast::BinaryOp;
use newj_lexer::TokenType;

/// Precedence of the call postfix form `expr(...)`.
pub const CALL_PRECEDENCE: u8 = 25;

/// Map a token to the binary operator it denotes, if any.
pub fn binary_op(token: &TokenType) -> Option<BinaryOp> {
    match token {
        TokenType::Plus => Some(BinaryOp::Add),
        TokenType::Minus => Some(BinaryOp::Sub),
        TokenType::Star => Some(BinaryOp::Mul),
        TokenType::Shl => Some(BinaryOp::Shl),
        TokenType::Shr => Some(BinaryOp::Shr),
        TokenType::BitOr => Some(BinaryOp::BitOr),
        TokenType::BitAnd => Some(BinaryOp::BitAnd),
        TokenType::BoolOr => Some(BinaryOp::BoolOr),
        TokenType::BoolAnd => Some(BinaryOp::BoolAnd),
        TokenType::Eq => Some(BinaryOp::Eq),
        TokenType::Lt => Some(BinaryOp::Lt),
        TokenType::Le => Some(BinaryOp::Le),
        TokenType::Gt => Some(BinaryOp::Gt),
        TokenType::Ge => Some(BinaryOp::Ge),
        _ => None,
    }
}

/// Binding power of a binary operator; all operators associate left.
pub fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Mul => 22,
        BinaryOp::Add | BinaryOp::Sub => 20,
        BinaryOp::Shl | BinaryOp::Shr => 18,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 15,
        BinaryOp::Eq => 12,
        BinaryOp::BitAnd => 11,
        BinaryOp::BitOr => 10,
        BinaryOp::BoolOr | BinaryOp::BoolAnd => 1,
    }
}
