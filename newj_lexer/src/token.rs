//! Token definitions for the NewJ language

use newj_common::{Span, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token types in the NewJ language
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    // Literals
    Int(i64),
    Float(String), // Store as string to avoid f64 Hash/Eq issues
    Str(String),   // Contents between the quotes, escapes untouched

    // Identifiers
    Identifier(String),

    // Keywords (matched case-insensitively)
    KeywordFunc,
    KeywordConst,
    KeywordLet,
    KeywordIf,
    KeywordElse,
    KeywordWhile,
    KeywordReturn,
    KeywordStruct,
    KeywordInt32,
    KeywordInt64,

    // Operators
    Assign,      // =
    Plus,        // +
    Minus,       // -
    Star,        // *
    PlusAssign,  // +=
    MinusAssign, // -=
    StarAssign,  // *=
    Eq,          // ==
    Lt,          // <
    Le,          // <=
    Gt,          // >
    Ge,          // >=
    Shl,         // <<
    Shr,         // >>
    BitOr,       // |
    BitAnd,      // &
    BoolOr,      // || or the `or` keyword
    BoolAnd,     // &&

    // Delimiters
    LeftParen,  // (
    RightParen, // )
    LeftBrace,  // {
    RightBrace, // }
    Colon,      // :
    Comma,      // ,
    Semicolon,  // ;

    // Special
    Newline,
    EndOfFile,

    // Error token for error recovery
    Error(String),
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Int(n) => write!(f, "{}", n),
            TokenType::Float(n) => write!(f, "{}", n),
            TokenType::Str(s) => write!(f, "\"{}\"", s),
            TokenType::Identifier(name) => write!(f, "{}", name),
            TokenType::Error(msg) => write!(f, "ERROR: {}", msg),
            other => {
                let token_str = match other {
                    TokenType::KeywordFunc => "func",
                    TokenType::KeywordConst => "const",
                    TokenType::KeywordLet => "let",
                    TokenType::KeywordIf => "if",
                    TokenType::KeywordElse => "else",
                    TokenType::KeywordWhile => "while",
                    TokenType::KeywordReturn => "return",
                    TokenType::KeywordStruct => "struct",
                    TokenType::KeywordInt32 => "int32",
                    TokenType::KeywordInt64 => "int64",
                    TokenType::Assign => "=",
                    TokenType::Plus => "+",
                    TokenType::Minus => "-",
                    TokenType::Star => "*",
                    TokenType::PlusAssign => "+=",
                    TokenType::MinusAssign => "-=",
                    TokenType::StarAssign => "*=",
                    TokenType::Eq => "==",
                    TokenType::Lt => "<",
                    TokenType::Le => "<=",
                    TokenType::Gt => ">",
                    TokenType::Ge => ">=",
                    TokenType::Shl => "<<",
                    TokenType::Shr => ">>",
                    TokenType::BitOr => "|",
                    TokenType::BitAnd => "&",
                    TokenType::BoolOr => "||",
                    TokenType::BoolAnd => "&&",
                    TokenType::LeftParen => "(",
                    TokenType::RightParen => ")",
                    TokenType::LeftBrace => "{",
                    TokenType::RightBrace => "}",
                    TokenType::Colon => ":",
                    TokenType::Comma => ",",
                    TokenType::Semicolon => ";",
                    TokenType::Newline => "\\n",
                    TokenType::EndOfFile => "EOF",
                    _ => unreachable!(),
                };
                write!(f, "{}", token_str)
            }
        }
    }
}

/// A token with source location information
pub type Token = Spanned<TokenType>;

/// Token utility trait
pub trait TokenUtils {
    fn new(token_type: TokenType, span: Span) -> Self;
    /// Newline or semicolon, the statement separators.
    fn is_separator(&self) -> bool;
    /// `=`, `+=`, `-=` or `*=`.
    fn is_assign_op(&self) -> bool;
    /// A type annotation position token: `int32`, `int64` or an identifier.
    fn is_type_name(&self) -> bool;
}

impl TokenUtils for Token {
    fn new(token_type: TokenType, span: Span) -> Self {
        Spanned::new(token_type, span)
    }

    fn is_separator(&self) -> bool {
        matches!(self.value, TokenType::Newline | TokenType::Semicolon)
    }

    fn is_assign_op(&self) -> bool {
        matches!(
            self.value,
            TokenType::Assign | TokenType::PlusAssign | TokenType::MinusAssign | TokenType::StarAssign
        )
    }

    fn is_type_name(&self) -> bool {
        matches!(
            self.value,
            TokenType::KeywordInt32 | TokenType::KeywordInt64 | TokenType::Identifier(_)
        )
    }
}
