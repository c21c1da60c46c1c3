//! Lexical analysis for the NewJ language
//!
//! Turns a source file into a restartable stream of typed tokens with source
//! spans. Statement separators (newlines and semicolons) are real tokens;
//! other whitespace and `#` comments are stripped.

pub mod lexer;
pub mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenType, TokenUtils};
