//! Error handling utilities for the NewJ compiler
//!
//! Pipeline stages report recoverable problems through
//! [`Diagnostics`](crate::Diagnostics); `NewjError` is reserved for failures
//! that stop the driver outright, such as an unreadable input file.

use thiserror::Error;

/// The main error type for the NewJ compiler
#[derive(Error, Debug, Clone)]
pub enum NewjError {
    #[error("Lexical error: {message}")]
    LexError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("IR error: {message}")]
    IrError { message: String },

    #[error("Code generation error: {message}")]
    CodegenError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

/// Result type alias for NewJ compiler operations
pub type NewjResult<T> = Result<T, NewjError>;

impl NewjError {
    pub fn lex_error(message: impl Into<String>) -> Self {
        Self::LexError { message: message.into() }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError { message: message.into() }
    }

    pub fn ir_error(message: impl Into<String>) -> Self {
        Self::IrError { message: message.into() }
    }

    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::CodegenError { message: message.into() }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::IoError { message: message.into() }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }
}
