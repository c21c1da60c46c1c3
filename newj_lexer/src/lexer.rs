//! Lexer implementation for the NewJ language

use crate::{Token, TokenType, TokenUtils};
use hashbrown::HashMap;
use memchr::memchr;
use newj_common::{Diagnostics, Position, Span};

fn keyword_table() -> HashMap<&'static str, TokenType> {
    let mut keywords = HashMap::new();
    keywords.insert("func", TokenType::KeywordFunc);
    keywords.insert("const", TokenType::KeywordConst);
    keywords.insert("let", TokenType::KeywordLet);
    keywords.insert("if", TokenType::KeywordIf);
    keywords.insert("else", TokenType::KeywordElse);
    keywords.insert("while", TokenType::KeywordWhile);
    keywords.insert("ret", TokenType::KeywordReturn);
    keywords.insert("return", TokenType::KeywordReturn);
    keywords.insert("struct", TokenType::KeywordStruct);
    keywords.insert("int32", TokenType::KeywordInt32);
    keywords.insert("int64", TokenType::KeywordInt64);
    keywords.insert("or", TokenType::BoolOr);
    keywords
}

/// Lexer for the NewJ language
///
/// Produces spanned tokens over the input; a token's text is always a slice
/// of the original source recoverable through its span.
pub struct Lexer<'a> {
    input: &'a str,
    input_bytes: &'a [u8],
    position: usize,
    current_pos: Position,
    file_id: u32,
    keywords: HashMap<&'static str, TokenType>,
    diagnostics: Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, file_id: u32) -> Self {
        Self {
            input,
            input_bytes: input.as_bytes(),
            position: 0,
            current_pos: Position::start(),
            file_id,
            keywords: keyword_table(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Get the collected diagnostics
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Tokenize the entire input.
    ///
    /// Newlines survive as tokens (they separate statements); spaces, tabs
    /// and `#` comments do not. The stream always ends with `EndOfFile`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        let eof_span = Span::single(self.current_pos, self.file_id);
        tokens.push(TokenUtils::new(TokenType::EndOfFile, eof_span));
        tokens
    }

    /// Get the next token from the input, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_blanks_and_comments();

        if self.is_at_end() {
            return None;
        }

        let start_pos = self.current_pos;

        let token_type = match self.current_char() {
            '\n' => {
                self.advance_line();
                TokenType::Newline
            }
            '(' => {
                self.advance();
                TokenType::LeftParen
            }
            ')' => {
                self.advance();
                TokenType::RightParen
            }
            '{' => {
                self.advance();
                TokenType::LeftBrace
            }
            '}' => {
                self.advance();
                TokenType::RightBrace
            }
            ':' => {
                self.advance();
                TokenType::Colon
            }
            ',' => {
                self.advance();
                TokenType::Comma
            }
            ';' => {
                self.advance();
                TokenType::Semicolon
            }
            '=' => self.scan_equal_operators(),
            '+' => self.scan_compound(TokenType::Plus, TokenType::PlusAssign),
            '-' => self.scan_compound(TokenType::Minus, TokenType::MinusAssign),
            '*' => self.scan_compound(TokenType::Star, TokenType::StarAssign),
            '<' => self.scan_less_operators(),
            '>' => self.scan_greater_operators(),
            '|' => self.scan_doubling(TokenType::BitOr, TokenType::BoolOr),
            '&' => self.scan_doubling(TokenType::BitAnd, TokenType::BoolAnd),
            '"' => self.scan_string_literal(),
            c if c.is_ascii_digit() => self.scan_number(),
            c if c.is_ascii_alphabetic() => self.scan_identifier_or_keyword(),
            c => {
                self.advance();
                let message = format!("unknown byte '{}'", c.escape_default());
                self.diagnostics.warning(&message, Span::single(start_pos, self.file_id));
                TokenType::Error(message)
            }
        };

        let span = Span::new(start_pos, self.current_pos, self.file_id);
        Some(TokenUtils::new(token_type, span))
    }

    /// Skip non-newline whitespace and `#` comments.
    fn skip_blanks_and_comments(&mut self) {
        while !self.is_at_end() {
            match self.current_char() {
                ' ' | '\t' | '\r' => self.advance(),
                '#' => {
                    // A comment runs to end of line; the newline itself is
                    // still a separator token.
                    match memchr(b'\n', &self.input_bytes[self.position..]) {
                        Some(rel) => {
                            for _ in 0..rel {
                                self.advance();
                            }
                        }
                        None => {
                            while !self.is_at_end() {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenType {
        let start = self.position;
        while !self.is_at_end() && self.current_char().is_ascii_alphanumeric() {
            self.advance();
        }
        let identifier = &self.input[start..self.position];

        // Keywords are case-insensitive
        let lowered = identifier.to_ascii_lowercase();
        if let Some(keyword) = self.keywords.get(lowered.as_str()) {
            keyword.clone()
        } else {
            TokenType::Identifier(identifier.to_string())
        }
    }

    fn scan_number(&mut self) -> TokenType {
        let start = self.position;
        let first = self.current_char();
        self.advance();

        if first == '0' && matches!(self.current_char_opt(), Some('x') | Some('X')) {
            self.advance();
            let digits_start = self.position;
            while !self.is_at_end() && self.current_char().is_ascii_hexdigit() {
                self.advance();
            }
            let digits = self.input[digits_start..self.position].to_string();
            return self.parse_int(&digits, 16, start);
        }

        if first == '0' && matches!(self.current_char_opt(), Some('b') | Some('B')) {
            self.advance();
            let digits_start = self.position;
            while !self.is_at_end() && matches!(self.current_char(), '0' | '1') {
                self.advance();
            }
            let digits = self.input[digits_start..self.position].to_string();
            return self.parse_int(&digits, 2, start);
        }

        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            self.advance();
        }

        // A '.' followed by a digit continues into a float literal
        if self.current_char_opt() == Some('.')
            && self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            self.advance();
            while !self.is_at_end() && self.current_char().is_ascii_digit() {
                self.advance();
            }
            return TokenType::Float(self.input[start..self.position].to_string());
        }

        let digits = self.input[start..self.position].to_string();
        self.parse_int(&digits, 10, start)
    }

    fn parse_int(&mut self, digits: &str, radix: u32, start_offset: usize) -> TokenType {
        match i64::from_str_radix(digits, radix) {
            Ok(value) => TokenType::Int(value),
            Err(_) => {
                let span = self.span_from_offset(start_offset);
                self.diagnostics.warning(
                    format!("integer literal '{}' does not fit in 64 bits", digits),
                    span,
                );
                TokenType::Int(0)
            }
        }
    }

    fn scan_string_literal(&mut self) -> TokenType {
        let open_offset = self.position;
        self.advance(); // opening quote
        let content_start = self.position;

        let mut last_char = '"';
        loop {
            if self.is_at_end() {
                let span = self.span_from_offset(open_offset);
                self.diagnostics.warning("unterminated string literal", span);
                return TokenType::Str(self.input[content_start..self.position].to_string());
            }
            let c = self.current_char();
            if c == '"' && last_char != '\\' {
                break;
            }
            last_char = c;
            if c == '\n' {
                self.advance_line();
            } else {
                self.advance();
            }
        }

        let content = self.input[content_start..self.position].to_string();
        self.advance(); // closing quote
        TokenType::Str(content)
    }

    fn scan_equal_operators(&mut self) -> TokenType {
        self.advance();
        if self.current_char_opt() == Some('=') {
            self.advance();
            TokenType::Eq
        } else {
            TokenType::Assign
        }
    }

    /// `X` or `X=`
    fn scan_compound(&mut self, single: TokenType, compound: TokenType) -> TokenType {
        self.advance();
        if self.current_char_opt() == Some('=') {
            self.advance();
            compound
        } else {
            single
        }
    }

    /// `X` or `XX`
    fn scan_doubling(&mut self, single: TokenType, double: TokenType) -> TokenType {
        let first = self.current_char();
        self.advance();
        if self.current_char_opt() == Some(first) {
            self.advance();
            double
        } else {
            single
        }
    }

    fn scan_less_operators(&mut self) -> TokenType {
        self.advance();
        match self.current_char_opt() {
            Some('<') => {
                self.advance();
                TokenType::Shl
            }
            Some('=') => {
                self.advance();
                TokenType::Le
            }
            _ => TokenType::Lt,
        }
    }

    fn scan_greater_operators(&mut self) -> TokenType {
        self.advance();
        match self.current_char_opt() {
            Some('>') => {
                self.advance();
                TokenType::Shr
            }
            Some('=') => {
                self.advance();
                TokenType::Ge
            }
            _ => TokenType::Gt,
        }
    }

    fn span_from_offset(&self, start_offset: usize) -> Span {
        // Line/column of the start are not tracked backwards; report at the
        // current position but keep the byte offsets exact.
        let mut start = self.current_pos;
        start.offset = start_offset as u32;
        Span::new(start, self.current_pos, self.file_id)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input_bytes.len()
    }

    fn current_char(&self) -> char {
        self.input_bytes[self.position] as char
    }

    fn current_char_opt(&self) -> Option<char> {
        self.input_bytes.get(self.position).map(|&b| b as char)
    }

    fn peek_char(&self) -> Option<char> {
        self.input_bytes.get(self.position + 1).map(|&b| b as char)
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_pos.column += 1;
        self.current_pos.offset += 1;
    }

    fn advance_line(&mut self) {
        self.position += 1;
        self.current_pos.line += 1;
        self.current_pos.column = 1;
        self.current_pos.offset += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token_types(source: &str) -> Vec<TokenType> {
        Lexer::new(source, 0).tokenize().into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            token_types("a += 1"),
            vec![
                TokenType::Identifier("a".into()),
                TokenType::PlusAssign,
                TokenType::Int(1),
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn shift_versus_comparison() {
        assert_eq!(
            token_types("<< <= < >> >= >"),
            vec![
                TokenType::Shl,
                TokenType::Le,
                TokenType::Lt,
                TokenType::Shr,
                TokenType::Ge,
                TokenType::Gt,
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn or_keyword_is_boolean_or() {
        assert_eq!(
            token_types("a or b"),
            vec![
                TokenType::Identifier("a".into()),
                TokenType::BoolOr,
                TokenType::Identifier("b".into()),
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn radix_literals() {
        assert_eq!(
            token_types("0x10 0b101 42 0"),
            vec![
                TokenType::Int(16),
                TokenType::Int(5),
                TokenType::Int(42),
                TokenType::Int(0),
                TokenType::EndOfFile,
            ]
        );
    }
}
