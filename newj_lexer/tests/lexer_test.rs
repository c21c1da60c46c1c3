//! Integration tests for the NewJ lexer

use newj_lexer::{Lexer, TokenType};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn token_types(source: &str) -> Vec<TokenType> {
    Lexer::new(source, 0).tokenize().into_iter().map(|t| t.value).collect()
}

#[test]
fn function_header() {
    let source = "func add(a: int32, b: int32): int32 { return a + b }";
    let types = token_types(source);
    assert_eq!(
        &types[..6],
        &[
            TokenType::KeywordFunc,
            TokenType::Identifier("add".into()),
            TokenType::LeftParen,
            TokenType::Identifier("a".into()),
            TokenType::Colon,
            TokenType::KeywordInt32,
        ]
    );
    assert_eq!(types.last(), Some(&TokenType::EndOfFile));
}

#[test]
fn keywords_are_case_insensitive() {
    assert_eq!(
        token_types("FUNC Const WHILE Return RET"),
        vec![
            TokenType::KeywordFunc,
            TokenType::KeywordConst,
            TokenType::KeywordWhile,
            TokenType::KeywordReturn,
            TokenType::KeywordReturn,
            TokenType::EndOfFile,
        ]
    );
}

#[test]
fn comments_run_to_end_of_line() {
    let source = "let x = 1 # the answer\nlet y = 2";
    let types = token_types(source);
    assert_eq!(
        types,
        vec![
            TokenType::KeywordLet,
            TokenType::Identifier("x".into()),
            TokenType::Assign,
            TokenType::Int(1),
            TokenType::Newline,
            TokenType::KeywordLet,
            TokenType::Identifier("y".into()),
            TokenType::Assign,
            TokenType::Int(2),
            TokenType::EndOfFile,
        ]
    );
}

#[test]
fn string_literal_keeps_escaped_quote() {
    let types = token_types(r#"print("say \"hi\"")"#);
    assert!(types.contains(&TokenType::Str(r#"say \"hi\""#.into())));
}

#[test]
fn unterminated_string_is_diagnosed_not_fatal() {
    let mut lexer = Lexer::new("let s = \"oops", 0);
    let tokens = lexer.tokenize();
    assert!(lexer.diagnostics().warning_count() >= 1);
    assert_eq!(tokens.last().map(|t| t.value.clone()), Some(TokenType::EndOfFile));
}

#[test]
fn unknown_byte_is_diagnosed_not_fatal() {
    let mut lexer = Lexer::new("let x = 1 @ 2", 0);
    let tokens = lexer.tokenize();
    assert!(lexer.diagnostics().warning_count() >= 1);
    assert!(tokens.iter().any(|t| matches!(t.value, TokenType::Error(_))));
    assert!(tokens.iter().any(|t| t.value == TokenType::Int(2)));
}

#[test]
fn empty_source_yields_only_eof() {
    assert_eq!(token_types(""), vec![TokenType::EndOfFile]);
}

/// Source text minus non-newline whitespace and comments, the part the
/// token slices must reproduce.
fn strip_insignificant(source: &str) -> String {
    let mut out = String::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\r' => {}
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn assert_round_trip(source: &str) {
    let tokens = Lexer::new(source, 0).tokenize();
    let mut rebuilt = String::new();
    for token in &tokens {
        if token.value == TokenType::EndOfFile {
            continue;
        }
        rebuilt.push_str(token.span.text(source));
    }
    assert_eq!(rebuilt, strip_insignificant(source));
}

#[test]
fn round_trip_on_realistic_program() {
    assert_round_trip(
        "func main() {\n    let i: int32 = 0   # counter\n    while (i < 10) { i += 1 }\n}\n",
    );
}

proptest! {
    // Concatenating each token's source slice, in order, reproduces the
    // source modulo stripped whitespace and comments.
    #[test]
    fn round_trip_holds(words in prop::collection::vec(
        prop::sample::select(vec![
            "func", "let", "const", "while", "if", "else", "return",
            "x", "y0", "foo", "0x1F", "0b11", "42", "3.14",
            "+", "-", "*", "+=", "==", "=", "<", "<=", "<<", ">>", "|", "||",
            "(", ")", "{", "}", ":", ",", ";", "# trailing",
        ]),
        0..40,
    ), seps in prop::collection::vec(prop::sample::select(vec![" ", "\t", "\n", "  "]), 0..40)) {
        let mut source = String::new();
        for (i, word) in words.iter().enumerate() {
            source.push_str(word);
            let sep = seps.get(i).copied().unwrap_or("\n");
            source.push_str(sep);
        }
        assert_round_trip(&source);
    }
}
