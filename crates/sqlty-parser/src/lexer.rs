//! SQL tokenizer using winnow

use sqlty_ast::{is_keyword, Position, Span, Token, TokenKind};
use sqlty_diagnostics::{
    Diagnostic, ErrorCode, SourceLocation, SqltyError, SQL0003, SQL0004, SQL0005, SQL0006,
};
use thiserror::Error;
use winnow::ascii::{digit0, digit1, multispace1, till_line_ending};
use winnow::combinator::{alt, opt, repeat};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{one_of, take_until, take_while};

/// Tokenization failure, fatal for the text being tokenized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {position}")]
pub struct TokenizeError {
    pub code: ErrorCode,
    pub message: String,
    pub position: Position,
}

impl TokenizeError {
    pub fn to_diagnostic(&self, path: &str) -> Diagnostic {
        Diagnostic::error(self.code, self.message.clone())
            .with_path(path)
            .with_position(self.position)
    }
}

impl From<TokenizeError> for SqltyError {
    fn from(err: TokenizeError) -> Self {
        SqltyError::parse_at(
            err.code,
            err.message,
            SourceLocation::new(err.position.line, err.position.column, 0, 0),
        )
    }
}

/// Tokenize SQL text that starts at line 1, column 1
pub fn tokenize(sql: &str) -> Result<Vec<Token>, TokenizeError> {
    tokenize_at(sql, Position::START)
}

/// Tokenize SQL text whose first character sits at `start` in its file.
///
/// Token positions are absolute file positions, so text cut out of a larger
/// file yields the same positions as tokenizing the whole file.
pub fn tokenize_at(sql: &str, start: Position) -> Result<Vec<Token>, TokenizeError> {
    let mut input = sql;
    let mut cursor = Cursor::new(sql, start);
    let mut tokens = Vec::new();

    loop {
        // Trivia never fails: it is a zero-or-more repetition.
        let _ = trivia.parse_next(&mut input);
        if input.is_empty() {
            break;
        }

        let offset = sql.len() - input.len();
        let position = cursor.seek(offset);
        if input.starts_with("/*") {
            return Err(TokenizeError {
                code: SQL0005,
                message: "unterminated block comment".to_string(),
                position,
            });
        }

        match token.with_taken().parse_next(&mut input) {
            Ok((kind, text)) => {
                let span = Span::new(offset, offset + text.len());
                tokens.push(Token::new(kind, text, span, position));
            }
            Err(_) => return Err(failure(&sql[offset..], position)),
        }
    }

    Ok(tokens)
}

/// Incremental offset → line/column conversion
struct Cursor<'s> {
    text: &'s str,
    offset: usize,
    position: Position,
}

impl<'s> Cursor<'s> {
    fn new(text: &'s str, start: Position) -> Self {
        Self {
            text,
            offset: 0,
            position: start,
        }
    }

    fn seek(&mut self, offset: usize) -> Position {
        for ch in self.text[self.offset..offset].chars() {
            if ch == '\n' {
                self.position.line += 1;
                self.position.column = 1;
            } else {
                self.position.column += 1;
            }
        }
        self.offset = offset;
        self.position
    }
}

fn failure(rest: &str, position: Position) -> TokenizeError {
    let mut chars = rest.chars();
    let (code, message) = match (chars.next(), chars.next()) {
        (Some('\''), _) | (Some('x' | 'X'), Some('\'')) => {
            (SQL0003, "unterminated string literal".to_string())
        }
        (Some('"' | '`' | '['), _) => (SQL0004, "unterminated quoted identifier".to_string()),
        (Some(c), _) => (SQL0006, format!("unexpected character '{c}'")),
        (None, _) => (SQL0006, "unexpected end of input".to_string()),
    };
    TokenizeError {
        code,
        message,
        position,
    }
}

fn trivia(input: &mut &str) -> ModalResult<()> {
    repeat(0.., alt((multispace1.void(), line_comment, block_comment))).parse_next(input)
}

fn line_comment(input: &mut &str) -> ModalResult<()> {
    ("--", till_line_ending).void().parse_next(input)
}

fn block_comment(input: &mut &str) -> ModalResult<()> {
    ("/*", take_until(0.., "*/"), "*/").void().parse_next(input)
}

fn token(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        string_literal,
        blob_literal,
        quoted_identifier,
        number,
        parameter,
        word,
        punctuation,
        operator,
    ))
    .parse_next(input)
}

fn string_literal(input: &mut &str) -> ModalResult<TokenKind> {
    quoted_text('\'').value(TokenKind::String).parse_next(input)
}

fn blob_literal(input: &mut &str) -> ModalResult<TokenKind> {
    (one_of(['x', 'X']), quoted_text('\''))
        .value(TokenKind::Blob)
        .parse_next(input)
}

/// `q...q` where a doubled `q` escapes the quote
fn quoted_text<'s>(quote: char) -> impl Parser<&'s str, (), ErrMode<ContextError>> {
    let escaped: &'static str = if quote == '"' { "\"\"" } else { "''" };
    (
        quote,
        repeat(
            0..,
            alt((
                escaped.void(),
                take_while(1.., move |c: char| c != quote).void(),
            )),
        )
        .map(|()| ()),
        quote,
    )
        .void()
}

fn quoted_identifier(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        quoted_text('"'),
        ('`', take_while(0.., |c: char| c != '`'), '`').void(),
        ('[', take_while(0.., |c: char| c != ']'), ']').void(),
    ))
    .value(TokenKind::QuotedIdentifier)
    .parse_next(input)
}

fn exponent(input: &mut &str) -> ModalResult<()> {
    (one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)
        .void()
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        ("0x", take_while(1.., |c: char| c.is_ascii_hexdigit())).value(TokenKind::Integer),
        (digit1, '.', digit0, opt(exponent)).value(TokenKind::Float),
        ('.', digit1, opt(exponent)).value(TokenKind::Float),
        (digit1, exponent).value(TokenKind::Float),
        digit1.value(TokenKind::Integer),
    ))
    .parse_next(input)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parameter(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        ('?', digit0).void(),
        (one_of([':', '@', '$']), take_while(1.., is_ident_char)).void(),
    ))
    .value(TokenKind::Parameter)
    .parse_next(input)
}

fn word(input: &mut &str) -> ModalResult<TokenKind> {
    (
        take_while(1, |c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., is_ident_char),
    )
        .take()
        .map(|text: &str| {
            if is_keyword(text) {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            }
        })
        .parse_next(input)
}

fn punctuation(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        '('.value(TokenKind::LParen),
        ')'.value(TokenKind::RParen),
        ','.value(TokenKind::Comma),
        '.'.value(TokenKind::Dot),
        ';'.value(TokenKind::Semicolon),
        '*'.value(TokenKind::Star),
    ))
    .parse_next(input)
}

fn operator(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        alt(("->>", "::", "||", "<=", ">=", "<>", "!=", "==", "<<", ">>", "->")),
        alt(("=", "<", ">", "+", "-", "/", "%", "&", "|", "~")),
    ))
    .value(TokenKind::Operator)
    .parse_next(input)
}
