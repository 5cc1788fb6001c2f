//! Helpers for walking flat token streams
//!
//! The analyzer never builds an expression tree; it walks token slices,
//! tracking parenthesis depth. These helpers are shared by the query parser,
//! the schema parser and the semantic crate.

use std::ops::Range;

use sqlty_ast::{Token, TokenKind};

/// Index of the `)` matching the `(` at `open`
pub fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    if tokens.get(open)?.kind != TokenKind::LParen {
        return None;
    }
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the `(` matching the `)` at `close`
pub fn matching_open_paren(tokens: &[Token], close: usize) -> Option<usize> {
    if tokens.get(close)?.kind != TokenKind::RParen {
        return None;
    }
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match tokens[i].kind {
            TokenKind::RParen => depth += 1,
            TokenKind::LParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Paren depth before each token, relative to the start of the slice.
///
/// Unbalanced closing parens clamp at zero.
pub fn depths(tokens: &[Token]) -> Vec<usize> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut depth = 0usize;
    for tok in tokens {
        if tok.kind == TokenKind::RParen {
            depth = depth.saturating_sub(1);
        }
        out.push(depth);
        if tok.kind == TokenKind::LParen {
            depth += 1;
        }
    }
    out
}

/// First index at paren depth 0 matching `pred`
pub fn find_top_level(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    depths(tokens)
        .into_iter()
        .zip(tokens)
        .position(|(depth, tok)| depth == 0 && pred(tok))
}

/// Split a token slice on depth-0 commas, dropping empty pieces
pub fn split_top_level_commas(tokens: &[Token]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, (depth, tok)) in depths(tokens).into_iter().zip(tokens).enumerate() {
        if depth == 0 && tok.kind == TokenKind::Comma {
            if i > start {
                out.push(start..i);
            }
            start = i + 1;
        }
    }
    if start < tokens.len() {
        out.push(start..tokens.len());
    }
    out
}

/// Source text covered by a non-empty token slice
pub fn source_text<'s>(sql: &'s str, tokens: &[Token]) -> &'s str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &sql[first.span.start..last.span.end],
        _ => "",
    }
}

/// Index where the main statement begins, past any `WITH` clause
pub fn statement_start(tokens: &[Token]) -> usize {
    if !tokens.first().is_some_and(|t| t.is_word("WITH")) {
        return 0;
    }
    let mut i = 1;
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::LParen => match matching_paren(tokens, i) {
                Some(close) => i = close + 1,
                None => return tokens.len(),
            },
            _ if tokens[i].is_any_word(&["SELECT", "INSERT", "UPDATE", "DELETE", "REPLACE", "VALUES"]) => {
                return i;
            }
            _ => i += 1,
        }
    }
    tokens.len()
}

/// Keywords that end a SELECT projection list
pub const PROJECTION_TERMINATORS: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "UNION", "INTERSECT", "EXCEPT",
    "WINDOW", "RETURNING",
];
