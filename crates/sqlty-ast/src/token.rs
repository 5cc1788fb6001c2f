//! SQL tokens

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use crate::{Position, Span};

/// Kind of a SQL token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Reserved word (`SELECT`, `FROM`, ...)
    Keyword,
    /// Bare identifier
    Identifier,
    /// `"name"`, `` `name` `` or `[name]`
    QuotedIdentifier,
    /// `'text'`
    String,
    /// `x'00ff'`
    Blob,
    Integer,
    Float,
    /// `?`, `?1`, `:name`, `@name`, `$1`, `$name`
    Parameter,
    Operator,
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Star,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyword => "keyword",
            Self::Identifier => "identifier",
            Self::QuotedIdentifier => "quoted identifier",
            Self::String => "string",
            Self::Blob => "blob",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Parameter => "parameter",
            Self::Operator => "operator",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::Comma => "','",
            Self::Dot => "'.'",
            Self::Semicolon => "';'",
            Self::Star => "'*'",
        };
        f.write_str(name)
    }
}

/// A token with its source text and location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text, quotes included
    pub text: String,
    /// Byte range in the tokenized text
    pub span: Span,
    /// Line/column of the first character
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span, position: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            position,
        }
    }

    /// Case-insensitive word match against keywords and bare identifiers.
    ///
    /// Many SQL words (`REPLACE`, `KEY`, `ROWID`) are only contextually
    /// reserved, so the check does not depend on the keyword table.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Identifier)
            && self.text.eq_ignore_ascii_case(word)
    }

    /// True for any of the given words
    pub fn is_any_word(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.is_word(w))
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::QuotedIdentifier)
    }

    /// Identifier or a keyword that can still name something (`count`, `key`)
    pub fn is_name(&self) -> bool {
        self.is_identifier() || (self.kind == TokenKind::Keyword && !is_reserved(&self.text))
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    /// Identifier text with quoting removed
    pub fn value(&self) -> String {
        match self.kind {
            TokenKind::QuotedIdentifier => unquote(&self.text),
            TokenKind::String => unquote(&self.text),
            _ => self.text.clone(),
        }
    }

    /// Lower-cased identifier value for lookups
    pub fn normalized(&self) -> String {
        crate::normalize(&self.value())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Strip one level of SQL quoting (`"x"`, `` `x` ``, `[x]`, `'x'`)
pub fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return text.to_string();
    };
    let inner = &text[first.len_utf8()..text.len() - last.len_utf8()];
    match (first, last) {
        ('"', '"') => inner.replace("\"\"", "\""),
        ('`', '`') => inner.replace("``", "`"),
        ('\'', '\'') => inner.replace("''", "'"),
        ('[', ']') => inner.to_string(),
        _ => text.to_string(),
    }
}

/// Words the tokenizer classifies as keywords
pub static KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "ALL", "ALTER", "AND", "AS", "ASC", "AUTOINCREMENT", "BETWEEN", "BY", "CASE", "CAST",
        "CHECK", "COLLATE", "COLUMN", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
        "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DEFAULT", "DELETE", "DESC",
        "DISTINCT", "DO", "DROP", "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS", "FALSE", "FILTER",
        "FOREIGN", "FROM", "FULL", "GLOB", "GROUP", "HAVING", "IF", "IGNORE", "IN", "INDEX",
        "INNER", "INSERT", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "LEFT", "LIKE", "LIMIT",
        "MATCH", "MATERIALIZED", "NATURAL", "NOT", "NOTHING", "NOTNULL", "NULL", "NULLS",
        "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRIMARY", "RECURSIVE",
        "REFERENCES", "REGEXP", "RETURNING", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO",
        "TRUE", "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "VIEW", "WHEN", "WHERE",
        "WINDOW", "WITH", "WITHOUT",
    ]
    .into_iter()
    .collect()
});

/// Keywords that may never be used as a bare name
static RESERVED: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "ALL", "AND", "AS", "BETWEEN", "BY", "CASE", "CAST", "CHECK", "COLLATE", "CONSTRAINT",
        "CREATE", "CROSS", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DEFAULT",
        "DELETE", "DISTINCT", "ELSE", "END", "EXCEPT", "EXISTS", "FALSE", "FROM", "FULL",
        "GROUP", "HAVING", "IN", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "LEFT",
        "LIMIT", "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "RETURNING",
        "RIGHT", "SELECT", "SET", "THEN", "TRUE", "UNION", "UPDATE", "USING", "VALUES", "WHEN",
        "WHERE", "WINDOW", "WITH",
    ]
    .into_iter()
    .collect()
});

/// Whether `word` is classified as a keyword
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(word.to_ascii_uppercase().as_str())
}

/// Whether `word` is a keyword that can never be an identifier or alias
pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(word.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, text, Span::new(0, text.len()), Position::START)
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"user id\""), "user id");
        assert_eq!(unquote("`a``b`"), "a`b");
        assert_eq!(unquote("[order]"), "order");
        assert_eq!(unquote("'it''s'"), "it's");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn test_word_matching() {
        assert!(tok(TokenKind::Keyword, "select").is_word("SELECT"));
        assert!(tok(TokenKind::Identifier, "Replace").is_word("REPLACE"));
        assert!(!tok(TokenKind::String, "'select'").is_word("SELECT"));
    }

    #[test]
    fn test_contextual_keywords_are_names() {
        assert!(tok(TokenKind::Keyword, "filter").is_name());
        assert!(!tok(TokenKind::Keyword, "from").is_name());
        assert_eq!(tok(TokenKind::QuotedIdentifier, "\"Email\"").normalized(), "email");
    }
}
