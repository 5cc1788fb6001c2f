//! Statement segments with their own working scope
//!
//! The arms of a compound `SELECT` each see only the relations they name,
//! and the target of `INSERT .. SELECT` is kept apart from the source query.
//! A plain statement is a single segment covering everything after `WITH`.

use sqlty_ast::Token;
use sqlty_parser::scan::{depths, statement_start};
use std::ops::Range;

use crate::scope::Scope;

const COMPOUND_OPERATORS: &[&str] = &["UNION", "INTERSECT", "EXCEPT"];

/// Token ranges of the main statement resolved against one scope
#[derive(Debug, Clone)]
pub struct Segment {
    /// Indices into the full token list of the statement
    pub ranges: Vec<Range<usize>>,
    pub scope: Scope,
    /// `ORDER BY`/`LIMIT` of a compound select, where output names are visible
    pub ordering: bool,
}

impl Segment {
    fn new(ranges: Vec<Range<usize>>, scope: Scope) -> Self {
        Self {
            ranges,
            scope,
            ordering: false,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.ranges.iter().any(|r| r.contains(&index))
    }
}

/// Split the main statement of `tokens` and narrow `base` for each part.
///
/// The first segment is the one output columns resolve against: the
/// first arm of a select, or the target relation of a mutation. Never
/// empty.
pub fn split_segments(tokens: &[Token], base: &Scope) -> Vec<Segment> {
    let start = statement_start(tokens);
    let depth = depths(tokens);
    let top = |k: usize, words: &[&str]| depth[k] == 0 && tokens[k].is_any_word(words);

    let mut segments = Vec::new();
    let mut body = start..tokens.len();
    let inserting = tokens.get(start).is_some_and(|t| t.is_any_word(&["INSERT", "REPLACE"]));
    if let Some(select) = (start..tokens.len()).find(|&k| inserting && top(k, &["SELECT"])) {
        let tail = (select..tokens.len())
            .find(|&k| {
                top(k, &["RETURNING"])
                    || (top(k, &["ON"]) && tokens.get(k + 1).is_some_and(|t| t.is_word("CONFLICT")))
            })
            .unwrap_or(tokens.len());
        let target = base.narrow_to_referenced(&tokens[start..select]);
        segments.push(Segment::new(vec![start..select, tail..tokens.len()], target));
        body = select..tail;
    }

    let arms = compound_arms(tokens, &depth, body.clone());
    let compound = arms.len() > 1;
    let first_arm = segments.len();
    let mut ordering = None;
    for mut arm in arms {
        if compound && arm.end == body.end {
            let tail = arm.clone().find(|&k| {
                top(k, &["LIMIT"]) || (top(k, &["ORDER"]) && tokens.get(k + 1).is_some_and(|t| t.is_word("BY")))
            });
            if let Some(tail) = tail {
                ordering = Some(tail..arm.end);
                arm.end = tail;
            }
        }
        let scope = base.narrow_to_referenced(&tokens[arm.clone()]);
        segments.push(Segment::new(vec![arm], scope));
    }

    // The trailing clause of a compound sees the first arm's relations
    if let Some(range) = ordering {
        let scope = segments.get(first_arm).map(|s| s.scope.clone()).unwrap_or_default();
        segments.push(Segment {
            ranges: vec![range],
            scope,
            ordering: true,
        });
    }
    segments
}

/// Ranges of `body` between depth-0 `UNION [ALL]`, `INTERSECT` and `EXCEPT`
fn compound_arms(tokens: &[Token], depth: &[usize], body: Range<usize>) -> Vec<Range<usize>> {
    let mut arms = Vec::new();
    let mut from = body.start;
    let mut k = body.start;
    while k < body.end {
        if depth[k] == 0 && tokens[k].is_any_word(COMPOUND_OPERATORS) {
            arms.push(from..k);
            k += 1;
            if tokens.get(k).is_some_and(|t| t.is_word("ALL")) {
                k += 1;
            }
            from = k;
            continue;
        }
        k += 1;
    }
    arms.push(from..body.end);
    arms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ColumnOverrides;
    use pretty_assertions::assert_eq;
    use sqlty_ast::{Catalog, Column, Table};
    use sqlty_parser::tokenize;
    use sqlty_types::SqliteTypeResolver;

    fn base() -> Scope {
        let mut catalog = Catalog::new();
        catalog.add_table(Table::new("users").with_column(Column::new("id", "INTEGER")));
        catalog.add_table(Table::new("posts").with_column(Column::new("id", "INTEGER")));
        Scope::from_catalog(&catalog, &SqliteTypeResolver, &ColumnOverrides::new())
    }

    fn texts(tokens: &[Token], segment: &Segment) -> Vec<String> {
        segment
            .ranges
            .iter()
            .map(|r| tokens[r.clone()].iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" "))
            .collect()
    }

    #[test]
    fn test_plain_statement_is_one_segment() {
        let tokens = tokenize("WITH x AS (SELECT 1) SELECT id FROM users").unwrap();
        let segments = split_segments(&tokens, &base());
        assert_eq!(segments.len(), 1);
        assert_eq!(texts(&tokens, &segments[0]), ["SELECT id FROM users"]);
        assert!(segments[0].scope.lookup(None, "id").is_ok());
    }

    #[test]
    fn test_compound_arms_and_ordering() {
        let tokens = tokenize("SELECT id FROM users UNION ALL SELECT id FROM posts ORDER BY id LIMIT 5").unwrap();
        let segments = split_segments(&tokens, &base());
        let parts: Vec<_> = segments.iter().map(|s| (texts(&tokens, s), s.ordering)).collect();
        assert_eq!(
            parts,
            [
                (vec!["SELECT id FROM users".to_string()], false),
                (vec!["SELECT id FROM posts".to_string()], false),
                (vec!["ORDER BY id LIMIT 5".to_string()], true),
            ]
        );
        assert!(segments.iter().all(|s| s.scope.lookup(None, "id").is_ok()));
    }

    #[test]
    fn test_insert_select_keeps_target_apart() {
        let sql = "INSERT INTO users (id) SELECT id FROM posts ON CONFLICT (id) DO NOTHING RETURNING id";
        let tokens = tokenize(sql).unwrap();
        let segments = split_segments(&tokens, &base());
        assert_eq!(segments.len(), 2);
        assert_eq!(
            texts(&tokens, &segments[0]),
            ["INSERT INTO users ( id )", "ON CONFLICT ( id ) DO NOTHING RETURNING id"]
        );
        assert_eq!(texts(&tokens, &segments[1]), ["SELECT id FROM posts"]);
        assert!(segments[0].scope.lookup(Some("users"), "id").is_ok());
        assert!(segments[0].scope.lookup(Some("posts"), "id").is_err());
        assert!(segments[1].contains(7));
    }
}
