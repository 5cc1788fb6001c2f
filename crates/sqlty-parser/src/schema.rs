//! DDL schema parser
//!
//! Applies `CREATE`, `ALTER` and `DROP` statements from a schema file to a
//! [`Catalog`], in file order. Statements the catalog has no use for
//! (`CREATE TRIGGER`, `PRAGMA`, `INSERT` seed data, ...) are skipped.

use log::{debug, trace};
use sqlty_ast::{Catalog, Column, Index, Position, Table, Token, TokenKind, View};
use sqlty_diagnostics::{
    Diagnostic, ErrorCode, SQL0009, SQL0300, SQL0301, SQL0302, SQL0303, SQL0304, SQL0305,
};

use crate::lexer::tokenize;
use crate::scan::{matching_paren, source_text, split_top_level_commas};

/// Words that end the type name of a column definition
const COLUMN_CONSTRAINTS: &[&str] = &[
    "CONSTRAINT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "COLLATE",
    "REFERENCES",
    "GENERATED",
    "AS",
];

/// Parse a schema file into `catalog`, returning the problems found
pub fn parse_schema(path: &str, source: &str, catalog: &mut Catalog) -> Vec<Diagnostic> {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(err) => return vec![err.to_diagnostic(path)],
    };

    let mut parser = SchemaParser {
        path,
        source,
        catalog,
        diagnostics: Vec::new(),
    };
    for stmt in split_statements(&tokens) {
        parser.statement(stmt);
    }
    debug!(
        "schema {path}: {} relations, {} views",
        parser.catalog.len(),
        parser.catalog.views().count()
    );
    parser.diagnostics
}

/// Split on top-level semicolons, keeping trigger bodies whole
fn split_statements(tokens: &[Token]) -> Vec<&[Token]> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut in_trigger_body = false;

    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ if tok.is_word("BEGIN") && is_trigger(&tokens[start..i]) => in_trigger_body = true,
            TokenKind::Semicolon if depth == 0 => {
                let ends_trigger = i > 0 && tokens[i - 1].is_word("END");
                if in_trigger_body && !ends_trigger {
                    continue;
                }
                in_trigger_body = false;
                if i > start {
                    out.push(&tokens[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() {
        out.push(&tokens[start..]);
    }
    out
}

fn is_trigger(stmt: &[Token]) -> bool {
    stmt.first().is_some_and(|t| t.is_word("CREATE"))
        && stmt.iter().take(4).any(|t| t.is_word("TRIGGER"))
}

struct SchemaParser<'a> {
    path: &'a str,
    source: &'a str,
    catalog: &'a mut Catalog,
    diagnostics: Vec<Diagnostic>,
}

/// Cursor over the tokens of one statement
struct Stmt<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Stmt<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn eat(&mut self, word: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_word(word)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_all(&mut self, words: &[&str]) -> bool {
        let matches = words
            .iter()
            .enumerate()
            .all(|(k, w)| self.tokens.get(self.pos + k).is_some_and(|t| t.is_word(w)));
        if matches {
            self.pos += words.len();
        }
        matches
    }

    /// `[schema.]name`, returning the last component
    fn relation_name(&mut self) -> Option<&'t Token> {
        let mut name = self.bump()?;
        while self.peek().is_some_and(|t| t.kind == TokenKind::Dot) {
            self.pos += 1;
            name = self.bump()?;
        }
        (name.is_name() || name.kind == TokenKind::String).then_some(name)
    }

    /// Tokens inside the parenthesized group at the cursor
    fn group(&mut self) -> Option<&'t [Token]> {
        let close = matching_paren(self.tokens, self.pos)?;
        let inner = &self.tokens[self.pos + 1..close];
        self.pos = close + 1;
        Some(inner)
    }

    fn rest(&self) -> &'t [Token] {
        &self.tokens[self.pos.min(self.tokens.len())..]
    }
}

impl SchemaParser<'_> {
    fn report(&mut self, code: ErrorCode, position: Position, message: String) {
        self.diagnostics.push(
            Diagnostic::error(code, message)
                .with_path(self.path)
                .with_position(position),
        );
    }

    fn statement(&mut self, tokens: &[Token]) {
        let mut stmt = Stmt { tokens, pos: 0 };
        let Some(first) = stmt.bump() else {
            return;
        };

        if first.is_word("CREATE") {
            let unique = stmt.eat("UNIQUE");
            let _ = stmt.eat("TEMP") || stmt.eat("TEMPORARY");
            match stmt.bump() {
                Some(t) if t.is_word("TABLE") => self.create_table(&mut stmt, first.position),
                Some(t) if t.is_word("INDEX") => self.create_index(&mut stmt, unique, first.position),
                Some(t) if t.is_word("VIEW") => self.create_view(&mut stmt, first.position),
                _ => trace!("skipping statement at {}", first.position),
            }
        } else if first.is_word("ALTER") && stmt.eat("TABLE") {
            self.alter_table(&mut stmt, first.position);
        } else if first.is_word("DROP") {
            self.drop_object(&mut stmt, first.position);
        } else {
            trace!("skipping statement at {}", first.position);
        }
    }

    fn create_table(&mut self, stmt: &mut Stmt<'_>, at: Position) {
        let if_not_exists = stmt.eat_all(&["IF", "NOT", "EXISTS"]);
        let Some(name_tok) = stmt.relation_name() else {
            self.report(SQL0300, at, "expected a table name".to_string());
            return;
        };
        let name = name_tok.value();

        if self.catalog.table(&name).is_some() {
            if !if_not_exists {
                self.report(
                    SQL0301,
                    name_tok.position,
                    format!("table '{name}' already exists"),
                );
            }
            return;
        }

        // CREATE TABLE t AS SELECT ... is typed like a view.
        if stmt.eat("AS") {
            self.register_view(name, None, stmt.rest(), name_tok.position);
            return;
        }

        if stmt.peek().is_none_or(|t| t.kind != TokenKind::LParen) {
            self.report(
                SQL0300,
                name_tok.position,
                format!("expected column definitions for table '{name}'"),
            );
            return;
        }
        let Some(body) = stmt.group() else {
            self.report(
                SQL0009,
                name_tok.position,
                format!("unbalanced parentheses in table '{name}'"),
            );
            return;
        };

        let mut table = Table::new(name.clone());
        for range in split_top_level_commas(body) {
            self.table_element(&mut table, &body[range]);
        }
        for pk in table.primary_key.clone() {
            match table.column_mut(&pk) {
                Some(col) => {
                    col.primary_key = true;
                    col.not_null = true;
                }
                None => self.report(
                    SQL0304,
                    name_tok.position,
                    format!("primary key column '{pk}' does not exist in table '{name}'"),
                ),
            }
        }
        trace!("table {name}: {} columns", table.columns.len());
        self.catalog.add_table(table);
    }

    fn table_element(&mut self, table: &mut Table, def: &[Token]) {
        let mut stmt = Stmt {
            tokens: def,
            pos: 0,
        };
        if stmt.eat("CONSTRAINT") {
            stmt.bump();
        }
        let Some(first) = stmt.peek() else {
            return;
        };

        if first.is_any_word(&["PRIMARY", "UNIQUE"]) {
            let unique = first.is_word("UNIQUE");
            let primary = stmt.eat_all(&["PRIMARY", "KEY"]);
            if unique {
                stmt.bump();
            }
            let columns: Vec<String> = match stmt.group() {
                Some(inner) => split_top_level_commas(inner)
                    .into_iter()
                    .map(|r| inner[r.start].value())
                    .collect(),
                None => return,
            };
            if primary {
                table.primary_key.extend(columns);
            } else {
                table.indexes.push(Index {
                    name: format!("{}_unique_{}", table.name, table.indexes.len() + 1),
                    columns,
                    unique: true,
                });
            }
            return;
        }
        if first.is_any_word(&["CHECK", "FOREIGN"]) {
            return;
        }

        match self.column_def(def) {
            Some(column) if table.has_column(&column.name) => {
                let position = first.position;
                self.report(
                    SQL0303,
                    position,
                    format!("duplicate column '{}' in table '{}'", column.name, table.name),
                );
            }
            Some(column) => {
                if column.primary_key {
                    table.primary_key.push(column.name.clone());
                }
                table.columns.push(column);
            }
            None => {}
        }
    }

    fn column_def(&mut self, def: &[Token]) -> Option<Column> {
        let (name, rest) = def.split_first()?;
        if !(name.is_name() || name.kind == TokenKind::String) {
            self.report(
                SQL0300,
                name.position,
                format!("expected a column name, found '{}'", name.text),
            );
            return None;
        }

        let type_end = rest
            .iter()
            .position(|t| t.is_any_word(COLUMN_CONSTRAINTS))
            .unwrap_or(rest.len());
        let decl_type = source_text(self.source, &rest[..type_end]).to_string();
        let mut column = Column::new(name.value(), decl_type);

        let mut stmt = Stmt {
            tokens: &rest[type_end..],
            pos: 0,
        };
        while let Some(tok) = stmt.bump() {
            if tok.is_word("NOT") && stmt.eat("NULL") {
                column.not_null = true;
            } else if tok.is_word("PRIMARY") && stmt.eat("KEY") {
                column = column.primary_key();
            } else if tok.is_word("DEFAULT") {
                let value = if stmt.peek().is_some_and(|t| t.kind == TokenKind::LParen) {
                    stmt.group().map(|g| source_text(self.source, g).to_string())
                } else {
                    // Signed literals are two tokens.
                    let mut value = String::new();
                    if let Some(sign) = stmt.peek().filter(|t| t.is_operator("-") || t.is_operator("+")) {
                        value.push_str(&sign.text);
                        stmt.bump();
                    }
                    stmt.bump().map(|t| value + &t.text)
                };
                column.default = value;
            } else if tok.kind == TokenKind::LParen {
                // CHECK (...), GENERATED ... AS (...), REFERENCES t (...)
                stmt.pos -= 1;
                stmt.group();
            }
        }
        Some(column)
    }

    fn create_index(&mut self, stmt: &mut Stmt<'_>, unique: bool, at: Position) {
        stmt.eat_all(&["IF", "NOT", "EXISTS"]);
        let Some(name) = stmt.relation_name().map(Token::value) else {
            self.report(SQL0300, at, "expected an index name".to_string());
            return;
        };
        if !stmt.eat("ON") {
            self.report(SQL0300, at, format!("expected ON in index '{name}'"));
            return;
        }
        let Some(table_tok) = stmt.relation_name() else {
            self.report(SQL0300, at, format!("expected a table name in index '{name}'"));
            return;
        };
        let columns: Vec<String> = stmt
            .group()
            .map(|inner| {
                split_top_level_commas(inner)
                    .into_iter()
                    .map(|r| inner[r.start].value())
                    .collect()
            })
            .unwrap_or_default();

        let table_name = table_tok.value();
        let Some(table) = self.catalog.table_mut(&table_name) else {
            self.report(
                SQL0302,
                table_tok.position,
                format!("index '{name}' refers to unknown table '{table_name}'"),
            );
            return;
        };
        table.indexes.push(Index {
            name,
            columns,
            unique,
        });
    }

    fn create_view(&mut self, stmt: &mut Stmt<'_>, at: Position) {
        let if_not_exists = stmt.eat_all(&["IF", "NOT", "EXISTS"]);
        let Some(name_tok) = stmt.relation_name() else {
            self.report(SQL0305, at, "expected a view name".to_string());
            return;
        };
        let name = name_tok.value();
        if self.catalog.table(&name).is_some() || self.catalog.views().any(|v| v.name.eq_ignore_ascii_case(&name)) {
            if !if_not_exists {
                self.report(
                    SQL0301,
                    name_tok.position,
                    format!("relation '{name}' already exists"),
                );
            }
            return;
        }

        let columns = match stmt.peek() {
            Some(t) if t.kind == TokenKind::LParen => stmt.group().map(|inner| {
                split_top_level_commas(inner)
                    .into_iter()
                    .map(|r| inner[r.start].value())
                    .collect()
            }),
            _ => None,
        };
        if !stmt.eat("AS") {
            self.report(
                SQL0305,
                name_tok.position,
                format!("expected AS in view '{name}'"),
            );
            return;
        }
        self.register_view(name, columns, stmt.rest(), name_tok.position);
    }

    fn register_view(
        &mut self,
        name: String,
        columns: Option<Vec<String>>,
        body: &[Token],
        at: Position,
    ) {
        let Some(first) = body.first() else {
            self.report(SQL0305, at, format!("view '{name}' has no body"));
            return;
        };
        trace!("view {name} at {}", first.position);
        self.catalog.add_view(View {
            name,
            columns,
            sql: source_text(self.source, body).to_string(),
            path: self.path.to_string(),
            position: first.position,
        });
    }

    fn alter_table(&mut self, stmt: &mut Stmt<'_>, at: Position) {
        let Some(table_tok) = stmt.relation_name() else {
            self.report(SQL0300, at, "expected a table name".to_string());
            return;
        };
        let name = table_tok.value();
        if self.catalog.table(&name).is_none() {
            self.report(
                SQL0302,
                table_tok.position,
                format!("unknown table '{name}'"),
            );
            return;
        }

        if stmt.eat("ADD") {
            stmt.eat("COLUMN");
            let Some(column) = self.column_def(stmt.rest()) else {
                return;
            };
            let position = stmt.peek().map_or(at, |t| t.position);
            let Some(table) = self.catalog.table_mut(&name) else {
                return;
            };
            if table.has_column(&column.name) {
                let message = format!("duplicate column '{}' in table '{name}'", column.name);
                self.report(SQL0303, position, message);
            } else {
                table.columns.push(column);
            }
        } else if stmt.eat_all(&["RENAME", "TO"]) {
            let Some(new_name) = stmt.relation_name().map(Token::value) else {
                return;
            };
            if let Some(mut table) = self.catalog.remove_table(&name) {
                debug!("renamed table {name} to {new_name}");
                table.name = new_name;
                self.catalog.add_table(table);
            }
        } else if stmt.eat("RENAME") {
            stmt.eat("COLUMN");
            let (Some(old), true, Some(new)) = (stmt.bump(), stmt.eat("TO"), stmt.bump()) else {
                self.report(SQL0300, at, format!("malformed RENAME COLUMN on '{name}'"));
                return;
            };
            match self.catalog.table_mut(&name).and_then(|t| t.column_mut(&old.value())) {
                Some(col) => col.name = new.value(),
                None => self.report(
                    SQL0304,
                    old.position,
                    format!("unknown column '{}' in table '{name}'", old.value()),
                ),
            }
        } else if stmt.eat("DROP") {
            stmt.eat("COLUMN");
            let Some(col_tok) = stmt.bump() else {
                return;
            };
            let column = col_tok.value();
            let Some(table) = self.catalog.table_mut(&name) else {
                return;
            };
            let before = table.columns.len();
            table.columns.retain(|c| !c.name.eq_ignore_ascii_case(&column));
            if table.columns.len() == before {
                self.report(
                    SQL0304,
                    col_tok.position,
                    format!("unknown column '{column}' in table '{name}'"),
                );
            }
        }
    }

    fn drop_object(&mut self, stmt: &mut Stmt<'_>, at: Position) {
        let Some(kind) = stmt.bump() else {
            return;
        };
        let if_exists = stmt.eat_all(&["IF", "EXISTS"]);
        let Some(name_tok) = stmt.relation_name() else {
            return;
        };
        let name = name_tok.value();

        let found = if kind.is_word("TABLE") {
            self.catalog.remove_table(&name).is_some()
        } else if kind.is_word("VIEW") {
            self.catalog.remove_view(&name).is_some()
        } else if kind.is_word("INDEX") {
            let mut found = false;
            for table in self.catalog.tables_mut() {
                let before = table.indexes.len();
                table.indexes.retain(|i| !i.name.eq_ignore_ascii_case(&name));
                found |= table.indexes.len() != before;
            }
            found
        } else {
            trace!("skipping DROP at {at}");
            return;
        };

        if !found && !if_exists {
            self.report(
                SQL0302,
                name_tok.position,
                format!("cannot drop unknown {} '{name}'", kind.text.to_ascii_lowercase()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn catalog(sql: &str) -> (Catalog, Vec<Diagnostic>) {
        let mut catalog = Catalog::new();
        let diags = parse_schema("schema.sql", sql, &mut catalog);
        (catalog, diags)
    }

    #[test]
    fn test_create_table_constraints() {
        let (catalog, diags) = catalog(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email varchar(255) NOT NULL UNIQUE,
                score REAL DEFAULT -1.5 CHECK (score > -10),
                bio TEXT
            );",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let users = catalog.table("users").unwrap();
        let cols: Vec<_> = users
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.decl_type.as_str(), c.not_null))
            .collect();
        assert_eq!(
            cols,
            [
                ("id", "INTEGER", true),
                ("email", "varchar(255)", true),
                ("score", "REAL", false),
                ("bio", "TEXT", false),
            ]
        );
        assert_eq!(users.column("score").unwrap().default.as_deref(), Some("-1.5"));
        assert_eq!(users.primary_key, ["id"]);
    }

    #[test]
    fn test_table_primary_key_constraint() {
        let (catalog, _) = catalog(
            "CREATE TABLE IF NOT EXISTS main.tags (a TEXT, b TEXT, CONSTRAINT pk PRIMARY KEY (a, b));",
        );
        let tags = catalog.table("tags").unwrap();
        assert!(tags.columns.iter().all(|c| c.not_null && c.primary_key));
    }

    #[test]
    fn test_alter_and_drop() {
        let (catalog, diags) = catalog(
            "CREATE TABLE a (id INTEGER);
             ALTER TABLE a ADD COLUMN name TEXT NOT NULL;
             ALTER TABLE a RENAME COLUMN name TO title;
             CREATE TABLE b (x INTEGER);
             DROP TABLE b;
             ALTER TABLE a RENAME TO articles;
             CREATE INDEX idx_title ON articles (title);",
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert!(catalog.table("b").is_none());
        let articles = catalog.table("articles").unwrap();
        assert!(articles.column("title").unwrap().not_null);
        assert_eq!(articles.indexes[0].columns, ["title"]);
    }

    #[test]
    fn test_views_are_recorded() {
        let (catalog, diags) = catalog(
            "CREATE TABLE t (id INTEGER);\nCREATE VIEW v (n) AS SELECT id FROM t;",
        );
        assert!(diags.is_empty());
        let view = catalog.views().next().unwrap();
        assert_eq!(view.sql, "SELECT id FROM t");
        assert_eq!(view.position, Position::new(2, 22));
        assert_eq!(view.columns, Some(vec!["n".to_string()]));
    }

    #[test]
    fn test_trigger_bodies_are_skipped() {
        let (catalog, diags) = catalog(
            "CREATE TABLE t (id INTEGER);
             CREATE TRIGGER tr AFTER INSERT ON t BEGIN
               UPDATE t SET id = 1;
               DELETE FROM t;
             END;
             CREATE TABLE u (id INTEGER);",
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_schema_errors() {
        let (_, diags) = catalog(
            "CREATE TABLE t (id INTEGER, id TEXT);
             CREATE TABLE t (x INTEGER);
             ALTER TABLE missing ADD COLUMN y TEXT;
             DROP TABLE IF EXISTS gone;
             DROP VIEW gone;",
        );
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(codes, [SQL0303, SQL0301, SQL0302, SQL0302]);
    }
}
