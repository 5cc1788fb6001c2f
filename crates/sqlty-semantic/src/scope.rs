//! Scope management for SQL semantic analysis
//!
//! A [`Scope`] maps relation names and aliases to the columns visible under
//! them. Entries live in an arena; the name index maps every normalized name
//! or alias to an arena slot, so an alias is just a second key for the same
//! entry.
//!
//! Each analyzed query uses two scopes: the *base* scope with every catalog
//! table and CTE, and the *working* scope narrowed to the relations the main
//! statement actually references.

use indexmap::{IndexMap, IndexSet};
use log::trace;
use sqlty_ast::{normalize, Catalog, Position, Token, TokenKind};
use sqlty_parser::scan::{depths, matching_paren};
use sqlty_types::{TypeInfo, TypeResolver};
use thiserror::Error;

/// Global `table.column` → type overrides, keyed by normalized name
pub type ColumnOverrides = IndexMap<String, TypeInfo>;

/// Key of a column override
pub fn override_key(table: &str, column: &str) -> String {
    format!("{}.{}", normalize(table), normalize(column))
}

/// Scope lookup failures. The `Display` text is the diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("unknown table or alias '{name}'")]
    UnknownRelation { name: String },

    #[error("unknown column '{column}' in '{relation}'")]
    UnknownColumn { relation: String, column: String },

    #[error("unknown column '{column}'")]
    NoSuchColumn { column: String },

    #[error("column '{column}' is ambiguous; qualify with a table alias")]
    Ambiguous { column: String },

    /// The name may come from a derived table or an unknown relation, whose
    /// columns are not tracked
    #[error("column '{column}' derives from expression without schema mapping")]
    Unmapped { column: String },
}

/// A column visible through a scope entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeColumn {
    pub name: String,
    /// Relation that owns the column
    pub relation: String,
    pub ty: TypeInfo,
}

/// A relation visible in a scope: its columns in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub name: String,
    columns: Vec<ScopeColumn>,
    index: IndexMap<String, usize>,
}

impl ScopeEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            index: IndexMap::new(),
        }
    }

    /// Add a column; a repeated name keeps the first definition
    pub fn push(&mut self, name: impl Into<String>, ty: TypeInfo) {
        let name = name.into();
        let key = normalize(&name);
        if self.index.contains_key(&key) {
            return;
        }
        self.index.insert(key, self.columns.len());
        self.columns.push(ScopeColumn {
            name,
            relation: self.name.clone(),
            ty,
        });
    }

    pub fn columns(&self) -> &[ScopeColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ScopeColumn> {
        self.index.get(&normalize(name)).map(|&i| &self.columns[i])
    }
}

/// A relation referenced by a statement but absent from the base scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRelation {
    pub name: String,
    pub position: Position,
}

/// Relation names and aliases mapped to arena entries
#[derive(Debug, Clone, Default)]
pub struct Scope {
    entries: Vec<ScopeEntry>,
    names: IndexMap<String, usize>,
    /// Derived tables and unknown relations: known names without columns
    opaque: IndexSet<String>,
    missing: Vec<MissingRelation>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base scope: one entry per catalog table, columns in declared order
    pub fn from_catalog(
        catalog: &Catalog,
        resolver: &dyn TypeResolver,
        overrides: &ColumnOverrides,
    ) -> Self {
        let mut scope = Self::new();
        for table in catalog.tables() {
            let mut entry = ScopeEntry::new(table.name.clone());
            for column in &table.columns {
                let ty = overrides
                    .get(&override_key(&table.name, &column.name))
                    .cloned()
                    .unwrap_or_else(|| resolver.column_type(&column.decl_type, column.not_null));
                entry.push(column.name.clone(), ty);
            }
            scope.add_entry(entry);
        }
        scope
    }

    /// Register an entry under its own name, replacing any entry of that name
    pub fn add_entry(&mut self, entry: ScopeEntry) -> usize {
        let key = normalize(&entry.name);
        if let Some(&slot) = self.names.get(&key) {
            self.entries[slot] = entry;
            return slot;
        }
        let slot = self.entries.len();
        self.entries.push(entry);
        self.names.insert(key, slot);
        slot
    }

    /// Register `alias` as another name for an existing slot
    pub fn add_alias(&mut self, alias: &str, slot: usize) {
        self.names.insert(normalize(alias), slot);
    }

    pub fn entry(&self, name: &str) -> Option<&ScopeEntry> {
        self.names.get(&normalize(name)).map(|&slot| &self.entries[slot])
    }

    /// Distinct entries, in registration (reference) order
    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    /// Whether `name` is a relation or alias of this scope, tracked or not
    pub fn is_relation(&self, name: &str) -> bool {
        let key = normalize(name);
        self.names.contains_key(&key) || self.opaque.contains(&key)
    }

    pub fn is_opaque(&self, name: &str) -> bool {
        self.opaque.contains(&normalize(name))
    }

    pub fn has_opaque(&self) -> bool {
        !self.opaque.is_empty()
    }

    pub fn missing(&self) -> &[MissingRelation] {
        &self.missing
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `[qualifier.]column`
    pub fn lookup(&self, qualifier: Option<&str>, column: &str) -> Result<&ScopeColumn, LookupError> {
        if let Some(qualifier) = qualifier {
            let key = normalize(qualifier);
            return match self.names.get(&key) {
                Some(&slot) => self.entries[slot].column(column).ok_or_else(|| {
                    LookupError::UnknownColumn {
                        relation: qualifier.to_string(),
                        column: column.to_string(),
                    }
                }),
                None if self.opaque.contains(&key) => Err(LookupError::Unmapped {
                    column: column.to_string(),
                }),
                None => Err(LookupError::UnknownRelation {
                    name: qualifier.to_string(),
                }),
            };
        }

        let mut hits = self.entries.iter().filter_map(|e| e.column(column));
        match (hits.next(), hits.next()) {
            (Some(col), None) => Ok(col),
            (Some(_), Some(_)) => Err(LookupError::Ambiguous {
                column: column.to_string(),
            }),
            (None, _) if self.has_opaque() => Err(LookupError::Unmapped {
                column: column.to_string(),
            }),
            (None, _) => Err(LookupError::NoSuchColumn {
                column: column.to_string(),
            }),
        }
    }

    /// Working scope holding only the relations `tokens` references.
    ///
    /// Only relations at parenthesis depth 0 count, so subqueries do not leak
    /// their relations into the outer statement.
    pub fn narrow_to_referenced(&self, tokens: &[Token]) -> Scope {
        let mut out = Scope::new();
        for rel in relation_refs(tokens) {
            if rel.derived {
                if let Some(alias) = &rel.alias {
                    out.opaque.insert(normalize(alias));
                }
                continue;
            }

            let Some(&slot) = self.names.get(&normalize(&rel.name)) else {
                out.opaque.insert(normalize(&rel.name));
                if let Some(alias) = &rel.alias {
                    out.opaque.insert(normalize(alias));
                }
                out.missing.push(MissingRelation {
                    name: rel.name,
                    position: rel.position,
                });
                continue;
            };

            let entry = &self.entries[slot];
            let seen = out.names.contains_key(&normalize(&rel.name));
            match (seen, &rel.alias) {
                // The same relation referenced again without an alias
                (true, None) => {}
                // Self-join: the alias names a distinct reference
                (true, Some(alias)) => {
                    if !out.names.contains_key(&normalize(alias)) {
                        let copy = out.entries.len();
                        out.entries.push(entry.clone());
                        out.add_alias(alias, copy);
                    }
                }
                (false, alias) => {
                    let copy = out.add_entry(entry.clone());
                    if let Some(alias) = alias {
                        out.add_alias(alias, copy);
                    }
                }
            }
        }
        trace!(
            "narrowed scope to {:?}",
            out.entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>()
        );
        out
    }
}

/// A relation reference in a `FROM`, `JOIN`, `INTO` or `UPDATE` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRef {
    /// Relation name without schema qualifier; empty for subqueries
    pub name: String,
    pub alias: Option<String>,
    /// Position of the relation name (or the subquery's parenthesis)
    pub position: Position,
    /// Subquery or table-valued function
    pub derived: bool,
    /// Token indices naming the relation or its alias
    pub tokens: Vec<usize>,
}

/// Words that can follow a relation and are not an alias
const NOT_ALIAS: &[&str] = &["INDEXED", "DO"];

/// Depth-0 relation references of a statement, in source order
pub fn relation_refs(tokens: &[Token]) -> Vec<RelationRef> {
    let depth = depths(tokens);
    let mut refs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        let opens_clause = depth[i] == 0
            && tok.is_any_word(&["FROM", "JOIN", "INTO", "UPDATE"])
            && !(tok.is_word("FROM") && i > 0 && tokens[i - 1].is_word("DISTINCT"));
        if !opens_clause {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        if tok.is_word("UPDATE") && tokens.get(j).is_some_and(|t| t.is_word("OR")) {
            j += 2;
        }
        let allow_function = !tok.is_word("INTO");
        while let Some((rel, next)) = relation_ref(tokens, j, allow_function) {
            refs.push(rel);
            j = next;
            let list = tok.is_word("FROM") && tokens.get(j).is_some_and(|t| t.kind == TokenKind::Comma);
            if !list {
                break;
            }
            j += 1;
        }
        i = j.max(i + 1);
    }
    refs
}

fn relation_ref(tokens: &[Token], start: usize, allow_function: bool) -> Option<(RelationRef, usize)> {
    let first = tokens.get(start)?;

    if first.kind == TokenKind::LParen {
        let close = matching_paren(tokens, start)?;
        let (alias, alias_idx, next) = alias(tokens, close + 1);
        let rel = RelationRef {
            name: String::new(),
            alias,
            position: first.position,
            derived: true,
            tokens: alias_idx.into_iter().collect(),
        };
        return Some((rel, next));
    }
    if !first.is_name() {
        return None;
    }

    let mut name_idx = start;
    let mut k = start + 1;
    let mut idx = vec![start];
    while tokens.get(k).is_some_and(|t| t.kind == TokenKind::Dot)
        && tokens.get(k + 1).is_some_and(Token::is_name)
    {
        name_idx = k + 1;
        idx.push(name_idx);
        k += 2;
    }

    let mut derived = false;
    if allow_function && tokens.get(k).is_some_and(|t| t.kind == TokenKind::LParen) {
        derived = true;
        k = matching_paren(tokens, k)? + 1;
    }

    let (alias, alias_idx, next) = alias(tokens, k);
    idx.extend(alias_idx);
    let name_tok = &tokens[name_idx];
    let rel = RelationRef {
        name: name_tok.value(),
        alias,
        position: name_tok.position,
        derived,
        tokens: idx,
    };
    Some((rel, next))
}

fn alias(tokens: &[Token], at: usize) -> (Option<String>, Option<usize>, usize) {
    let explicit = tokens.get(at).is_some_and(|t| t.is_word("AS"));
    let idx = if explicit { at + 1 } else { at };
    match tokens.get(idx) {
        Some(tok) if tok.is_name() && !tok.is_any_word(NOT_ALIAS) => {
            (Some(tok.value()), Some(idx), idx + 1)
        }
        _ => (None, None, at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlty_ast::{Column, Table};
    use sqlty_parser::tokenize;
    use sqlty_types::{SemanticType, SqliteTypeResolver};

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("users")
                .with_column(Column::new("id", "INTEGER").primary_key())
                .with_column(Column::new("name", "TEXT").not_null())
                .with_column(Column::new("email", "TEXT")),
        );
        catalog.add_table(
            Table::new("orders")
                .with_column(Column::new("id", "INTEGER").primary_key())
                .with_column(Column::new("user_id", "INTEGER").not_null())
                .with_column(Column::new("total", "REAL")),
        );
        catalog
    }

    fn base() -> Scope {
        Scope::from_catalog(&catalog(), &SqliteTypeResolver, &ColumnOverrides::new())
    }

    fn working(sql: &str) -> Scope {
        base().narrow_to_referenced(&tokenize(sql).unwrap())
    }

    #[test]
    fn test_base_scope_mirrors_catalog() {
        let scope = base();
        let users = scope.entry("USERS").unwrap();
        let names: Vec<_> = users.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "email"]);
        assert_eq!(
            scope.lookup(Some("users"), "name").unwrap().ty,
            TypeInfo::not_null(SemanticType::String)
        );
    }

    #[test]
    fn test_overrides_replace_catalog_types() {
        let mut overrides = ColumnOverrides::new();
        overrides.insert(override_key("Users", "Email"), TypeInfo::not_null(SemanticType::Bytes));
        let scope = Scope::from_catalog(&catalog(), &SqliteTypeResolver, &overrides);
        assert_eq!(
            scope.lookup(Some("users"), "email").unwrap().ty,
            TypeInfo::not_null(SemanticType::Bytes)
        );
    }

    #[test]
    fn test_narrowing_registers_aliases() {
        let scope = working("SELECT u.id FROM users AS u JOIN orders o ON o.user_id = u.id");
        assert_eq!(scope.entries().len(), 2);
        assert_eq!(scope.lookup(Some("u"), "email").unwrap().relation, "users");
        assert_eq!(scope.lookup(Some("users"), "email").unwrap().relation, "users");
        assert_eq!(
            scope.lookup(None, "id").unwrap_err(),
            LookupError::Ambiguous { column: "id".into() }
        );
        assert_eq!(scope.lookup(None, "total").unwrap().relation, "orders");
    }

    #[test]
    fn test_subqueries_do_not_leak() {
        let scope = working("SELECT id FROM users WHERE id IN (SELECT user_id FROM orders)");
        assert_eq!(scope.entries().len(), 1);
        assert!(scope.entry("orders").is_none());
        assert!(scope.lookup(None, "id").is_ok());
    }

    #[test]
    fn test_comma_lists_and_schema_names() {
        let scope = working("SELECT * FROM main.users u, orders WHERE u.id = orders.user_id");
        let names: Vec<_> = scope.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["users", "orders"]);
    }

    #[test]
    fn test_missing_relations_are_recorded() {
        let scope = working("SELECT p.id FROM payments p JOIN users ON 1");
        assert_eq!(scope.missing().len(), 1);
        assert_eq!(scope.missing()[0].name, "payments");
        assert_eq!(scope.missing()[0].position, Position::new(1, 18));
        assert_eq!(
            scope.lookup(Some("p"), "id").unwrap_err(),
            LookupError::Unmapped { column: "id".into() }
        );
        assert_eq!(
            scope.lookup(Some("x"), "id").unwrap_err().to_string(),
            "unknown table or alias 'x'"
        );
    }

    #[test]
    fn test_self_join_aliases_are_distinct() {
        let scope = working("SELECT a.id FROM users a JOIN users b ON a.id = b.id");
        assert_eq!(scope.entries().len(), 2);
        assert!(matches!(
            scope.lookup(None, "name"),
            Err(LookupError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_mutation_targets() {
        assert!(working("UPDATE OR IGNORE users SET name = ?").entry("users").is_some());
        assert!(working("INSERT INTO orders (user_id) VALUES (?)").entry("orders").is_some());
        assert!(working("DELETE FROM orders WHERE id = ?").entry("orders").is_some());
        let upsert = working("INSERT INTO users (id) VALUES (1) ON CONFLICT (id) DO UPDATE SET name = 'x'");
        assert_eq!(upsert.entries().len(), 1);
    }

    #[test]
    fn test_derived_tables_are_opaque() {
        let scope = working("SELECT s.n FROM (SELECT 1 AS n) AS s, json_each('[1]') j");
        assert!(scope.is_opaque("s"));
        assert!(scope.is_opaque("j"));
        assert!(scope.missing().is_empty());
        assert!(matches!(scope.lookup(None, "n"), Err(LookupError::Unmapped { .. })));
    }
}
