//! View resolution
//!
//! Views are analyzed like queries, in declaration order, and registered as
//! relations whose columns carry the inferred types. A view can therefore
//! select from any table or earlier view.

use log::debug;
use sqlty_ast::{Catalog, Column, QueryBlock, QueryCommand, Table};
use sqlty_diagnostics::{Diagnostic, SQL0305};
use sqlty_parser::parse_statement;
use sqlty_types::TypeResolver;

use crate::Analyzer;

/// Catalog with every view registered as a relation
pub fn resolve_views(catalog: &Catalog, resolver: &dyn TypeResolver) -> (Catalog, Vec<Diagnostic>) {
    let mut resolved = catalog.clone();
    let mut diagnostics = Vec::new();

    for view in catalog.views() {
        let query = match parse_statement(&view.sql, view.position) {
            Ok(query) => query,
            Err(err) => {
                diagnostics.push(err.to_diagnostic(&view.path));
                continue;
            }
        };
        let block = QueryBlock {
            name: view.name.clone(),
            command: QueryCommand::Many,
            path: view.path.clone(),
            position: view.position,
            sql: view.sql.clone(),
            doc: None,
            query,
            param_overrides: Vec::new(),
            column_overrides: Vec::new(),
        };
        let result = Analyzer::new(Some(&resolved), resolver).analyze(&block);
        diagnostics.extend(result.diagnostics);

        let mut columns = result.columns;
        if let Some(names) = &view.columns {
            if names.len() == columns.len() {
                for (column, name) in columns.iter_mut().zip(names) {
                    column.name = name.clone();
                }
            } else {
                diagnostics.push(
                    Diagnostic::error(
                        SQL0305,
                        format!(
                            "view '{}' declares {} columns but its query produces {}",
                            view.name,
                            names.len(),
                            columns.len()
                        ),
                    )
                    .with_path(view.path.clone())
                    .with_position(view.position),
                );
            }
        }

        let mut table = Table::new(view.name.clone());
        table.is_view = true;
        for column in columns {
            let decl = column.ty.semantic().map_or("", |ty| ty.canonical_decl());
            let mut col = Column::new(column.name, decl);
            col.not_null = !column.ty.is_nullable();
            table.columns.push(col);
        }
        debug!("resolved view '{}' with {} columns", table.name, table.columns.len());
        resolved.add_table(table);
    }
    (resolved, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlty_parser::parse_schemas;
    use sqlty_types::{SemanticType, SqliteTypeResolver, TypeInfo};

    const SCHEMA: &str = "\
CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL, bio TEXT);
CREATE VIEW author_names AS SELECT id, name FROM authors;
CREATE VIEW short_names(n) AS SELECT name FROM author_names;
";

    #[test]
    fn test_views_become_relations() {
        let (catalog, diags) = parse_schemas([("schema.sql", SCHEMA)]);
        assert!(diags.is_empty());
        let (resolved, diags) = resolve_views(&catalog, &SqliteTypeResolver);
        assert!(diags.is_empty());

        let view = resolved.table("author_names").unwrap();
        assert!(view.is_view);
        let cols: Vec<_> = view.columns.iter().map(|c| (c.name.as_str(), c.not_null)).collect();
        assert_eq!(cols, [("id", true), ("name", true)]);

        let short = resolved.table("short_names").unwrap();
        assert_eq!(short.columns[0].name, "n");
        assert_eq!(
            SqliteTypeResolver.column_type(&short.columns[0].decl_type, short.columns[0].not_null),
            TypeInfo::not_null(SemanticType::String)
        );
    }

    #[test]
    fn test_view_column_count_mismatch() {
        let schema = "CREATE TABLE t (a INTEGER, b TEXT);\nCREATE VIEW v(x) AS SELECT a, b FROM t;";
        let (catalog, _) = parse_schemas([("schema.sql", schema)]);
        let (_, diags) = resolve_views(&catalog, &SqliteTypeResolver);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, SQL0305);
    }
}
