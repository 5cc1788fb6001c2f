//! Command-line configuration and check runs

#![cfg(feature = "cli")]

use pretty_assertions::assert_eq;
use sqlty::cli::analyze::reports;
use sqlty::cli::check::{run, CheckSummary};
use sqlty::cli::Inputs;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn workspace(config: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("queries")).unwrap();
    fs::write(
        dir.path().join("schema.sql"),
        "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL, price REAL);\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("queries/items.sql"),
        "-- name: ListItems :many\nSELECT id, label, SUM(price) FROM items GROUP BY id, label;\n",
    )
    .unwrap();
    fs::write(dir.path().join("sqlty.json"), config).unwrap();
    dir
}

#[test]
fn test_discovered_config() {
    let dir = workspace(r#"{ "schema": ["schema.sql"], "queries": ["queries"], "strict": true }"#);
    let config = Inputs::default().resolve(dir.path()).unwrap();
    assert!(config.strict);
    assert_eq!(config.queries, [dir.path().join("queries")]);
}

#[test]
fn test_flags_take_precedence() {
    let dir = workspace(r#"{ "schema": ["schema.sql"], "queries": ["queries"] }"#);
    let inputs = Inputs {
        files: vec![PathBuf::from("other.sql")],
        strict: true,
        ..Inputs::default()
    };
    let config = inputs.resolve(dir.path()).unwrap();
    assert_eq!(config.queries, [PathBuf::from("other.sql")]);
    assert_eq!(config.schema, [dir.path().join("schema.sql")]);
    assert!(config.strict);
}

#[test]
fn test_no_queries_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Inputs::default().resolve(dir.path()).unwrap_err();
    assert!(err.to_string().starts_with("No query files specified"));
}

#[test]
fn test_explicit_config_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = Inputs {
        config: Some(dir.path().join("missing.json")),
        ..Inputs::default()
    };
    let err = inputs.resolve(dir.path()).unwrap_err();
    assert!(err.to_string().starts_with("Failed to load configuration"));
}

#[test]
fn test_strict_mode_fails_on_warnings() {
    let dir = workspace(r#"{ "schema": ["schema.sql"], "queries": ["queries"] }"#);
    let mut config = Inputs::default().resolve(dir.path()).unwrap();

    let (summary, diagnostics) = run(&config).unwrap();
    assert_eq!(
        summary,
        CheckSummary {
            files: 1,
            errors: 0,
            warnings: 1,
            strict: false,
        }
    );
    assert_eq!(
        diagnostics[0].message,
        "aggregate SUM(price) has no alias; using 'sum_price'"
    );
    assert!(summary.passed());

    config.strict = true;
    let (summary, _) = run(&config).unwrap();
    assert!(!summary.passed());
}

#[test]
fn test_analyze_reports() {
    let dir = workspace(r#"{ "schema": ["schema.sql"], "queries": ["queries"] }"#);
    let config = Inputs::default().resolve(dir.path()).unwrap();
    let reports = reports(&config).unwrap();
    assert_eq!(reports.len(), 1);

    let names: Vec<_> = reports[0].queries[0]
        .result
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.ty.to_string()))
        .collect();
    assert_eq!(
        names,
        [
            ("id", "int64".to_string()),
            ("label", "string".to_string()),
            ("sum_price", "float64?".to_string()),
        ]
    );
}
