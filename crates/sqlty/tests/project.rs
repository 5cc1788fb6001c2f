//! Pipeline tests over real files

use pretty_assertions::assert_eq;
use sqlty::diagnostics::{SQL0101, SQL0404};
use sqlty::{Config, Project, SemanticType, TypeInfo};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const USERS: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT);\n";
const VIEWS: &str = "CREATE VIEW user_emails AS SELECT id, email FROM users;\n";

const USER_QUERIES: &str = "\
-- name: GetUser :one
SELECT id, name, email FROM users WHERE id = ?;

-- name: ListEmails :many
SELECT email FROM user_emails ORDER BY id;
";

const BROKEN_QUERIES: &str = "\
-- name: Broken :many
SELECT nickname FROM users;
";

const CONFIG: &str = r#"{
  "schema": ["schema"],
  "queries": ["queries"],
  "overrides": [{ "column": "users.email", "type": "bytes", "nullable": true }]
}"#;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn project_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "schema/01_users.sql", USERS);
    write(dir.path(), "schema/02_views.sql", VIEWS);
    write(dir.path(), "queries/users.sql", USER_QUERIES);
    write(dir.path(), "queries/broken.sql", BROKEN_QUERIES);
    write(dir.path(), "queries/README.md", "not sql");
    write(dir.path(), "sqlty.json", CONFIG);
    dir
}

#[test]
fn test_directories_expand_to_sorted_sql_files() {
    let dir = project_dir();
    let config = Config::discover(dir.path()).unwrap().unwrap();
    let names: Vec<_> = config
        .query_files()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["broken.sql", "users.sql"]);
    assert_eq!(config.schema_files().unwrap().len(), 2);
}

#[test]
fn test_project_from_config() {
    let dir = project_dir();
    let config = Config::load(&dir.path().join("sqlty.json")).unwrap();
    let project = Project::from_config(&config).unwrap();
    assert!(project.schema_diagnostics().is_empty());
    assert!(project.catalog().unwrap().table("user_emails").unwrap().is_view);

    let report = project.analyze_file(&dir.path().join("queries/users.sql")).unwrap();
    assert!(report.all_diagnostics().is_empty());

    let get = report.query("GetUser").unwrap();
    let types: Vec<_> = get.result.columns.iter().map(|c| (c.name.as_str(), c.ty.clone())).collect();
    assert_eq!(
        types,
        [
            ("id", TypeInfo::not_null(SemanticType::Int64)),
            ("name", TypeInfo::not_null(SemanticType::String)),
            ("email", TypeInfo::nullable(SemanticType::Bytes)),
        ]
    );
}

#[test]
fn test_errors_are_located_in_the_query_file() {
    let dir = project_dir();
    let config = Config::discover(dir.path()).unwrap().unwrap();
    let project = Project::from_config(&config).unwrap();

    let report = project.analyze_file(&dir.path().join("queries/broken.sql")).unwrap();
    let found: Vec<_> = report
        .all_diagnostics()
        .into_iter()
        .map(|d| (d.code, d.line, d.column, d.message))
        .collect();
    assert_eq!(found, [(SQL0101, 2, 8, "unknown column 'nickname'".to_string())]);
    assert!(report.all_diagnostics()[0].path.ends_with("broken.sql"));
}

#[test]
fn test_missing_schema_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_json(r#"{ "schema": ["nope.sql"] }"#, dir.path()).unwrap();
    let err = Project::from_config(&config).err().unwrap();
    assert_eq!(err.code(), SQL0404);
}

#[test]
fn test_config_without_schema_leaves_types_unresolved() {
    let dir = project_dir();
    let config = Config::from_json(r#"{ "queries": ["queries/users.sql"] }"#, dir.path()).unwrap();
    let project = Project::from_config(&config).unwrap();
    assert!(project.catalog().is_none());

    let report = project.analyze_file(&config.query_files().unwrap()[0]).unwrap();
    let get = report.query("GetUser").unwrap();
    assert!(get.result.columns.iter().all(|c| c.ty == TypeInfo::Unresolved));
}

#[test]
fn test_report_json_shape() {
    let project = Project::with_schema([("schema.sql", USERS)]);
    let report = project.analyze_source("users.sql", "-- name: Count :one\nSELECT COUNT(*) AS n FROM users;\n");
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "path": "users.sql",
            "queries": [{
                "name": "Count",
                "command": "one",
                "columns": [{ "name": "n", "kind": "resolved", "type": "int64", "nullable": false }],
                "params": [],
                "diagnostics": []
            }]
        })
    );
}
