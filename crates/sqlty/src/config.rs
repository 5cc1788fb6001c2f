//! Project configuration
//!
//! A project is described by a `sqlty.json` file:
//!
//! ```json
//! {
//!   "schema": ["schema.sql"],
//!   "queries": ["queries/"],
//!   "overrides": [{ "column": "users.id", "type": "int64", "nullable": false }],
//!   "strict": false
//! }
//! ```
//!
//! Relative paths resolve against the directory holding the file. A
//! directory entry stands for every `*.sql` file directly inside it.

use serde::{Deserialize, Serialize};
use sqlty_diagnostics::{Result, SqltyError, SQL0401, SQL0402, SQL0404};
use sqlty_semantic::{override_key, ColumnOverrides};
use sqlty_types::{SemanticType, TypeInfo};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "sqlty.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Schema files or directories, applied in order
    pub schema: Vec<PathBuf>,
    /// Query files or directories
    pub queries: Vec<PathBuf>,
    pub overrides: Vec<ColumnOverride>,
    /// Treat warnings as errors
    pub strict: bool,
}

/// A global `table.column` type override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnOverride {
    pub column: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
}

impl Config {
    /// Read a configuration file, resolving its paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            let code = if e.kind() == std::io::ErrorKind::NotFound { SQL0404 } else { SQL0401 };
            SqltyError::system(code, format!("cannot read {}: {e}", path.display()))
        })?;
        let base = path.parent().unwrap_or(Path::new(""));
        Self::from_json(&text, base)
            .map_err(|e| SqltyError::system(SQL0402, format!("{}: {}", path.display(), e.message())))
    }

    /// Load `sqlty.json` from `dir` if there is one
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        log::debug!("using configuration {}", path.display());
        Self::load(&path).map(Some)
    }

    /// Parse configuration text; relative paths are joined onto `base`
    pub fn from_json(text: &str, base: &Path) -> Result<Self> {
        let mut config: Self = serde_json::from_str(text)
            .map_err(|e| SqltyError::system(SQL0402, format!("invalid configuration: {e}")))?;
        for path in config.schema.iter_mut().chain(config.queries.iter_mut()) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        Ok(config)
    }

    /// Global override map keyed by normalized `table.column`
    pub fn column_overrides(&self) -> Result<ColumnOverrides> {
        let mut overrides = ColumnOverrides::new();
        for entry in &self.overrides {
            let Some((table, column)) = entry.column.split_once('.') else {
                return Err(SqltyError::system(
                    SQL0402,
                    format!("override column '{}' must be written as table.column", entry.column),
                ));
            };
            let ty: SemanticType = entry.type_name.parse().map_err(|e| {
                SqltyError::system(SQL0402, format!("override for '{}': {e}", entry.column))
            })?;
            overrides.insert(override_key(table, column), TypeInfo::new(ty, entry.nullable));
        }
        Ok(overrides)
    }

    pub fn schema_files(&self) -> Result<Vec<PathBuf>> {
        expand_sql_files(&self.schema)
    }

    pub fn query_files(&self) -> Result<Vec<PathBuf>> {
        expand_sql_files(&self.queries)
    }
}

/// Files named by `paths`, directories replaced by their sorted `*.sql` files
pub fn expand_sql_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = fs::read_dir(path).map_err(|e| {
                SqltyError::system(SQL0401, format!("cannot list {}: {e}", path.display()))
            })?;
            let mut found: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sql"))
                .collect();
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(SqltyError::system(
                SQL0404,
                format!("no such file or directory: {}", path.display()),
            ));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paths_resolve_against_config_dir() {
        let config = Config::from_json(
            r#"{ "schema": ["db/schema.sql", "/abs/extra.sql"], "queries": ["queries"] }"#,
            Path::new("/project"),
        )
        .unwrap();
        assert_eq!(
            config.schema,
            [PathBuf::from("/project/db/schema.sql"), PathBuf::from("/abs/extra.sql")]
        );
        assert_eq!(config.queries, [PathBuf::from("/project/queries")]);
        assert!(!config.strict);
    }

    #[test]
    fn test_column_overrides() {
        let config = Config::from_json(
            r#"{ "overrides": [
                { "column": "Users.Created_At", "type": "int64" },
                { "column": "users.meta", "type": "bytes", "nullable": true }
            ] }"#,
            Path::new(""),
        )
        .unwrap();
        let overrides = config.column_overrides().unwrap();
        assert_eq!(
            overrides.get("users.created_at"),
            Some(&TypeInfo::not_null(SemanticType::Int64))
        );
        assert_eq!(
            overrides.get("users.meta"),
            Some(&TypeInfo::nullable(SemanticType::Bytes))
        );
    }

    #[test]
    fn test_bad_overrides_are_configuration_errors() {
        let unqualified = Config::from_json(
            r#"{ "overrides": [{ "column": "id", "type": "int64" }] }"#,
            Path::new(""),
        )
        .unwrap();
        assert_eq!(unqualified.column_overrides().unwrap_err().code(), SQL0402);

        let bad_type = Config::from_json(
            r#"{ "overrides": [{ "column": "t.id", "type": "uuid" }] }"#,
            Path::new(""),
        )
        .unwrap();
        let err = bad_type.column_overrides().unwrap_err();
        assert_eq!(err.message(), "override for 't.id': unknown type 'uuid'");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Config::from_json(r#"{ "schemas": [] }"#, Path::new("")).unwrap_err();
        assert_eq!(err.code(), SQL0402);
    }
}
