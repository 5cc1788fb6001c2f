//! Declared-type resolution
//!
//! A [`TypeResolver`] maps the declared type string of a catalog column
//! (`INTEGER`, `varchar(255)`, ...) to a [`SemanticType`]. The analyzer only
//! ever talks to the trait, so another dialect can plug in its own mapping.

use crate::{SemanticType, TypeInfo};

/// Maps declared column types to semantic types
pub trait TypeResolver: Send + Sync {
    /// Semantic type for a declared type, `None` when it has no mapping
    fn resolve(&self, decl_type: &str) -> Option<SemanticType>;

    /// Type of a catalog column with the given declaration
    fn column_type(&self, decl_type: &str, not_null: bool) -> TypeInfo {
        match self.resolve(decl_type) {
            Some(ty) => TypeInfo::new(ty, !not_null),
            None => TypeInfo::Unresolved,
        }
    }

    /// Type named by an annotation or a `CAST(.. AS T)` target.
    ///
    /// Semantic type names (`int64`, `[]string`) are accepted first, then
    /// declared SQL types.
    fn named_type(&self, name: &str) -> Option<SemanticType> {
        name.parse().ok().or_else(|| self.resolve(name))
    }
}

/// SQLite column affinity rules
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTypeResolver;

impl SqliteTypeResolver {
    pub fn new() -> Self {
        Self
    }
}

impl TypeResolver for SqliteTypeResolver {
    fn resolve(&self, decl_type: &str) -> Option<SemanticType> {
        let decl = decl_type.to_ascii_uppercase();
        let has = |needle: &str| decl.contains(needle);

        // Checked in SQLite's affinity order: INT wins over everything.
        if has("INT") {
            Some(SemanticType::Int64)
        } else if has("CHAR") || has("CLOB") || has("TEXT") {
            Some(SemanticType::String)
        } else if has("BLOB") {
            Some(SemanticType::Bytes)
        } else if has("REAL") || has("FLOA") || has("DOUB") {
            Some(SemanticType::Float64)
        } else if has("BOOL") {
            Some(SemanticType::Bool)
        } else if has("NUMERIC") || has("DECIMAL") {
            Some(SemanticType::String)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_nullability() {
        let resolver = SqliteTypeResolver;
        assert_eq!(
            resolver.column_type("INTEGER", true),
            TypeInfo::not_null(SemanticType::Int64)
        );
        assert_eq!(
            resolver.column_type("TEXT", false),
            TypeInfo::nullable(SemanticType::String)
        );
        assert_eq!(resolver.column_type("DATETIME", true), TypeInfo::Unresolved);
    }

    #[test]
    fn test_named_type_prefers_semantic_names() {
        let resolver = SqliteTypeResolver;
        assert_eq!(resolver.named_type("float64"), Some(SemanticType::Float64));
        assert_eq!(resolver.named_type("VARCHAR(10)"), Some(SemanticType::String));
        assert_eq!(resolver.named_type("[]int64"), Some(SemanticType::list(SemanticType::Int64)));
        assert_eq!(resolver.named_type("jsonb"), None);
    }
}
