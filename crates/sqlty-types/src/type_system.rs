//! Semantic types
//!
//! Semantic types are the language-agnostic vocabulary code generators map to
//! their own types. They are deliberately few: the storage classes SQLite can
//! return plus booleans, and lists for slice parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A language-agnostic value type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SemanticType {
    /// 64-bit signed integer
    Int64,
    /// 64-bit float
    Float64,
    /// UTF-8 text
    String,
    /// Raw bytes
    Bytes,
    Bool,
    /// A list of values, bound through a slice parameter
    List(Box<SemanticType>),
}

impl SemanticType {
    /// Create a list type
    pub fn list(element: SemanticType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Element type of a list, or the type itself
    pub fn element(&self) -> &SemanticType {
        match self {
            Self::List(inner) => inner,
            other => other,
        }
    }

    /// Declared column type that maps back to this type.
    ///
    /// Used when a view is registered as a relation: its columns get these
    /// declared types so the regular resolver recovers the inferred types.
    pub fn canonical_decl(&self) -> &'static str {
        match self {
            Self::Int64 => "INTEGER",
            Self::Float64 => "REAL",
            Self::String => "TEXT",
            Self::Bytes => "BLOB",
            Self::Bool => "BOOLEAN",
            Self::List(_) => "",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64 => write!(f, "int64"),
            Self::Float64 => write!(f, "float64"),
            Self::String => write!(f, "string"),
            Self::Bytes => write!(f, "bytes"),
            Self::Bool => write!(f, "bool"),
            Self::List(inner) => write!(f, "list<{inner}>"),
        }
    }
}

/// Failure to read a semantic type name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown type '{0}'")]
pub struct TypeParseError(pub String);

impl FromStr for SemanticType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let lower = name.to_ascii_lowercase();
        if let Some(inner) = lower.strip_prefix("[]") {
            return inner.parse().map(Self::list);
        }
        if let Some(inner) = lower
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return inner.parse().map(Self::list);
        }
        match lower.as_str() {
            "int64" | "i64" | "int" | "integer" => Ok(Self::Int64),
            "float64" | "f64" | "float" | "double" | "real" => Ok(Self::Float64),
            "string" | "str" | "text" => Ok(Self::String),
            "bytes" | "blob" => Ok(Self::Bytes),
            "bool" | "boolean" => Ok(Self::Bool),
            _ => Err(TypeParseError(name.to_string())),
        }
    }
}

impl From<SemanticType> for String {
    fn from(ty: SemanticType) -> Self {
        ty.to_string()
    }
}

impl TryFrom<String> for SemanticType {
    type Error = TypeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Type and nullability of a result column or parameter.
///
/// `Unresolved` is the "unknown, nullable" sentinel for anything the
/// analyzer could not type; it is never silently mixed up with a real type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeInfo {
    Resolved {
        #[serde(rename = "type")]
        ty: SemanticType,
        nullable: bool,
    },
    #[default]
    Unresolved,
}

impl TypeInfo {
    pub fn new(ty: SemanticType, nullable: bool) -> Self {
        Self::Resolved { ty, nullable }
    }

    pub fn not_null(ty: SemanticType) -> Self {
        Self::new(ty, false)
    }

    pub fn nullable(ty: SemanticType) -> Self {
        Self::new(ty, true)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Unresolved types are always nullable
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Resolved { nullable, .. } => *nullable,
            Self::Unresolved => true,
        }
    }

    pub fn semantic(&self) -> Option<&SemanticType> {
        match self {
            Self::Resolved { ty, .. } => Some(ty),
            Self::Unresolved => None,
        }
    }

    /// Same type with a different nullability; no-op when unresolved
    pub fn with_nullable(self, nullable: bool) -> Self {
        match self {
            Self::Resolved { ty, .. } => Self::Resolved { ty, nullable },
            Self::Unresolved => Self::Unresolved,
        }
    }

    /// Non-null list of this element type; no-op when unresolved
    pub fn into_list(self) -> Self {
        match self {
            Self::Resolved { ty, .. } => Self::not_null(SemanticType::list(ty)),
            Self::Unresolved => Self::Unresolved,
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved { ty, nullable: false } => write!(f, "{ty}"),
            Self::Resolved { ty, nullable: true } => write!(f, "{ty}?"),
            Self::Unresolved => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!("INT64".parse::<SemanticType>().unwrap(), SemanticType::Int64);
        assert_eq!(
            "[]text".parse::<SemanticType>().unwrap(),
            SemanticType::list(SemanticType::String)
        );
        assert_eq!(
            "list<bool>".parse::<SemanticType>().unwrap(),
            SemanticType::list(SemanticType::Bool)
        );
        assert_eq!(
            "uuid".parse::<SemanticType>().unwrap_err().to_string(),
            "unknown type 'uuid'"
        );
    }

    #[test]
    fn test_unresolved_is_nullable() {
        assert!(TypeInfo::Unresolved.is_nullable());
        assert!(TypeInfo::Unresolved.semantic().is_none());
        assert_eq!(TypeInfo::Unresolved.with_nullable(false), TypeInfo::Unresolved);
        assert!(!TypeInfo::nullable(SemanticType::Int64).with_nullable(false).is_nullable());
    }

    #[test]
    fn test_into_list() {
        let list = TypeInfo::nullable(SemanticType::Int64).into_list();
        assert_eq!(list, TypeInfo::not_null(SemanticType::list(SemanticType::Int64)));
        assert_eq!(list.to_string(), "list<int64>");
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeInfo::nullable(SemanticType::String).to_string(), "string?");
        assert_eq!(TypeInfo::Unresolved.to_string(), "unknown");
    }
}
