//! Column type tags and materialization target types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native type tag reported by a cursor for each column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    // Integer types
    TinyInt,
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Fixed precision
    Decimal,

    // Boolean
    Boolean,

    // String types
    Char,
    VarChar,
    Text,

    // Binary types
    Blob,

    // Date/time types
    Date,
    Time,
    Timestamp,

    // UUID
    Uuid,

    // JSON
    Json,

    // Arrays
    Array,

    /// Type the driver could not describe
    Other,
}

impl SqlType {
    /// Get the SQL type name for this tag.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Decimal => "DECIMAL",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Char => "CHAR",
            SqlType::VarChar => "VARCHAR",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Uuid => "UUID",
            SqlType::Json => "JSON",
            SqlType::Array => "ARRAY",
            SqlType::Other => "OTHER",
        }
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt
                | SqlType::SmallInt
                | SqlType::Integer
                | SqlType::BigInt
                | SqlType::Real
                | SqlType::Double
                | SqlType::Decimal
        )
    }

    /// Check if this type is text-based.
    pub const fn is_text(&self) -> bool {
        matches!(self, SqlType::Char | SqlType::VarChar | SqlType::Text)
    }

    /// Check if this type is a date/time type.
    pub const fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Date | SqlType::Time | SqlType::Timestamp)
    }
}

/// The type a column value or a whole row is materialized into.
///
/// Scalars are produced by converters, `Map`, `List` and `Named` types are
/// produced by the object factory. `Named` types must be described in the
/// [`TypeRegistry`](crate::meta::TypeRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    /// Whatever the cursor delivers
    Any,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    /// String-keyed map object
    Map,
    /// Ordered collection object
    List,
    /// A registered bean type
    Named(String),
}

impl TargetType {
    pub fn named(name: impl Into<String>) -> Self {
        TargetType::Named(name.into())
    }

    /// Scalars are produced by a converter rather than by the object factory.
    pub const fn is_scalar(&self) -> bool {
        !matches!(
            self,
            TargetType::Map | TargetType::List | TargetType::Named(_)
        )
    }

    /// Primitive targets never receive a null through a setter.
    pub const fn is_primitive(&self) -> bool {
        matches!(
            self,
            TargetType::Bool
                | TargetType::I8
                | TargetType::I16
                | TargetType::I32
                | TargetType::I64
                | TargetType::F32
                | TargetType::F64
        )
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self, TargetType::List)
    }

    pub const fn is_map(&self) -> bool {
        matches!(self, TargetType::Map)
    }

    /// Display name used in error messages.
    pub fn name(&self) -> &str {
        match self {
            TargetType::Any => "any",
            TargetType::Bool => "bool",
            TargetType::I8 => "i8",
            TargetType::I16 => "i16",
            TargetType::I32 => "i32",
            TargetType::I64 => "i64",
            TargetType::F32 => "f32",
            TargetType::F64 => "f64",
            TargetType::Decimal => "decimal",
            TargetType::String => "string",
            TargetType::Bytes => "bytes",
            TargetType::Date => "date",
            TargetType::Time => "time",
            TargetType::Timestamp => "timestamp",
            TargetType::Uuid => "uuid",
            TargetType::Json => "json",
            TargetType::Map => "map",
            TargetType::List => "list",
            TargetType::Named(name) => name,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_type_classification() {
        assert!(TargetType::I64.is_scalar());
        assert!(TargetType::I64.is_primitive());
        assert!(!TargetType::String.is_primitive());
        assert!(!TargetType::named("Blog").is_scalar());
        assert!(TargetType::List.is_collection());
        assert_eq!(TargetType::named("Blog").to_string(), "Blog");
    }

    #[test]
    fn test_sql_type_families() {
        assert!(SqlType::BigInt.is_numeric());
        assert!(SqlType::VarChar.is_text());
        assert!(SqlType::Timestamp.is_temporal());
        assert_eq!(SqlType::Other.sql_name(), "OTHER");
    }
}
