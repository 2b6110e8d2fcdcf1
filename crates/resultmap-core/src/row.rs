//! Result row representation.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::types::SqlType;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// This struct is wrapped in `Arc` so all rows from the same cursor share
/// the same column information, saving memory for large result sets.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column labels in declaration order
    names: Vec<String>,
    /// Native type tag per column
    types: Vec<SqlType>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
    /// Upper-cased name -> index, first occurrence wins
    upper_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create column info from names; every column is tagged [`SqlType::Other`].
    pub fn new(names: Vec<String>) -> Self {
        let types = vec![SqlType::Other; names.len()];
        Self::with_types(names, types)
    }

    /// Create column info from names and their native type tags.
    ///
    /// Missing tags are filled with [`SqlType::Other`].
    pub fn with_types(names: Vec<String>, mut types: Vec<SqlType>) -> Self {
        types.resize(names.len(), SqlType::Other);
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let mut upper_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            upper_to_index.entry(name.to_uppercase()).or_insert(i);
        }
        Self {
            names,
            types,
            name_to_index,
            upper_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    ///
    /// Exact matches win; otherwise the lookup is case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index
            .get(name)
            .or_else(|| self.upper_to_index.get(&name.to_uppercase()))
            .copied()
    }

    /// Native type tag of a column by index.
    pub fn type_at(&self, index: usize) -> Option<&SqlType> {
        self.types.get(index)
    }

    /// Native type tag of a column by (case-insensitive) name.
    pub fn type_of(&self, name: &str) -> Option<&SqlType> {
        self.index_of(name).and_then(|i| self.types.get(i))
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Get all column type tags.
    pub fn types(&self) -> &[SqlType] {
        &self.types
    }
}

/// A single row delivered by a cursor.
///
/// Rows provide both index-based and name-based access to column values.
/// Column metadata is shared via `Arc` for memory efficiency.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`
    /// to share the column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index. O(1) operation.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get a typed value by column name.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
                rust_type: None,
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Trait for converting from a `Value` to a typed value.
///
/// Conversions are lenient in the way drivers usually are: numeric targets
/// accept textual digits, and narrower integers accept wider ones when the
/// value fits.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn type_error(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

fn integer_of(expected: &'static str, value: &Value) -> Result<i64> {
    match value {
        Value::Text(s) | Value::Decimal(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| type_error(expected, value)),
        other => other.as_i64().ok_or_else(|| type_error(expected, value)),
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let v = integer_of($name, value)?;
                    <$ty>::try_from(v).map_err(|_| {
                        Error::Type(TypeError {
                            expected: $name,
                            actual: format!("value {} out of range", v),
                            column: None,
                            rust_type: None,
                        })
                    })
                }
            }
        )*
    };
}

impl_from_value_int!(i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64");

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(type_error("bool", value)),
            },
            other => other.as_bool().ok_or_else(|| type_error("bool", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => s.trim().parse().map_err(|_| type_error("f64", value)),
            other => other.as_f64().ok_or_else(|| type_error("f64", value)),
        }
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            other => f64::from_value(other)
                .map(|v| v as f32)
                .map_err(|_| type_error("f32", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(type_error("String", value)),
            other => Ok(other.to_display_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| type_error("Vec<u8>", value))
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| {
                Error::Type(TypeError {
                    expected: "valid JSON",
                    actual: format!("invalid JSON: {}", e),
                    column: None,
                    rust_type: None,
                })
            }),
            other => Err(type_error("JSON", other)),
        }
    }
}

impl FromValue for [u8; 16] {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::Bytes(v) if v.len() == 16 => {
                let mut arr = [0u8; 16];
                arr.copy_from_slice(v);
                Ok(arr)
            }
            other => Err(type_error("UUID", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let columns = Arc::new(ColumnInfo::with_types(
            vec!["pid".to_string(), "Name".to_string()],
            vec![SqlType::BigInt, SqlType::VarChar],
        ));
        Row::with_columns(columns, vec![Value::BigInt(1), Value::Text("P1".into())])
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let row = row();
        assert_eq!(row.get_by_name("PID"), Some(&Value::BigInt(1)));
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("P1".into())));
        assert!(row.get_by_name("missing").is_none());
        assert_eq!(row.column_info().type_of("NAME"), Some(&SqlType::VarChar));
    }

    #[test]
    fn test_missing_types_are_other() {
        let info = ColumnInfo::with_types(vec!["a".into(), "b".into()], vec![SqlType::Integer]);
        assert_eq!(info.type_at(1), Some(&SqlType::Other));
    }

    #[test]
    fn test_get_named_reports_column() {
        let err = row().get_named::<i64>("Name").unwrap_err();
        assert_eq!(err.column(), Some("Name"));
        assert_eq!(row().get_named::<i64>("pid").unwrap(), 1);
    }

    #[test]
    fn test_lenient_conversions() {
        assert_eq!(i32::from_value(&Value::Text(" 12 ".into())).unwrap(), 12);
        assert!(i8::from_value(&Value::BigInt(1000)).is_err());
        assert_eq!(String::from_value(&Value::Int(5)).unwrap(), "5");
        assert!(bool::from_value(&Value::Text("t".into())).unwrap());
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
    }
}
