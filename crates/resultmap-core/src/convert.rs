//! Value converters ("type handlers").
//!
//! A converter turns a raw cursor value into the representation a target
//! type expects. The registry answers two questions for the engine: is there a
//! converter for `(target type, column tag)`, and which one.

use crate::error::{Error, Result, TypeError};
use crate::row::FromValue;
use crate::types::{SqlType, TargetType};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts a raw column value for one target type.
pub trait ValueConverter: Send + Sync {
    /// Convert `value` read from `column`. NULL input must yield NULL.
    fn convert(&self, value: &Value, column: Option<&str>) -> Result<Value>;

    /// Can this converter read columns carrying `tag`?
    fn accepts(&self, tag: &SqlType) -> bool {
        let _ = tag;
        true
    }
}

/// Returns cursor values unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ValueConverter for PassThrough {
    fn convert(&self, value: &Value, _column: Option<&str>) -> Result<Value> {
        Ok(value.clone())
    }
}

/// Built-in converter for a scalar [`TargetType`].
#[derive(Debug, Clone)]
pub struct ScalarConverter {
    target: TargetType,
}

impl ScalarConverter {
    pub fn new(target: TargetType) -> Self {
        Self { target }
    }

    fn convert_inner(&self, value: &Value) -> Result<Value> {
        Ok(match &self.target {
            TargetType::Any => value.clone(),
            TargetType::Bool => Value::Bool(bool::from_value(value)?),
            TargetType::I8 => Value::TinyInt(i8::from_value(value)?),
            TargetType::I16 => Value::SmallInt(i16::from_value(value)?),
            TargetType::I32 => Value::Int(i32::from_value(value)?),
            TargetType::I64 => Value::BigInt(i64::from_value(value)?),
            TargetType::F32 => Value::Float(f32::from_value(value)?),
            TargetType::F64 => Value::Double(f64::from_value(value)?),
            TargetType::Decimal => match value {
                Value::Decimal(s) => Value::Decimal(s.clone()),
                v if v.as_f64().is_some() || v.as_str().is_some() => {
                    Value::Decimal(v.to_display_string())
                }
                other => return Err(mismatch("decimal", other)),
            },
            TargetType::String => Value::Text(String::from_value(value)?),
            TargetType::Bytes => Value::Bytes(Vec::<u8>::from_value(value)?),
            TargetType::Date => match value {
                Value::Date(d) => Value::Date(*d),
                other => Value::Date(i32::from_value(other)?),
            },
            TargetType::Time => match value {
                Value::Time(t) => Value::Time(*t),
                other => Value::Time(i64::from_value(other)?),
            },
            TargetType::Timestamp => match value {
                Value::Timestamp(t) => Value::Timestamp(*t),
                other => Value::Timestamp(i64::from_value(other)?),
            },
            TargetType::Uuid => Value::Uuid(<[u8; 16]>::from_value(value)?),
            TargetType::Json => Value::Json(serde_json::Value::from_value(value)?),
            TargetType::Map | TargetType::List | TargetType::Named(_) => {
                return Err(mismatch("scalar target", value));
            }
        })
    }
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

impl ValueConverter for ScalarConverter {
    fn convert(&self, value: &Value, column: Option<&str>) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        self.convert_inner(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = column.map(str::to_string);
                Error::Type(te)
            }
            e => e,
        })
    }

    fn accepts(&self, tag: &SqlType) -> bool {
        if *tag == SqlType::Other {
            return true;
        }
        match &self.target {
            TargetType::Any | TargetType::String => true,
            TargetType::Bool => matches!(
                tag,
                SqlType::Boolean | SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer
            ),
            TargetType::I8
            | TargetType::I16
            | TargetType::I32
            | TargetType::I64
            | TargetType::F32
            | TargetType::F64
            | TargetType::Decimal => tag.is_numeric() || *tag == SqlType::Boolean,
            TargetType::Bytes => matches!(tag, SqlType::Blob) || tag.is_text(),
            TargetType::Date | TargetType::Time | TargetType::Timestamp => {
                tag.is_temporal() || tag.is_numeric()
            }
            TargetType::Uuid => matches!(tag, SqlType::Uuid | SqlType::Blob),
            TargetType::Json => matches!(tag, SqlType::Json) || tag.is_text(),
            TargetType::Map | TargetType::List | TargetType::Named(_) => false,
        }
    }
}

/// Registry of converters keyed by target type and, optionally, column tag.
#[derive(Clone)]
pub struct ConverterRegistry {
    by_type: HashMap<TargetType, Arc<dyn ValueConverter>>,
    by_type_and_tag: HashMap<(TargetType, SqlType), Arc<dyn ValueConverter>>,
    named: HashMap<String, Arc<dyn ValueConverter>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("types", &self.by_type.keys().collect::<Vec<_>>())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConverterRegistry {
    /// A registry with no converters at all.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
            by_type_and_tag: HashMap::new(),
            named: HashMap::new(),
        }
    }

    /// A registry with a converter for every scalar target type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(TargetType::Any, Arc::new(PassThrough));
        for target in [
            TargetType::Bool,
            TargetType::I8,
            TargetType::I16,
            TargetType::I32,
            TargetType::I64,
            TargetType::F32,
            TargetType::F64,
            TargetType::Decimal,
            TargetType::String,
            TargetType::Bytes,
            TargetType::Date,
            TargetType::Time,
            TargetType::Timestamp,
            TargetType::Uuid,
            TargetType::Json,
        ] {
            registry.register(target.clone(), Arc::new(ScalarConverter::new(target)));
        }
        registry
    }

    /// Register the default converter for a target type.
    pub fn register(&mut self, target: TargetType, converter: Arc<dyn ValueConverter>) {
        self.by_type.insert(target, converter);
    }

    /// Register a converter used only for columns tagged `tag`.
    pub fn register_for_tag(
        &mut self,
        target: TargetType,
        tag: SqlType,
        converter: Arc<dyn ValueConverter>,
    ) {
        self.by_type_and_tag.insert((target, tag), converter);
    }

    /// Register a converter that mappings reference by name.
    pub fn register_named(&mut self, name: impl Into<String>, converter: Arc<dyn ValueConverter>) {
        self.named.insert(name.into(), converter);
    }

    /// Is there a converter for `target`, optionally restricted to columns tagged `tag`?
    pub fn has_converter(&self, target: &TargetType, tag: Option<&SqlType>) -> bool {
        self.converter_for(target, tag).is_some()
    }

    /// Resolve the converter for `target` and an optional column tag.
    ///
    /// A tag-specific registration wins over the type default; the type
    /// default must accept the tag.
    pub fn converter_for(
        &self,
        target: &TargetType,
        tag: Option<&SqlType>,
    ) -> Option<Arc<dyn ValueConverter>> {
        match tag {
            Some(tag) => self
                .by_type_and_tag
                .get(&(target.clone(), tag.clone()))
                .or_else(|| self.by_type.get(target).filter(|c| c.accepts(tag)))
                .cloned(),
            None => self.by_type.get(target).cloned(),
        }
    }

    /// Look up a converter registered by name.
    pub fn named(&self, name: &str) -> Option<Arc<dyn ValueConverter>> {
        self.named.get(name).cloned()
    }

    /// Convert `value` to `target`; values for targets without a converter pass through.
    pub fn convert(&self, value: &Value, target: &TargetType, column: Option<&str>) -> Result<Value> {
        match self.by_type.get(target) {
            Some(converter) => converter.convert(value, column),
            None => Ok(value.clone()),
        }
    }
}
