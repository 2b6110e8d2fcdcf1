//! Column set wrapper around one physical result set.

use resultmap_core::error::{DriverError, DriverErrorKind, Error, Result};
use resultmap_core::{
    ColumnInfo, CursorKind, PassThrough, ResultCursor, SqlType, TargetType, Value, ValueConverter,
};
use resultmap_mapping::{Configuration, ResultMap};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Prefix `column` with an (already upper-cased) column prefix.
pub(crate) fn prepend_prefix(column: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() && !column.is_empty() => format!("{}{}", prefix, column),
        _ => column.to_string(),
    }
}

/// Strip an upper-cased prefix from `column`, case-insensitively.
pub(crate) fn strip_prefix<'c>(column: &'c str, prefix: &str) -> Option<&'c str> {
    let head = column.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        column.get(prefix.len()..)
    } else {
        None
    }
}

/// One physical result set plus the per-mapping column caches built over it.
///
/// The mapped/unmapped column split is computed once per
/// `(result map id, column prefix)` and the converter once per
/// `(column, target type)`; both caches live exactly as long as the result
/// set. Dropping the wrapper closes the cursor.
pub struct ResultSetWrapper<'c> {
    cursor: Box<dyn ResultCursor + 'c>,
    config: Arc<Configuration>,
    columns: Arc<ColumnInfo>,
    converters: HashMap<(String, TargetType), Arc<dyn ValueConverter>>,
    mapped: HashMap<String, Arc<HashSet<String>>>,
    unmapped: HashMap<String, Arc<Vec<String>>>,
}

impl<'c> ResultSetWrapper<'c> {
    pub fn new(cursor: Box<dyn ResultCursor + 'c>, config: Arc<Configuration>) -> Self {
        let columns = Arc::clone(cursor.columns());
        Self {
            cursor,
            config,
            columns,
            converters: HashMap::new(),
            mapped: HashMap::new(),
            unmapped: HashMap::new(),
        }
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    /// Native column tags in declaration order.
    pub fn sql_types(&self) -> &[SqlType] {
        self.columns.types()
    }

    pub fn sql_type(&self, column: &str) -> SqlType {
        self.columns
            .type_of(column)
            .cloned()
            .unwrap_or(SqlType::Other)
    }

    pub fn kind(&self) -> CursorKind {
        self.cursor.kind()
    }

    pub fn advance(&mut self) -> Result<bool> {
        self.cursor.advance()
    }

    pub fn absolute(&mut self, row: usize) -> Result<bool> {
        self.cursor.absolute(row)
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    /// Close the cursor. Failures are logged, never raised.
    pub fn close(&mut self) {
        if self.cursor.is_closed() {
            return;
        }
        if let Err(e) = self.cursor.close() {
            tracing::warn!(error = %e, "failed to close result set");
        }
    }

    /// Raw value of `column` in the current row.
    pub fn value(&self, column: &str) -> Result<Value> {
        let row = self.cursor.current().ok_or_else(|| {
            Error::Driver(DriverError::new(
                DriverErrorKind::Fetch,
                "cursor is not positioned on a row",
            ))
        })?;
        row.get_by_name(column).cloned().ok_or_else(|| {
            Error::Driver(DriverError::new(
                DriverErrorKind::Other,
                format!("column '{}' not found in result set", column),
            ))
        })
    }

    /// Raw value of `column`, `None` when the row or column is missing.
    pub fn find_value(&self, column: &str) -> Option<Value> {
        self.cursor.current()?.get_by_name(column).cloned()
    }

    /// Converter reading `column` as `target`.
    ///
    /// A converter registered for the column's tag wins, then the type's
    /// default converter, then pass-through.
    pub fn converter(&mut self, target: &TargetType, column: &str) -> Arc<dyn ValueConverter> {
        let cache_key = (column.to_uppercase(), target.clone());
        if let Some(converter) = self.converters.get(&cache_key) {
            return Arc::clone(converter);
        }
        let tag = self.sql_type(column);
        let registry = self.config.converters();
        let converter = registry
            .converter_for(target, Some(&tag))
            .or_else(|| registry.converter_for(target, None))
            .unwrap_or_else(|| Arc::new(PassThrough));
        self.converters.insert(cache_key, Arc::clone(&converter));
        converter
    }

    /// Read `column` converted to `target`.
    pub fn read(&mut self, column: &str, target: &TargetType) -> Result<Value> {
        let converter = self.converter(target, column);
        let raw = self.value(column)?;
        converter.convert(&raw, Some(column))
    }

    /// Upper-cased names of the columns `result_map` claims under `prefix`.
    pub fn mapped_column_names(
        &mut self,
        result_map: &ResultMap,
        prefix: Option<&str>,
    ) -> Arc<HashSet<String>> {
        let key = map_key(result_map, prefix);
        if !self.mapped.contains_key(&key) {
            self.load_mapped_and_unmapped(result_map, prefix, &key);
        }
        self.mapped.get(&key).cloned().unwrap_or_default()
    }

    /// Original-case names of the columns `result_map` leaves unclaimed.
    pub fn unmapped_column_names(
        &mut self,
        result_map: &ResultMap,
        prefix: Option<&str>,
    ) -> Arc<Vec<String>> {
        let key = map_key(result_map, prefix);
        if !self.unmapped.contains_key(&key) {
            self.load_mapped_and_unmapped(result_map, prefix, &key);
        }
        self.unmapped.get(&key).cloned().unwrap_or_default()
    }

    fn load_mapped_and_unmapped(&mut self, result_map: &ResultMap, prefix: Option<&str>, key: &str) {
        let upper_prefix = prefix.map(str::to_uppercase);
        let claimed: HashSet<String> = result_map
            .mapped_columns()
            .iter()
            .map(|c| prepend_prefix(c, upper_prefix.as_deref()))
            .collect();
        let mut mapped = HashSet::new();
        let mut unmapped = Vec::new();
        for name in self.columns.names() {
            let upper = name.to_uppercase();
            if claimed.contains(&upper) {
                mapped.insert(upper);
            } else {
                unmapped.push(name.clone());
            }
        }
        self.mapped.insert(key.to_string(), Arc::new(mapped));
        self.unmapped.insert(key.to_string(), Arc::new(unmapped));
    }
}

impl Drop for ResultSetWrapper<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cache key of a result map under a column prefix.
pub(crate) fn map_key(result_map: &ResultMap, prefix: Option<&str>) -> String {
    format!("{}:{}", result_map.id(), prefix.unwrap_or(""))
}
