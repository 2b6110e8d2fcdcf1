//! Single property mappings.

use resultmap_core::{SqlType, TargetType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role flags of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultFlag {
    /// Part of the row identity
    Id,
    /// Constructor argument rather than a property write
    Constructor,
}

/// Whether a nested sub-query runs immediately or on first access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchType {
    Lazy,
    Eager,
}

/// How one property (or constructor argument) is filled from a row.
///
/// A mapping is one of: a simple column, a composite of several columns, a
/// nested result map fed from the same row (join), a nested sub-query, or a
/// link to an auxiliary result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMapping {
    property: Option<String>,
    column: Option<String>,
    target_type: Option<TargetType>,
    jdbc_type: Option<SqlType>,
    converter: Option<String>,
    nested_result_map_id: Option<String>,
    nested_query_id: Option<String>,
    not_null_columns: BTreeSet<String>,
    column_prefix: Option<String>,
    flags: Vec<ResultFlag>,
    composites: Vec<ResultMapping>,
    result_set: Option<String>,
    foreign_column: Option<String>,
    fetch_type: Option<FetchType>,
}

impl ResultMapping {
    fn empty() -> Self {
        Self {
            property: None,
            column: None,
            target_type: None,
            jdbc_type: None,
            converter: None,
            nested_result_map_id: None,
            nested_query_id: None,
            not_null_columns: BTreeSet::new(),
            column_prefix: None,
            flags: Vec::new(),
            composites: Vec::new(),
            result_set: None,
            foreign_column: None,
            fetch_type: None,
        }
    }

    /// `property` is filled from `column`.
    pub fn column(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            column: Some(column.into()),
            ..Self::empty()
        }
    }

    /// Identity column: `property` is filled from `column` and the column
    /// takes part in the row key.
    pub fn id(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self::column(property, column).as_id()
    }

    /// Positional constructor argument read from `column`.
    pub fn arg(column: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            flags: vec![ResultFlag::Constructor],
            ..Self::empty()
        }
    }

    /// Constructor argument bound to the parameter called `name`.
    pub fn named_arg(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: Some(name.into()),
            ..Self::arg(column)
        }
    }

    /// Single object built by the nested result map `result_map_id` from the same row.
    pub fn association(property: impl Into<String>, result_map_id: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            nested_result_map_id: Some(result_map_id.into()),
            ..Self::empty()
        }
    }

    /// Collection of objects built by the nested result map `result_map_id`.
    pub fn collection(property: impl Into<String>, result_map_id: impl Into<String>) -> Self {
        Self {
            target_type: Some(TargetType::List),
            ..Self::association(property, result_map_id)
        }
    }

    /// `property` is loaded by running `query_id` with the value of `column`.
    pub fn nested_query(
        property: impl Into<String>,
        column: impl Into<String>,
        query_id: impl Into<String>,
    ) -> Self {
        Self {
            property: Some(property.into()),
            column: Some(column.into()),
            nested_query_id: Some(query_id.into()),
            ..Self::empty()
        }
    }

    /// `property` is loaded by running `query_id` with several columns,
    /// given as `(parameter name, column)` pairs.
    pub fn composite_query<P, C>(
        property: impl Into<String>,
        query_id: impl Into<String>,
        columns: impl IntoIterator<Item = (P, C)>,
    ) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            property: Some(property.into()),
            nested_query_id: Some(query_id.into()),
            composites: columns
                .into_iter()
                .map(|(p, c)| ResultMapping::column(p, c))
                .collect(),
            ..Self::empty()
        }
    }

    pub fn as_id(mut self) -> Self {
        if !self.flags.contains(&ResultFlag::Id) {
            self.flags.push(ResultFlag::Id);
        }
        self
    }

    pub fn as_constructor(mut self) -> Self {
        if !self.flags.contains(&ResultFlag::Constructor) {
            self.flags.push(ResultFlag::Constructor);
        }
        self
    }

    /// Declared type of the property or argument.
    pub fn with_type(mut self, ty: TargetType) -> Self {
        self.target_type = Some(ty);
        self
    }

    pub fn jdbc_type(mut self, tag: SqlType) -> Self {
        self.jdbc_type = Some(tag);
        self
    }

    /// Use the converter registered under `name`.
    pub fn converter(mut self, name: impl Into<String>) -> Self {
        self.converter = Some(name.into());
        self
    }

    /// Set (or replace) the linking column of a nested mapping.
    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn column_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.column_prefix = Some(prefix.into());
        self
    }

    /// Only build the nested object when one of these columns is non-null.
    pub fn not_null_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.not_null_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Children come from the auxiliary result set `name`.
    pub fn result_set(mut self, name: impl Into<String>) -> Self {
        self.result_set = Some(name.into());
        self
    }

    /// Column of the auxiliary result set matched against `column`.
    pub fn foreign_column(mut self, column: impl Into<String>) -> Self {
        self.foreign_column = Some(column.into());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.fetch_type = Some(FetchType::Lazy);
        self
    }

    pub fn eager(mut self) -> Self {
        self.fetch_type = Some(FetchType::Eager);
        self
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn target_type(&self) -> Option<&TargetType> {
        self.target_type.as_ref()
    }

    pub fn declared_jdbc_type(&self) -> Option<&SqlType> {
        self.jdbc_type.as_ref()
    }

    pub fn converter_name(&self) -> Option<&str> {
        self.converter.as_deref()
    }

    pub fn nested_result_map_id(&self) -> Option<&str> {
        self.nested_result_map_id.as_deref()
    }

    pub fn nested_query_id(&self) -> Option<&str> {
        self.nested_query_id.as_deref()
    }

    pub fn not_null_column_set(&self) -> &BTreeSet<String> {
        &self.not_null_columns
    }

    pub fn prefix(&self) -> Option<&str> {
        self.column_prefix.as_deref()
    }

    pub fn flags(&self) -> &[ResultFlag] {
        &self.flags
    }

    pub fn composites(&self) -> &[ResultMapping] {
        &self.composites
    }

    pub fn result_set_name(&self) -> Option<&str> {
        self.result_set.as_deref()
    }

    pub fn foreign_column_name(&self) -> Option<&str> {
        self.foreign_column.as_deref()
    }

    pub fn fetch_type(&self) -> Option<FetchType> {
        self.fetch_type
    }

    pub fn is_id(&self) -> bool {
        self.flags.contains(&ResultFlag::Id)
    }

    pub fn is_constructor(&self) -> bool {
        self.flags.contains(&ResultFlag::Constructor)
    }

    pub fn is_composite(&self) -> bool {
        !self.composites.is_empty()
    }

    /// A simple mapping reads one column and nothing else.
    pub fn is_simple(&self) -> bool {
        self.nested_result_map_id.is_none()
            && self.nested_query_id.is_none()
            && self.result_set.is_none()
    }

    /// Stable text used when a mapping takes part in a linking key.
    pub fn identity(&self) -> String {
        format!(
            "{}|{}|{}",
            self.property.as_deref().unwrap_or(""),
            self.column.as_deref().unwrap_or(""),
            self.result_set.as_deref().unwrap_or("")
        )
    }

    /// Does the mapping say enough to be applied?
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.property.is_none() && !self.is_constructor() {
            return Err("mapping has neither a property nor a constructor flag".to_string());
        }
        if self.column.is_none()
            && self.composites.is_empty()
            && self.nested_result_map_id.is_none()
            && self.nested_query_id.is_none()
            && self.result_set.is_none()
        {
            return Err(format!(
                "mapping for '{}' names no column, nested map, nested query or result set",
                self.property.as_deref().unwrap_or("<constructor>")
            ));
        }
        if self.nested_query_id.is_some() && self.nested_result_map_id.is_some() {
            return Err(format!(
                "mapping for '{}' cannot use both a nested query and a nested result map",
                self.property.as_deref().unwrap_or("<constructor>")
            ));
        }
        if self.result_set.is_some() && self.nested_result_map_id.is_none() {
            return Err(format!(
                "mapping for '{}' reads result set '{}' but names no result map for it",
                self.property.as_deref().unwrap_or("<constructor>"),
                self.result_set.as_deref().unwrap_or("")
            ));
        }
        Ok(())
    }
}
