//! Nested sub-queries, lazy loads and auxiliary result sets.

use crate::column_set::{prepend_prefix, ResultSetWrapper};
use crate::handler::ResultSetHandler;
use resultmap_core::error::{Error, Result};
use resultmap_core::{
    CacheKey, MetaObject, ObjectGraph, ObjectId, PendingLoad, QueryParameter, Slot, TargetType,
};
use resultmap_mapping::{Configuration, ResultMapping};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of reading one property mapping.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MappingValue {
    /// The property is filled later (lazy load, cached sub-query or
    /// auxiliary result set); it still counts as found.
    Deferred,
    Loaded(Slot),
}

/// A parent waiting for children from an auxiliary result set.
#[derive(Debug, Clone)]
pub(crate) struct PendingRelation {
    pub(crate) object: ObjectId,
    pub(crate) mapping: ResultMapping,
}

/// Shape the rows of a sub-query into the value stored in a property.
///
/// Collection targets receive every row; any other target receives the
/// single row, or null when there is none.
pub(crate) fn extract_result(
    graph: &mut ObjectGraph,
    config: &Configuration,
    rows: Vec<Slot>,
    target: &TargetType,
) -> Result<Slot> {
    let factory = config.object_factory();
    if factory.is_collection(target) {
        let list = factory.create(graph, config.types(), target)?;
        let meta = MetaObject::for_object(graph, config.types(), list)?;
        for row in rows {
            meta.add(graph, row)?;
        }
        return Ok(Slot::Object(list));
    }
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (None, _) => Ok(Slot::null()),
        (Some(row), None) => Ok(row),
        (Some(_), Some(_)) => Err(Error::InvalidOperation(
            "statement returned more than one row, where no more than one was expected".to_string(),
        )),
    }
}

/// Split a comma separated column list.
fn split_columns(columns: &str) -> impl Iterator<Item = &str> {
    columns.split(',').map(str::trim)
}

impl ResultSetHandler<'_> {
    /// Value of a property filled by a nested sub-query.
    pub(crate) fn nested_query_mapping_value(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        object: ObjectId,
        mapping: &ResultMapping,
        column_prefix: Option<&str>,
    ) -> Result<MappingValue> {
        let query_id = mapping
            .nested_query_id()
            .ok_or_else(|| Error::config("mapping has no nested query"))?;
        let nested_query = self.config.statement(query_id)?;
        let Some(parameter) = self.prepare_parameter_for_nested_query(
            rsw,
            mapping,
            nested_query.declared_parameter_type(),
            column_prefix,
        )?
        else {
            return Ok(MappingValue::Loaded(Slot::null()));
        };

        let config = Arc::clone(&self.config);
        let meta = MetaObject::for_object(&self.graph, config.types(), object)?;
        let target = mapping
            .target_type()
            .cloned()
            .or_else(|| mapping.property().and_then(|p| meta.setter_type(p)))
            .unwrap_or(TargetType::Any);

        let executor = self.executor.as_deref_mut().ok_or_else(|| {
            Error::config(format!(
                "nested query '{}' needs an executor but none is attached",
                query_id
            ))
        })?;
        let key = executor.create_cache_key(&nested_query, &parameter)?;

        if let Some(property) = mapping.property() {
            if executor.is_cached(&nested_query, &key) {
                tracing::trace!(query = query_id, property, "sub-query is cached, deferring");
                executor.defer_load(&mut self.graph, &nested_query, object, property, key, target)?;
                return Ok(MappingValue::Deferred);
            }
            if config.is_lazy(mapping) {
                tracing::trace!(query = query_id, property, "registering lazy load");
                let pending = PendingLoad {
                    query_id: query_id.to_string(),
                    parameter,
                    target,
                    key,
                };
                meta.set_value(
                    &mut self.graph,
                    config.object_factory(),
                    property,
                    Slot::Pending(pending),
                )?;
                return Ok(MappingValue::Deferred);
            }
        }

        let rows = executor.query(&nested_query, &parameter, &key, &mut self.graph)?;
        let value = extract_result(&mut self.graph, &config, rows, &target)?;
        Ok(MappingValue::Loaded(value))
    }

    /// Constructor argument filled by a nested sub-query; always eager.
    pub(crate) fn nested_query_constructor_value(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        mapping: &ResultMapping,
        target: &TargetType,
        column_prefix: Option<&str>,
    ) -> Result<Slot> {
        let query_id = mapping
            .nested_query_id()
            .ok_or_else(|| Error::config("mapping has no nested query"))?;
        let nested_query = self.config.statement(query_id)?;
        let Some(parameter) = self.prepare_parameter_for_nested_query(
            rsw,
            mapping,
            nested_query.declared_parameter_type(),
            column_prefix,
        )?
        else {
            return Ok(Slot::null());
        };
        let executor = self.executor.as_deref_mut().ok_or_else(|| {
            Error::config(format!(
                "nested query '{}' needs an executor but none is attached",
                query_id
            ))
        })?;
        let key = executor.create_cache_key(&nested_query, &parameter)?;
        let rows = executor.query(&nested_query, &parameter, &key, &mut self.graph)?;
        let config = Arc::clone(&self.config);
        extract_result(&mut self.graph, &config, rows, target)
    }

    /// Parameter for a sub-query, or `None` when the key columns are null.
    fn prepare_parameter_for_nested_query(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        mapping: &ResultMapping,
        parameter_type: Option<&TargetType>,
        column_prefix: Option<&str>,
    ) -> Result<Option<QueryParameter>> {
        if mapping.is_composite() {
            let mut values = BTreeMap::new();
            for inner in mapping.composites() {
                let (Some(name), Some(column)) = (inner.property(), inner.column_name()) else {
                    continue;
                };
                let column = prepend_prefix(column, column_prefix);
                let ty = inner.target_type().cloned().unwrap_or(TargetType::Any);
                let value = rsw.read(&column, &ty)?;
                // A null key part never reaches the sub-query
                if !value.is_null() {
                    values.insert(name.to_string(), value);
                }
            }
            return Ok((!values.is_empty()).then_some(QueryParameter::Composite(values)));
        }
        let column = mapping
            .column_name()
            .map(|c| prepend_prefix(c, column_prefix))
            .ok_or_else(|| Error::config("nested query mapping names no column"))?;
        let ty = parameter_type.cloned().unwrap_or(TargetType::Any);
        let value = rsw.read(&column, &ty)?;
        Ok((!value.is_null()).then_some(QueryParameter::Value(value)))
    }

    /// Register `object` as waiting for rows of the mapping's result set.
    pub(crate) fn add_pending_child_relation(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        object: ObjectId,
        mapping: &ResultMapping,
    ) -> Result<()> {
        let result_set = mapping
            .result_set_name()
            .ok_or_else(|| Error::config("mapping reads no result set"))?;
        let key = create_key_for_multiple_results(
            rsw,
            mapping,
            mapping.column_name(),
            mapping.column_name(),
        )?;
        self.pending_relations
            .entry(key)
            .or_default()
            .push(PendingRelation {
                object,
                mapping: mapping.clone(),
            });
        match self.next_result_maps.get(result_set) {
            None => {
                self.next_result_maps
                    .insert(result_set.to_string(), mapping.clone());
            }
            Some(previous) if previous != mapping => {
                return Err(Error::config(format!(
                    "two different properties are mapped to the same result set '{}'",
                    result_set
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Attach a row of an auxiliary result set to every parent waiting for it.
    pub(crate) fn link_to_parents(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        parent_mapping: &ResultMapping,
        row_value: &Slot,
    ) -> Result<()> {
        if row_value.is_null() {
            return Ok(());
        }
        let key = create_key_for_multiple_results(
            rsw,
            parent_mapping,
            parent_mapping.column_name(),
            parent_mapping.foreign_column_name(),
        )?;
        let Some(parents) = self.pending_relations.get(&key).cloned() else {
            return Ok(());
        };
        for parent in parents {
            self.link_objects(parent.object, &parent.mapping, row_value.clone())?;
        }
        Ok(())
    }
}

/// Key matching parent and child rows across result sets.
///
/// `names` are the parent's linking columns and label the parts; the values
/// come from `columns` of the current row.
fn create_key_for_multiple_results(
    rsw: &ResultSetWrapper<'_>,
    mapping: &ResultMapping,
    names: Option<&str>,
    columns: Option<&str>,
) -> Result<CacheKey> {
    let mut key = CacheKey::new();
    key.update(mapping.identity())?;
    if let (Some(names), Some(columns)) = (names, columns) {
        for (name, column) in split_columns(names).zip(split_columns(columns)) {
            let value = rsw.value(column)?;
            if !value.is_null() {
                key.update(name)?;
                key.update(value.to_display_string())?;
            }
        }
    }
    Ok(key)
}
