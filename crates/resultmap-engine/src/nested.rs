//! Result maps with joined nested result maps.
//!
//! Rows are grouped into object trees. Every object built from a row is
//! remembered under its combined row key, so later rows carrying the same
//! identity extend the existing object instead of creating a new one.
//! Objects currently being filled are tracked as ancestors, which lets a
//! nested mapping that points back at an enclosing result map link to the
//! enclosing object instead of recursing.

use crate::column_set::{prepend_prefix, strip_prefix, ResultSetWrapper};
use crate::context::{DeliveryState, RowBounds};
use crate::handler::{ResultSetHandler, RowTarget};
use resultmap_core::error::Result;
use resultmap_core::{CacheKey, MetaObject, ObjectId, Shape, Slot, TargetType};
use resultmap_mapping::{ResultMap, ResultMapping};
use std::sync::Arc;

/// Prefix of a nested mapping's columns below `parent_prefix`, upper-cased.
pub(crate) fn column_prefix(parent_prefix: Option<&str>, mapping: &ResultMapping) -> Option<String> {
    let mut prefix = String::new();
    if let Some(parent) = parent_prefix {
        prefix.push_str(parent);
    }
    if let Some(own) = mapping.prefix() {
        prefix.push_str(own);
    }
    (!prefix.is_empty()).then(|| prefix.to_uppercase())
}

impl ResultSetHandler<'_> {
    pub(crate) fn handle_row_values_for_nested_result_map(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        target: &mut RowTarget<'_>,
        row_bounds: RowBounds,
    ) -> Result<()> {
        let mut state = DeliveryState::default();
        let ordered = self.statement.is_result_ordered();
        Self::skip_rows(rsw, row_bounds)?;
        let mut row_value = self.previous_row_value.take();

        while state.should_process_more_rows(row_bounds) && !rsw.is_closed() && rsw.advance()? {
            let discriminated = self.resolve_discriminated_result_map(rsw, result_map, None)?;
            let row_key = self.create_row_key(rsw, &discriminated, None)?;
            let partial = self.memoized(&row_key);
            if ordered {
                // Ordered rows: a new identity means the previous object is complete
                if partial.is_none() {
                    if let Some(previous) = row_value.take() {
                        self.nested_result_objects.clear();
                        self.store_object(rsw, target, &mut state, &previous)?;
                    }
                }
                row_value = Some(self.get_nested_row_value(rsw, &discriminated, &row_key, None, partial)?);
            } else {
                let is_new = partial.is_none();
                let value = self.get_nested_row_value(rsw, &discriminated, &row_key, None, partial)?;
                if is_new {
                    self.store_object(rsw, target, &mut state, &value)?;
                }
                row_value = Some(value);
            }
        }

        match row_value {
            Some(last) if ordered && state.should_process_more_rows(row_bounds) => {
                self.store_object(rsw, target, &mut state, &last)?;
                self.previous_row_value = None;
            }
            other => self.previous_row_value = other,
        }
        Ok(())
    }

    fn memoized(&self, key: &CacheKey) -> Option<Slot> {
        if key.is_null() {
            return None;
        }
        self.nested_result_objects.get(key).cloned()
    }

    /// Build or extend the object of the current row under `combined_key`.
    pub(crate) fn get_nested_row_value(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        combined_key: &CacheKey,
        column_prefix: Option<&str>,
        partial: Option<Slot>,
    ) -> Result<Slot> {
        let map_id = result_map.id().to_string();

        if let Some(existing) = partial {
            if let Some(id) = existing.as_object() {
                self.ancestor_objects.insert(map_id.clone(), existing.clone());
                let outcome = self.apply_nested_result_mappings(rsw, result_map, id, column_prefix, combined_key, false);
                self.ancestor_objects.remove(&map_id);
                outcome?;
            }
            return Ok(existing);
        }

        let mut row_value = self.create_result_object(rsw, result_map, column_prefix)?;
        if let Some(id) = row_value.as_object() {
            if !self.has_converter_for_result_object(rsw, result_map.ty()) {
                let mut found_values = self.use_constructor_mappings;
                if self.config.should_auto_map(result_map, true) {
                    found_values = self.apply_automatic_mappings(rsw, result_map, id, column_prefix)? || found_values;
                }
                found_values = self.apply_property_mappings(rsw, result_map, id, column_prefix)? || found_values;

                self.ancestor_objects.insert(map_id.clone(), row_value.clone());
                let outcome = self.apply_nested_result_mappings(rsw, result_map, id, column_prefix, combined_key, true);
                self.ancestor_objects.remove(&map_id);
                found_values = outcome? || found_values;

                if !found_values && !self.config.settings().return_instance_for_empty_row {
                    row_value = Slot::null();
                }
            }
        }
        if !combined_key.is_null() && !row_value.is_null() {
            self.nested_result_objects
                .insert(combined_key.clone(), row_value.clone());
        }
        Ok(row_value)
    }

    /// Fill the join mappings of `object` from the current row.
    fn apply_nested_result_mappings(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        object: ObjectId,
        parent_prefix: Option<&str>,
        parent_row_key: &CacheKey,
        new_object: bool,
    ) -> Result<bool> {
        let mut found_values = false;
        for mapping in result_map.property_mappings() {
            let Some(nested_id) = mapping.nested_result_map_id() else {
                continue;
            };
            if mapping.result_set_name().is_some() {
                continue;
            }
            let prefix = column_prefix(parent_prefix, mapping);
            let nested_map = self.config.result_map(nested_id)?;
            let nested_map = self.resolve_discriminated_result_map(rsw, &nested_map, prefix.as_deref())?;

            // Only unprefixed mappings can point back at an enclosing object
            if mapping.prefix().is_none() {
                if let Some(ancestor) = self.ancestor_objects.get(nested_id).cloned() {
                    if new_object {
                        self.link_objects(object, mapping, ancestor)?;
                    }
                    continue;
                }
            }

            let row_key = self.create_row_key(rsw, &nested_map, prefix.as_deref())?;
            let combined_key = CacheKey::combine(&row_key, parent_row_key)?;
            let known = self.memoized(&combined_key);
            let known_value = known.is_some();
            self.instantiate_collection_property_if_appropriate(object, mapping)?;
            if self.any_not_null_column_has_value(rsw, mapping, prefix.as_deref()) {
                let row_value =
                    self.get_nested_row_value(rsw, &nested_map, &combined_key, prefix.as_deref(), known)?;
                if !row_value.is_null() && !known_value {
                    self.link_objects(object, mapping, row_value)?;
                    found_values = true;
                }
            }
        }
        Ok(found_values)
    }

    /// Does the row carry data for the nested object at all?
    fn any_not_null_column_has_value(
        &self,
        rsw: &ResultSetWrapper<'_>,
        mapping: &ResultMapping,
        column_prefix: Option<&str>,
    ) -> bool {
        let not_null_columns = mapping.not_null_column_set();
        if !not_null_columns.is_empty() {
            return not_null_columns.iter().any(|column| {
                rsw.find_value(&prepend_prefix(column, column_prefix))
                    .is_some_and(|v| !v.is_null())
            });
        }
        match column_prefix {
            Some(prefix) => rsw
                .column_names()
                .iter()
                .any(|name| {
                    strip_prefix(name, prefix).is_some()
                        && rsw.find_value(name).is_some_and(|v| !v.is_null())
                }),
            None => true,
        }
    }

    /// Store `value` in the mapping's property, appending when the property
    /// is a collection.
    pub(crate) fn link_objects(&mut self, object: ObjectId, mapping: &ResultMapping, value: Slot) -> Result<()> {
        let config = Arc::clone(&self.config);
        match self.instantiate_collection_property_if_appropriate(object, mapping)? {
            Some(collection) => {
                let meta = MetaObject::for_object(&self.graph, config.types(), collection)?;
                meta.add(&mut self.graph, value)
            }
            None => {
                let Some(property) = mapping.property() else {
                    return Ok(());
                };
                let meta = MetaObject::for_object(&self.graph, config.types(), object)?;
                meta.set_value(&mut self.graph, config.object_factory(), property, value)
            }
        }
    }

    /// The collection behind the mapping's property, created when the
    /// property is empty and collection typed.
    pub(crate) fn instantiate_collection_property_if_appropriate(
        &mut self,
        object: ObjectId,
        mapping: &ResultMapping,
    ) -> Result<Option<ObjectId>> {
        let Some(property) = mapping.property() else {
            return Ok(None);
        };
        let config = Arc::clone(&self.config);
        let meta = MetaObject::for_object(&self.graph, config.types(), object)?;
        match meta.get_value(&self.graph, property) {
            Some(Slot::Object(existing)) => {
                let is_collection = self.graph.get(existing).shape() == Shape::Collection;
                Ok(is_collection.then_some(existing))
            }
            Some(Slot::Value(v)) if !v.is_null() => Ok(None),
            Some(Slot::Pending(_)) => Ok(None),
            _ => {
                let ty = mapping
                    .target_type()
                    .cloned()
                    .or_else(|| meta.setter_type(property))
                    .unwrap_or(TargetType::Any);
                let factory = config.object_factory();
                if !factory.is_collection(&ty) {
                    return Ok(None);
                }
                let collection = factory.create(&mut self.graph, config.types(), &ty)?;
                meta.set_value(&mut self.graph, factory, property, Slot::Object(collection))?;
                Ok(Some(collection))
            }
        }
    }
}
