//! Explicit property mappings and automapping of the remaining columns.

use crate::column_set::{map_key, prepend_prefix, strip_prefix, ResultSetWrapper};
use crate::deferred::MappingValue;
use crate::handler::ResultSetHandler;
use resultmap_core::error::{Error, Result};
use resultmap_core::{MetaObject, ObjectId, Slot, TargetType, Value, ValueConverter};
use resultmap_mapping::{Configuration, ResultMap, ResultMapping, UnknownColumnBehavior};
use std::sync::Arc;

/// A column copied onto a property because no mapping claims it.
#[derive(Clone)]
pub(crate) struct UnmappedColumnAutoMapping {
    column: String,
    property: String,
    converter: Arc<dyn ValueConverter>,
    primitive: bool,
}

/// Converter a mapping reads its column with.
///
/// A named converter wins, then the declared type (or `property_type`,
/// or any) resolved against the declared column tag, then against the
/// column's actual tag.
pub(crate) fn mapping_converter(
    rsw: &mut ResultSetWrapper<'_>,
    config: &Configuration,
    mapping: &ResultMapping,
    column: &str,
    property_type: Option<TargetType>,
) -> Result<Arc<dyn ValueConverter>> {
    if let Some(name) = mapping.converter_name() {
        return config.converters().named(name).ok_or_else(|| {
            Error::config(format!("no converter registered under the name '{}'", name))
        });
    }
    let ty = mapping
        .target_type()
        .cloned()
        .or(property_type)
        .unwrap_or(TargetType::Any);
    if let Some(converter) = mapping
        .declared_jdbc_type()
        .and_then(|tag| config.converters().converter_for(&ty, Some(tag)))
    {
        return Ok(converter);
    }
    Ok(rsw.converter(&ty, column))
}

/// Read `column` of the current row through the mapping's converter.
pub(crate) fn read_mapping_column(
    rsw: &mut ResultSetWrapper<'_>,
    config: &Configuration,
    mapping: &ResultMapping,
    column: &str,
    property_type: Option<TargetType>,
) -> Result<Value> {
    let converter = mapping_converter(rsw, config, mapping, column, property_type)?;
    let raw = rsw.value(column)?;
    converter.convert(&raw, Some(column))
}

impl ResultSetHandler<'_> {
    /// Resolve (once per result map and prefix) which unmapped columns land
    /// on which properties.
    fn create_automatic_mappings(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        object: ObjectId,
        column_prefix: Option<&str>,
    ) -> Result<Arc<Vec<UnmappedColumnAutoMapping>>> {
        let key = map_key(result_map, column_prefix);
        if let Some(cached) = self.auto_mappings_cache.get(&key) {
            return Ok(Arc::clone(cached));
        }

        let config = Arc::clone(&self.config);
        let settings = config.settings();
        let meta = MetaObject::for_object(&self.graph, config.types(), object)?;
        let mut unmapped: Vec<String> = rsw
            .unmapped_column_names(result_map, column_prefix)
            .as_ref()
            .clone();
        if let Some(consumed) = self.constructor_auto_mapping_columns.remove(&key) {
            unmapped.retain(|c| !consumed.contains(c));
        }

        let mut auto_mapping = Vec::new();
        for column in unmapped {
            let property_name = match column_prefix.filter(|p| !p.is_empty()) {
                Some(prefix) => match strip_prefix(&column, prefix) {
                    Some(rest) => rest.to_string(),
                    None => continue,
                },
                None => column.clone(),
            };
            let property = meta.find_property(&property_name, settings.map_underscore_to_camel_case);
            match property {
                Some(property) if meta.has_setter(&property) => {
                    if result_map.mapped_properties().contains(&property) {
                        continue;
                    }
                    let property_type = meta.setter_type(&property).unwrap_or(TargetType::Any);
                    let tag = rsw.sql_type(&column);
                    if config.converters().has_converter(&property_type, Some(&tag)) {
                        let converter = rsw.converter(&property_type, &column);
                        auto_mapping.push(UnmappedColumnAutoMapping {
                            primitive: property_type.is_primitive(),
                            column,
                            property,
                            converter,
                        });
                    } else {
                        self.unknown_column(&column, &property, Some(&property_type))?;
                    }
                }
                other => {
                    let property = other.unwrap_or(property_name);
                    self.unknown_column(&column, &property, None)?;
                }
            }
        }

        let auto_mapping = Arc::new(auto_mapping);
        self.auto_mappings_cache.insert(key, Arc::clone(&auto_mapping));
        Ok(auto_mapping)
    }

    fn unknown_column(&self, column: &str, property: &str, ty: Option<&TargetType>) -> Result<()> {
        let message = format!(
            "unknown column is detected on '{}' auto-mapping: column '{}', property '{}', type '{}'",
            self.statement.id(),
            column,
            property,
            ty.map_or("none", TargetType::name)
        );
        match self.config.settings().auto_mapping_unknown_column_behavior {
            UnknownColumnBehavior::None => Ok(()),
            UnknownColumnBehavior::Warning => {
                tracing::warn!("{}", message);
                Ok(())
            }
            UnknownColumnBehavior::Failing => Err(Error::config(message)),
        }
    }

    /// Copy unclaimed columns onto matching properties. Returns whether any
    /// non-null value was found.
    pub(crate) fn apply_automatic_mappings(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        object: ObjectId,
        column_prefix: Option<&str>,
    ) -> Result<bool> {
        let auto_mapping = self.create_automatic_mappings(rsw, result_map, object, column_prefix)?;
        if auto_mapping.is_empty() {
            return Ok(false);
        }
        let config = Arc::clone(&self.config);
        let call_setters_on_nulls = config.settings().call_setters_on_nulls;
        let meta = MetaObject::for_object(&self.graph, config.types(), object)?;
        let mut found_values = false;
        for mapping in auto_mapping.iter() {
            let raw = rsw.value(&mapping.column)?;
            let value = mapping.converter.convert(&raw, Some(&mapping.column))?;
            if !value.is_null() {
                found_values = true;
            }
            // Nulls are written but do not count as found
            if !value.is_null() || (call_setters_on_nulls && !mapping.primitive) {
                meta.set_value(
                    &mut self.graph,
                    config.object_factory(),
                    &mapping.property,
                    Slot::Value(value),
                )?;
            }
        }
        Ok(found_values)
    }

    /// Apply the explicit property mappings whose column is present.
    pub(crate) fn apply_property_mappings(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        object: ObjectId,
        column_prefix: Option<&str>,
    ) -> Result<bool> {
        let mapped_columns = rsw.mapped_column_names(result_map, column_prefix);
        let config = Arc::clone(&self.config);
        let call_setters_on_nulls = config.settings().call_setters_on_nulls;
        let meta = MetaObject::for_object(&self.graph, config.types(), object)?;
        let mut found_values = false;

        for mapping in result_map.property_mappings() {
            // A column on a join mapping only documents the link
            let column = if mapping.nested_result_map_id().is_some() {
                None
            } else {
                mapping.column_name().map(|c| prepend_prefix(c, column_prefix))
            };
            let present = column
                .as_deref()
                .is_some_and(|c| mapped_columns.contains(&c.to_uppercase()));
            if !(mapping.is_composite() || present || mapping.result_set_name().is_some()) {
                continue;
            }

            let value = self.property_mapping_value(rsw, &meta, object, mapping, column_prefix)?;
            let Some(property) = mapping.property() else {
                continue;
            };
            let value = match value {
                MappingValue::Deferred => {
                    found_values = true;
                    continue;
                }
                MappingValue::Loaded(slot) => slot,
            };
            if !value.is_null() {
                found_values = true;
            }
            let writes_null = call_setters_on_nulls
                && !meta.setter_type(property).is_some_and(|t| t.is_primitive());
            if !value.is_null() || writes_null {
                meta.set_value(&mut self.graph, config.object_factory(), property, value)?;
            }
        }
        Ok(found_values)
    }

    fn property_mapping_value(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        meta: &MetaObject<'_>,
        object: ObjectId,
        mapping: &ResultMapping,
        column_prefix: Option<&str>,
    ) -> Result<MappingValue> {
        if mapping.nested_query_id().is_some() {
            return self.nested_query_mapping_value(rsw, object, mapping, column_prefix);
        }
        if mapping.result_set_name().is_some() {
            self.add_pending_child_relation(rsw, object, mapping)?;
            return Ok(MappingValue::Deferred);
        }
        let column = mapping
            .column_name()
            .map(|c| prepend_prefix(c, column_prefix))
            .ok_or_else(|| {
                Error::config(format!(
                    "mapping for '{}' names no column",
                    mapping.property().unwrap_or("<constructor>")
                ))
            })?;
        let property_type = mapping.property().and_then(|p| meta.setter_type(p));
        let value = read_mapping_column(rsw, &self.config, mapping, &column, property_type)?;
        Ok(MappingValue::Loaded(Slot::Value(value)))
    }
}
