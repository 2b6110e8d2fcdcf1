//! Row identity keys.

use crate::automap::read_mapping_column;
use crate::column_set::{prepend_prefix, strip_prefix, ResultSetWrapper};
use crate::handler::ResultSetHandler;
use resultmap_core::error::Result;
use resultmap_core::CacheKey;
use resultmap_mapping::ResultMap;

impl ResultSetHandler<'_> {
    /// Identity of the current row under `result_map`.
    ///
    /// Built from the id mappings' column values when the map has any
    /// mappings, otherwise from every column (map targets) or from the
    /// unmapped columns matching a property. Rows without any identifying
    /// value get [`CacheKey::NULL`].
    pub(crate) fn create_row_key(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        column_prefix: Option<&str>,
    ) -> Result<CacheKey> {
        let mut key = CacheKey::new();
        key.update(result_map.id())?;
        if result_map.id_mappings().is_empty() {
            if result_map.ty().is_map() {
                Self::row_key_for_map(rsw, &mut key)?;
            } else {
                self.row_key_for_unmapped_properties(rsw, result_map, &mut key, column_prefix)?;
            }
        } else {
            self.row_key_for_mapped_properties(rsw, result_map, &mut key, column_prefix)?;
        }
        if key.update_count() < 2 {
            return Ok(CacheKey::NULL);
        }
        Ok(key)
    }

    fn row_key_for_mapped_properties(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        key: &mut CacheKey,
        column_prefix: Option<&str>,
    ) -> Result<()> {
        let mapped_columns = rsw.mapped_column_names(result_map, column_prefix);
        let return_instance_for_empty_row = self.config.settings().return_instance_for_empty_row;
        for mapping in result_map.id_mappings() {
            if !mapping.is_simple() {
                continue;
            }
            let Some(column) = mapping.column_name().map(|c| prepend_prefix(c, column_prefix)) else {
                continue;
            };
            if !mapped_columns.contains(&column.to_uppercase()) {
                continue;
            }
            let value = read_mapping_column(rsw, &self.config, mapping, &column, None)?;
            if !value.is_null() || return_instance_for_empty_row {
                key.update(column)?;
                key.update(value)?;
            }
        }
        Ok(())
    }

    fn row_key_for_unmapped_properties(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        key: &mut CacheKey,
        column_prefix: Option<&str>,
    ) -> Result<()> {
        let Some(descriptor) = self.config.types().describe(result_map.ty()).cloned() else {
            return Ok(());
        };
        let camel_case = self.config.settings().map_underscore_to_camel_case;
        let unmapped = rsw.unmapped_column_names(result_map, column_prefix);
        for column in unmapped.iter() {
            let property = match column_prefix.filter(|p| !p.is_empty()) {
                Some(prefix) => match strip_prefix(column, prefix) {
                    Some(rest) => rest,
                    None => continue,
                },
                None => column.as_str(),
            };
            if descriptor.find_property(property, camel_case).is_none() {
                continue;
            }
            let value = rsw.value(column)?;
            if !value.is_null() {
                key.update(column.as_str())?;
                key.update(value.to_display_string())?;
            }
        }
        Ok(())
    }

    fn row_key_for_map(rsw: &ResultSetWrapper<'_>, key: &mut CacheKey) -> Result<()> {
        for column in rsw.column_names() {
            let value = rsw.value(column)?;
            if !value.is_null() {
                key.update(column.as_str())?;
                key.update(value.to_display_string())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::column_set::ResultSetWrapper;
    use crate::handler::ResultSetHandler;
    use resultmap_core::{CacheKey, MemoryCursor, TargetType, TypeDescriptor, Value};
    use resultmap_mapping::{Configuration, MappedStatement, ResultMap, ResultMapping};
    use std::sync::Arc;

    fn setup() -> (Arc<Configuration>, ResultSetHandler<'static>) {
        let mut config = Configuration::default();
        config.register_type(
            TypeDescriptor::bean("Tag")
                .property("label", TargetType::String)
                .property("weight", TargetType::I32),
        );
        let config = Arc::new(config);
        let handler = ResultSetHandler::new(Arc::clone(&config), Arc::new(MappedStatement::new("s")));
        (config, handler)
    }

    fn wrapper(config: &Arc<Configuration>, rows: Vec<Vec<Value>>) -> ResultSetWrapper<'static> {
        let cursor = MemoryCursor::new(["id", "label", "weight"], rows);
        ResultSetWrapper::new(Box::new(cursor), Arc::clone(config))
    }

    #[test]
    fn test_equal_ids_give_equal_keys() {
        let (config, mut handler) = setup();
        let map = ResultMap::builder("Tag", TargetType::named("Tag"))
            .mapping(ResultMapping::id("id", "id"))
            .build()
            .unwrap();
        let mut rsw = wrapper(
            &config,
            vec![
                vec![Value::BigInt(1), Value::Text("a".into()), Value::Null],
                vec![Value::BigInt(1), Value::Text("b".into()), Value::Null],
                vec![Value::BigInt(2), Value::Text("a".into()), Value::Null],
            ],
        );
        rsw.advance().unwrap();
        let first = handler.create_row_key(&mut rsw, &map, None).unwrap();
        rsw.advance().unwrap();
        let second = handler.create_row_key(&mut rsw, &map, None).unwrap();
        rsw.advance().unwrap();
        let third = handler.create_row_key(&mut rsw, &map, None).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, third);
        assert!(!first.is_null());
    }

    #[test]
    fn test_null_id_gives_null_key() {
        let (config, mut handler) = setup();
        let map = ResultMap::builder("Tag", TargetType::named("Tag"))
            .mapping(ResultMapping::id("id", "id"))
            .build()
            .unwrap();
        let mut rsw = wrapper(&config, vec![vec![Value::Null, Value::Text("a".into()), Value::Null]]);
        rsw.advance().unwrap();
        let key = handler.create_row_key(&mut rsw, &map, None).unwrap();
        assert!(key.is_null());
        assert_eq!(key, CacheKey::NULL);
    }

    #[test]
    fn test_unmapped_properties_form_the_key() {
        let (config, mut handler) = setup();
        let map = ResultMap::builder("Tag", TargetType::named("Tag")).build().unwrap();
        let mut rsw = wrapper(
            &config,
            vec![vec![Value::BigInt(9), Value::Text("a".into()), Value::Int(3)]],
        );
        rsw.advance().unwrap();
        let key = handler.create_row_key(&mut rsw, &map, None).unwrap();
        // id is not a property of Tag; label and weight are
        assert_eq!(key.update_count(), 5);
    }

    #[test]
    fn test_map_target_uses_all_columns() {
        let (config, mut handler) = setup();
        let map = ResultMap::builder("Row", TargetType::Map).build().unwrap();
        let mut rsw = wrapper(&config, vec![vec![Value::BigInt(9), Value::Null, Value::Int(3)]]);
        rsw.advance().unwrap();
        let key = handler.create_row_key(&mut rsw, &map, None).unwrap();
        assert_eq!(key.update_count(), 5);
    }
}
