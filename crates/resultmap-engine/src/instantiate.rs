//! Creating the object of a row.
//!
//! In order of preference: a scalar read through a converter, an explicit
//! constructor mapping, the object factory's default construction, and
//! finally constructor automapping from the row's columns.

use crate::automap::read_mapping_column;
use crate::column_set::{map_key, prepend_prefix, strip_prefix, ResultSetWrapper};
use crate::handler::ResultSetHandler;
use crate::nested::column_prefix as nested_prefix;
use resultmap_core::error::{Error, Result};
use resultmap_core::{
    ConstructorDescriptor, ParamDescriptor, Slot, TargetType, TypeDescriptor, TypeRegistry,
};
use resultmap_mapping::{ResultMap, ResultMapping};
use std::sync::Arc;

/// A created row object and whether constructor arguments built it.
struct Created {
    object: Slot,
    with_args: bool,
}

impl Created {
    fn plain(object: Slot) -> Self {
        Self {
            object,
            with_args: false,
        }
    }
}

fn param_matches(param: &ParamDescriptor, name: &str) -> bool {
    param.name == name || param.alias.as_deref() == Some(name)
}

/// Order and types in which explicit constructor mappings are passed.
///
/// Named arguments are matched to a constructor by parameter name (or
/// alias) and reordered to its parameter order; positional arguments keep
/// their order and take undeclared types from the first constructor
/// compatible with the declared ones.
fn constructor_plan(
    types: &TypeRegistry,
    ty: &TargetType,
    mappings: &[ResultMapping],
) -> Result<Vec<(usize, TargetType)>> {
    let descriptor = types.describe(ty);
    let named = mappings.iter().all(|m| m.property().is_some());

    if let (true, Some(descriptor)) = (named, descriptor) {
        let names: Vec<&str> = mappings.iter().filter_map(ResultMapping::property).collect();
        let constructor = descriptor
            .constructors()
            .iter()
            .find(|c| {
                c.params.len() == names.len()
                    && c.params
                        .iter()
                        .all(|p| names.iter().any(|n| param_matches(p, n)))
            })
            .ok_or_else(|| {
                Error::instantiation(
                    ty.name(),
                    format!("no constructor with parameters named [{}]", names.join(", ")),
                )
            })?;
        return constructor
            .params
            .iter()
            .map(|p| {
                let index = names.iter().position(|n| param_matches(p, n))?;
                let arg_ty = mappings[index]
                    .target_type()
                    .cloned()
                    .unwrap_or_else(|| p.ty.clone());
                Some((index, arg_ty))
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::instantiation(ty.name(), "constructor parameter names are ambiguous"));
    }

    let compatible = descriptor.and_then(|d| {
        d.constructors().iter().find(|c| {
            c.params.len() == mappings.len()
                && c.params
                    .iter()
                    .zip(mappings)
                    .all(|(p, m)| m.target_type().is_none_or(|t| *t == p.ty))
        })
    });
    Ok(mappings
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let arg_ty = m
                .target_type()
                .cloned()
                .or_else(|| compatible.map(|c| c.params[i].ty.clone()))
                .unwrap_or(TargetType::Any);
            (i, arg_ty)
        })
        .collect())
}

impl ResultSetHandler<'_> {
    /// Create the (still empty) object of the current row.
    ///
    /// Sets `use_constructor_mappings` when the object was built from
    /// constructor arguments, so the caller counts it as found.
    pub(crate) fn create_result_object(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        column_prefix: Option<&str>,
    ) -> Result<Slot> {
        self.use_constructor_mappings = false;
        let created = self.create_result_object_inner(rsw, result_map, column_prefix)?;
        self.use_constructor_mappings = !created.object.is_null() && created.with_args;
        Ok(created.object)
    }

    fn create_result_object_inner(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        column_prefix: Option<&str>,
    ) -> Result<Created> {
        let ty = result_map.ty();
        if self.has_converter_for_result_object(rsw, ty) {
            return self
                .create_primitive_result_object(rsw, result_map, column_prefix)
                .map(Created::plain);
        }
        if !result_map.constructor_mappings().is_empty() {
            return self.create_parameterized_result_object(rsw, result_map, column_prefix);
        }

        let config = Arc::clone(&self.config);
        let descriptor = config.types().describe(ty).cloned();
        let default_constructible = match ty {
            TargetType::Map | TargetType::List => true,
            _ => descriptor
                .as_ref()
                .is_some_and(|d| d.is_interface() || d.has_default_constructor()),
        };
        if default_constructible {
            let id = config
                .object_factory()
                .create(&mut self.graph, config.types(), ty)?;
            return Ok(Created::plain(Slot::Object(id)));
        }
        match descriptor {
            Some(descriptor) if config.should_auto_map(result_map, false) => {
                self.create_by_constructor_signature(rsw, result_map, &descriptor, column_prefix)
            }
            Some(_) => Err(Error::instantiation(
                ty.name(),
                "do not know how to create an instance",
            )),
            None => Err(Error::instantiation(ty.name(), "type is not registered")),
        }
    }

    /// Is the row's object a scalar produced directly by a converter?
    pub(crate) fn has_converter_for_result_object(
        &self,
        rsw: &ResultSetWrapper<'_>,
        ty: &TargetType,
    ) -> bool {
        let registry = self.config.converters();
        match rsw.column_names() {
            [only] => registry.has_converter(ty, Some(&rsw.sql_type(only))),
            _ => registry.has_converter(ty, None),
        }
    }

    fn create_primitive_result_object(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        column_prefix: Option<&str>,
    ) -> Result<Slot> {
        let column = match result_map.mappings().first() {
            Some(mapping) => mapping
                .column_name()
                .map(|c| prepend_prefix(c, column_prefix)),
            None => rsw.column_names().first().cloned(),
        }
        .ok_or_else(|| {
            Error::config(format!(
                "result map '{}' gives no column to read a {} from",
                result_map.id(),
                result_map.ty()
            ))
        })?;
        let value = rsw.read(&column, result_map.ty())?;
        Ok(Slot::Value(value))
    }

    fn create_parameterized_result_object(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        column_prefix: Option<&str>,
    ) -> Result<Created> {
        let config = Arc::clone(&self.config);
        let ty = result_map.ty();
        let mappings = result_map.constructor_mappings();
        let plan = constructor_plan(config.types(), ty, mappings)?;

        let mut arg_types = Vec::with_capacity(plan.len());
        let mut args = Vec::with_capacity(plan.len());
        let mut found_values = false;
        for (index, arg_ty) in plan {
            let mapping = &mappings[index];
            let value = if mapping.nested_query_id().is_some() {
                self.nested_query_constructor_value(rsw, mapping, &arg_ty, column_prefix)?
            } else if let Some(nested_id) = mapping.nested_result_map_id() {
                let prefix = nested_prefix(column_prefix, mapping);
                let nested = config.result_map(nested_id)?;
                let nested = self.resolve_discriminated_result_map(rsw, &nested, prefix.as_deref())?;
                self.get_row_value(rsw, &nested, prefix.as_deref())?
            } else {
                let column = mapping
                    .column_name()
                    .map(|c| prepend_prefix(c, column_prefix))
                    .ok_or_else(|| {
                        Error::config(format!(
                            "constructor argument of result map '{}' names no column",
                            result_map.id()
                        ))
                    })?;
                Slot::Value(read_mapping_column(rsw, &config, mapping, &column, Some(arg_ty.clone()))?)
            };
            found_values |= !value.is_null();
            arg_types.push(arg_ty);
            args.push(value);
        }

        if !found_values && !config.settings().return_instance_for_empty_row {
            return Ok(Created {
                object: Slot::null(),
                with_args: true,
            });
        }
        let id = config
            .object_factory()
            .create_with_args(&mut self.graph, config.types(), ty, &arg_types, args)?;
        Ok(Created {
            object: Slot::Object(id),
            with_args: true,
        })
    }

    fn create_by_constructor_signature(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        descriptor: &TypeDescriptor,
        column_prefix: Option<&str>,
    ) -> Result<Created> {
        let constructor = self
            .find_constructor_for_automapping(rsw, descriptor)?
            .ok_or_else(|| {
                let tags: Vec<String> = rsw.sql_types().iter().map(|t| format!("{:?}", t)).collect();
                Error::instantiation(
                    descriptor.name(),
                    format!("no constructor matching columns [{}]", tags.join(", ")),
                )
            })?
            .clone();

        let (arg_types, args, found_values) = if self.config.settings().arg_name_based_constructor_auto_mapping {
            self.apply_arg_name_based_constructor_auto_mapping(rsw, result_map, &constructor, column_prefix)?
        } else {
            self.apply_column_order_based_constructor_auto_mapping(rsw, &constructor)?
        };

        let config = Arc::clone(&self.config);
        if !found_values && !config.settings().return_instance_for_empty_row {
            return Ok(Created {
                object: Slot::null(),
                with_args: !arg_types.is_empty(),
            });
        }
        let id = config.object_factory().create_with_args(
            &mut self.graph,
            config.types(),
            result_map.ty(),
            &arg_types,
            args,
        )?;
        Ok(Created {
            object: Slot::Object(id),
            with_args: !arg_types.is_empty(),
        })
    }

    fn find_constructor_for_automapping<'d>(
        &self,
        rsw: &ResultSetWrapper<'_>,
        descriptor: &'d TypeDescriptor,
    ) -> Result<Option<&'d ConstructorDescriptor>> {
        let constructors = descriptor.constructors();
        if let [only] = constructors {
            return Ok(Some(only));
        }
        let mut marked = constructors.iter().filter(|c| c.automap);
        if let Some(first) = marked.next() {
            if marked.next().is_some() {
                return Err(Error::config(format!(
                    "more than one constructor of {} is marked for automapping",
                    descriptor.name()
                )));
            }
            return Ok(Some(first));
        }
        if self.config.settings().arg_name_based_constructor_auto_mapping {
            return Err(Error::config(format!(
                "arg name based constructor automapping is enabled and {} has several constructors; \
                 mark one of them for automapping",
                descriptor.name()
            )));
        }
        let converters = self.config.converters();
        let tags = rsw.sql_types();
        Ok(constructors.iter().find(|c| {
            c.params.len() == tags.len()
                && c.params
                    .iter()
                    .zip(tags)
                    .all(|(p, tag)| converters.has_converter(&p.ty, Some(tag)))
        }))
    }

    fn apply_column_order_based_constructor_auto_mapping(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        constructor: &ConstructorDescriptor,
    ) -> Result<(Vec<TargetType>, Vec<Slot>, bool)> {
        let columns: Vec<String> = rsw.column_names().to_vec();
        let mut arg_types = Vec::with_capacity(constructor.params.len());
        let mut args = Vec::with_capacity(constructor.params.len());
        let mut found_values = false;
        for (param, column) in constructor.params.iter().zip(&columns) {
            let value = rsw.read(column, &param.ty)?;
            found_values |= !value.is_null();
            arg_types.push(param.ty.clone());
            args.push(Slot::Value(value));
        }
        Ok((arg_types, args, found_values))
    }

    fn apply_arg_name_based_constructor_auto_mapping(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &ResultMap,
        constructor: &ConstructorDescriptor,
        column_prefix: Option<&str>,
    ) -> Result<(Vec<TargetType>, Vec<Slot>, bool)> {
        let camel_case = self.config.settings().map_underscore_to_camel_case;
        let key = map_key(result_map, column_prefix);
        let record_columns = !self.auto_mappings_cache.contains_key(&key);
        let columns: Vec<String> = rsw.column_names().to_vec();

        let mut arg_types = Vec::with_capacity(constructor.params.len());
        let mut args = Vec::with_capacity(constructor.params.len());
        let mut missing = Vec::new();
        let mut found_values = false;
        for param in &constructor.params {
            let matched = columns
                .iter()
                .find(|column| column_matches_param(column, param, column_prefix, camel_case));
            let Some(column) = matched else {
                missing.push(param.alias.clone().unwrap_or_else(|| param.name.clone()));
                continue;
            };
            let value = rsw.read(column, &param.ty)?;
            found_values |= !value.is_null();
            arg_types.push(param.ty.clone());
            args.push(Slot::Value(value));
            if record_columns {
                self.constructor_auto_mapping_columns
                    .entry(key.clone())
                    .or_default()
                    .push(column.clone());
            }
        }

        if found_values && args.len() < constructor.params.len() {
            return Err(Error::instantiation(
                result_map.ty().name(),
                format!(
                    "constructor automapping failed because [{}] were not found in the result set; \
                     available columns are [{}] and map_underscore_to_camel_case is {}",
                    missing.join(", "),
                    columns.join(", "),
                    camel_case
                ),
            ));
        }
        Ok((arg_types, args, found_values))
    }
}

fn column_matches_param(
    column: &str,
    param: &ParamDescriptor,
    column_prefix: Option<&str>,
    camel_case: bool,
) -> bool {
    let column = match column_prefix {
        Some(prefix) => match strip_prefix(column, prefix) {
            Some(rest) => rest,
            None => return false,
        },
        None => column,
    };
    let column = if camel_case {
        column.replace('_', "")
    } else {
        column.to_string()
    };
    let name = param.alias.as_deref().unwrap_or(&param.name);
    name.eq_ignore_ascii_case(&column)
}
