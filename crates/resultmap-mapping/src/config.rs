//! Engine settings and the mapping configuration.
//!
//! [`Settings`] holds the global switches, [`Configuration`] bundles them with
//! the result map, statement, type and converter registries the engine
//! consults while materializing.

use crate::result_map::ResultMap;
use crate::result_mapping::{FetchType, ResultMapping};
use crate::statement::MappedStatement;
use resultmap_core::error::{ConfigError, Error, Result};
use resultmap_core::{
    ConverterRegistry, DefaultObjectFactory, LazyLoadPolicy, ObjectFactory, TypeDescriptor,
    TypeRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Which unmapped columns are copied onto properties automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMappingBehavior {
    /// Never automap
    None,
    /// Automap flat results; nested result maps only map explicitly
    #[default]
    Partial,
    /// Automap everything, nested result maps included
    Full,
}

/// What happens when an automapped column matches no writable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownColumnBehavior {
    #[default]
    None,
    /// Log a warning and continue
    Warning,
    /// Fail the materialization with a configuration error
    Failing,
}

/// Global engine switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_mapping_behavior: AutoMappingBehavior,
    pub auto_mapping_unknown_column_behavior: UnknownColumnBehavior,
    /// Match `author_name` columns to `authorName` properties
    pub map_underscore_to_camel_case: bool,
    /// Write nulls onto non-primitive properties instead of skipping them
    pub call_setters_on_nulls: bool,
    /// Produce an empty object (instead of none) when a row maps nothing
    pub return_instance_for_empty_row: bool,
    /// Reject row bounds on nested result maps
    pub safe_row_bounds_enabled: bool,
    /// Reject custom sinks on unordered nested result maps
    pub safe_result_handler_enabled: bool,
    /// Match automapped constructor parameters by name instead of position
    pub arg_name_based_constructor_auto_mapping: bool,
    /// Default fetch type of nested queries
    pub lazy_loading_enabled: bool,
    /// Any read of a lazy object loads all of its pending properties
    pub aggressive_lazy_loading: bool,
    /// Reading one of these names loads all pending properties
    pub lazy_load_trigger_methods: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_mapping_behavior: AutoMappingBehavior::Partial,
            auto_mapping_unknown_column_behavior: UnknownColumnBehavior::None,
            map_underscore_to_camel_case: false,
            call_setters_on_nulls: false,
            return_instance_for_empty_row: false,
            safe_row_bounds_enabled: true,
            safe_result_handler_enabled: true,
            arg_name_based_constructor_auto_mapping: false,
            lazy_loading_enabled: false,
            aggressive_lazy_loading: false,
            lazy_load_trigger_methods: ["equals", "clone", "hashCode", "toString"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid settings: {}", e),
                source: Some(Box::new(e)),
            })
        })
    }

    /// Set the automapping behavior.
    pub fn auto_mapping_behavior(mut self, behavior: AutoMappingBehavior) -> Self {
        self.auto_mapping_behavior = behavior;
        self
    }

    /// Set the unknown column behavior.
    pub fn unknown_column_behavior(mut self, behavior: UnknownColumnBehavior) -> Self {
        self.auto_mapping_unknown_column_behavior = behavior;
        self
    }

    pub fn map_underscore_to_camel_case(mut self, enabled: bool) -> Self {
        self.map_underscore_to_camel_case = enabled;
        self
    }

    pub fn call_setters_on_nulls(mut self, enabled: bool) -> Self {
        self.call_setters_on_nulls = enabled;
        self
    }

    pub fn return_instance_for_empty_row(mut self, enabled: bool) -> Self {
        self.return_instance_for_empty_row = enabled;
        self
    }

    pub fn safe_row_bounds(mut self, enabled: bool) -> Self {
        self.safe_row_bounds_enabled = enabled;
        self
    }

    pub fn safe_result_handler(mut self, enabled: bool) -> Self {
        self.safe_result_handler_enabled = enabled;
        self
    }

    pub fn arg_name_based_constructor_auto_mapping(mut self, enabled: bool) -> Self {
        self.arg_name_based_constructor_auto_mapping = enabled;
        self
    }

    pub fn lazy_loading(mut self, enabled: bool) -> Self {
        self.lazy_loading_enabled = enabled;
        self
    }

    pub fn aggressive_lazy_loading(mut self, enabled: bool) -> Self {
        self.aggressive_lazy_loading = enabled;
        self
    }

    /// Replace the lazy trigger names.
    pub fn lazy_load_trigger_methods<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.lazy_load_trigger_methods = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Settings plus every registry the engine reads.
pub struct Configuration {
    settings: Settings,
    result_maps: HashMap<String, Arc<ResultMap>>,
    statements: HashMap<String, Arc<MappedStatement>>,
    types: TypeRegistry,
    converters: ConverterRegistry,
    object_factory: Arc<dyn ObjectFactory>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut maps: Vec<&String> = self.result_maps.keys().collect();
        maps.sort();
        let mut statements: Vec<&String> = self.statements.keys().collect();
        statements.sort();
        f.debug_struct("Configuration")
            .field("settings", &self.settings)
            .field("result_maps", &maps)
            .field("statements", &statements)
            .field("types", &self.types)
            .field("converters", &self.converters)
            .finish_non_exhaustive()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Configuration {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            result_maps: HashMap::new(),
            statements: HashMap::new(),
            types: TypeRegistry::new(),
            converters: ConverterRegistry::with_defaults(),
            object_factory: Arc::new(DefaultObjectFactory),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn register_type(&mut self, descriptor: TypeDescriptor) {
        self.types.register(descriptor);
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    pub fn object_factory(&self) -> &dyn ObjectFactory {
        self.object_factory.as_ref()
    }

    pub fn set_object_factory(&mut self, factory: Arc<dyn ObjectFactory>) {
        self.object_factory = factory;
    }

    /// Register a result map. Ids are unique.
    pub fn add_result_map(&mut self, result_map: ResultMap) -> Result<()> {
        if self.result_maps.contains_key(result_map.id()) {
            return Err(Error::config(format!(
                "result map '{}' is already registered",
                result_map.id()
            )));
        }
        tracing::debug!(result_map = result_map.id(), "registering result map");
        self.result_maps
            .insert(result_map.id().to_string(), Arc::new(result_map));
        self.propagate_discriminated_nesting();
        Ok(())
    }

    /// A map whose discriminator can switch to a map with nested result maps
    /// must itself be handled by the nested pipeline.
    fn propagate_discriminated_nesting(&mut self) {
        let nested: HashSet<String> = self
            .result_maps
            .values()
            .filter(|m| m.has_nested_result_maps())
            .map(|m| m.id().to_string())
            .collect();
        for map in self.result_maps.values_mut() {
            if map.has_nested_result_maps() {
                continue;
            }
            let switches_to_nested = map
                .discriminator()
                .is_some_and(|d| d.cases().any(|(_, id)| nested.contains(id)));
            if switches_to_nested {
                Arc::make_mut(map).mark_nested_result_maps();
            }
        }
    }

    pub fn has_result_map(&self, id: &str) -> bool {
        self.result_maps.contains_key(id)
    }

    pub fn result_map(&self, id: &str) -> Result<Arc<ResultMap>> {
        self.result_maps
            .get(id)
            .cloned()
            .ok_or_else(|| Error::config(format!("result map '{}' is not registered", id)))
    }

    pub fn add_statement(&mut self, statement: MappedStatement) -> Result<()> {
        if self.statements.contains_key(statement.id()) {
            return Err(Error::config(format!(
                "statement '{}' is already registered",
                statement.id()
            )));
        }
        self.statements
            .insert(statement.id().to_string(), Arc::new(statement));
        Ok(())
    }

    pub fn statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.statements
            .get(id)
            .cloned()
            .ok_or_else(|| Error::config(format!("statement '{}' is not registered", id)))
    }

    /// Effective fetch type of a nested query mapping.
    pub fn is_lazy(&self, mapping: &ResultMapping) -> bool {
        match mapping.fetch_type() {
            Some(FetchType::Lazy) => true,
            Some(FetchType::Eager) => false,
            None => self.settings.lazy_loading_enabled,
        }
    }

    /// Lazy trigger policy derived from the settings.
    pub fn lazy_load_policy(&self) -> LazyLoadPolicy {
        LazyLoadPolicy {
            aggressive: self.settings.aggressive_lazy_loading,
            trigger_properties: self
                .settings
                .lazy_load_trigger_methods
                .iter()
                .cloned()
                .collect(),
        }
    }

    /// Does automapping apply to `result_map` in the given pipeline?
    pub fn should_auto_map(&self, result_map: &ResultMap, nested: bool) -> bool {
        match result_map.auto_mapping() {
            Some(enabled) => enabled,
            None if nested => self.settings.auto_mapping_behavior == AutoMappingBehavior::Full,
            None => self.settings.auto_mapping_behavior != AutoMappingBehavior::None,
        }
    }
}
