//! Runtime type descriptions.
//!
//! Bean targets are described once and registered by name. The descriptors
//! stand in for reflection: they list the writable properties with their
//! declared types and the constructors a bean can be created with.

use crate::types::TargetType;
use std::collections::HashMap;
use std::sync::Arc;

/// A writable property of a bean.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: TargetType,
}

/// A constructor parameter.
///
/// `property` is the bean property that receives the argument; it defaults
/// to the parameter name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub alias: Option<String>,
    pub ty: TargetType,
    pub property: String,
}

/// A constructor signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstructorDescriptor {
    pub params: Vec<ParamDescriptor>,
    /// Marks the constructor preferred for automatic mapping.
    pub automap: bool,
}

impl ConstructorDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter stored in the property of the same name.
    pub fn param(mut self, name: impl Into<String>, ty: TargetType) -> Self {
        let name = name.into();
        self.params.push(ParamDescriptor {
            property: name.clone(),
            name,
            alias: None,
            ty,
        });
        self
    }

    /// Add a parameter that also answers to `alias` during name matching.
    pub fn param_aliased(
        mut self,
        name: impl Into<String>,
        alias: impl Into<String>,
        ty: TargetType,
    ) -> Self {
        let name = name.into();
        self.params.push(ParamDescriptor {
            property: name.clone(),
            name,
            alias: Some(alias.into()),
            ty,
        });
        self
    }

    /// Mark as the constructor to use for automatic mapping.
    pub fn automap(mut self) -> Self {
        self.automap = true;
        self
    }

    pub fn param_types(&self) -> Vec<TargetType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    /// Does this constructor take arguments of exactly these types?
    ///
    /// [`TargetType::Any`] on the argument side matches any parameter.
    pub fn matches_arg_types(&self, arg_types: &[TargetType]) -> bool {
        self.params.len() == arg_types.len()
            && self
                .params
                .iter()
                .zip(arg_types)
                .all(|(p, a)| *a == TargetType::Any || p.ty == *a)
    }
}

/// Description of a bean type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    name: String,
    properties: Vec<PropertyDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
    default_constructor: bool,
    /// Concrete type the factory creates for an abstract type
    implementation: Option<TargetType>,
}

impl TypeDescriptor {
    /// A bean with a default constructor and no properties yet.
    pub fn bean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            constructors: Vec::new(),
            default_constructor: true,
            implementation: None,
        }
    }

    /// An abstract type the object factory resolves to `implementation`.
    pub fn interface(name: impl Into<String>, implementation: TargetType) -> Self {
        Self {
            default_constructor: false,
            implementation: Some(implementation),
            ..Self::bean(name)
        }
    }

    pub fn property(mut self, name: impl Into<String>, ty: TargetType) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.into(),
            ty,
        });
        self
    }

    /// Declare a constructor.
    ///
    /// Declaring a constructor removes the implicit default constructor;
    /// call [`with_default_constructor`](Self::with_default_constructor) to
    /// keep it.
    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        if self.constructors.is_empty() {
            self.default_constructor = false;
        }
        self.constructors.push(constructor);
        self
    }

    pub fn with_default_constructor(mut self) -> Self {
        self.default_constructor = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn has_default_constructor(&self) -> bool {
        self.default_constructor
    }

    pub fn is_interface(&self) -> bool {
        self.implementation.is_some()
    }

    pub fn implementation(&self) -> Option<&TargetType> {
        self.implementation.as_ref()
    }

    /// Look up a property by exact name.
    pub fn get_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Resolve a column-ish name to a declared property name.
    ///
    /// Matching is case-insensitive; with `camel_case` underscores in `name`
    /// are ignored, so `author_name` finds `authorName`.
    pub fn find_property(&self, name: &str, camel_case: bool) -> Option<&str> {
        let wanted = if camel_case {
            name.replace('_', "")
        } else {
            name.to_string()
        };
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(&wanted))
            .map(|p| p.name.as_str())
    }
}

/// Registry of bean descriptors, keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a descriptor.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    /// Descriptor for a named target type.
    pub fn describe(&self, target: &TargetType) -> Option<&Arc<TypeDescriptor>> {
        match target {
            TargetType::Named(name) => self.types.get(name),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> TypeDescriptor {
        TypeDescriptor::bean("Author")
            .property("id", TargetType::I64)
            .property("userName", TargetType::String)
    }

    #[test]
    fn test_find_property_folds_case_and_underscores() {
        let d = author();
        assert_eq!(d.find_property("ID", false), Some("id"));
        assert_eq!(d.find_property("user_name", true), Some("userName"));
        assert_eq!(d.find_property("user_name", false), None);
    }

    #[test]
    fn test_constructor_removes_default() {
        let d = author().constructor(ConstructorDescriptor::new().param("id", TargetType::I64));
        assert!(!d.has_default_constructor());
        assert!(d.with_default_constructor().has_default_constructor());
    }

    #[test]
    fn test_arg_type_matching() {
        let c = ConstructorDescriptor::new()
            .param("id", TargetType::I64)
            .param("name", TargetType::String);
        assert!(c.matches_arg_types(&[TargetType::I64, TargetType::String]));
        assert!(c.matches_arg_types(&[TargetType::Any, TargetType::String]));
        assert!(!c.matches_arg_types(&[TargetType::I64]));
    }

    #[test]
    fn test_registry_describe() {
        let mut registry = TypeRegistry::new();
        registry.register(author());
        assert!(registry.describe(&TargetType::named("Author")).is_some());
        assert!(registry.describe(&TargetType::Map).is_none());
    }
}
