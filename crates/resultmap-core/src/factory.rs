//! Object creation.

use crate::error::{Error, Result};
use crate::meta::TypeRegistry;
use crate::object::{ObjectGraph, ObjectId, Slot};
use crate::types::TargetType;

/// Creates empty objects and constructor-built beans inside a graph.
pub trait ObjectFactory {
    /// Create an object through its default constructor.
    fn create(
        &self,
        graph: &mut ObjectGraph,
        types: &TypeRegistry,
        ty: &TargetType,
    ) -> Result<ObjectId>;

    /// Create a bean through the constructor whose parameter types match `arg_types`.
    fn create_with_args(
        &self,
        graph: &mut ObjectGraph,
        types: &TypeRegistry,
        ty: &TargetType,
        arg_types: &[TargetType],
        args: Vec<Slot>,
    ) -> Result<ObjectId>;

    fn is_collection(&self, ty: &TargetType) -> bool {
        ty.is_collection()
    }
}

/// Factory resolving abstract types to their registered implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultObjectFactory;

impl DefaultObjectFactory {
    fn resolve<'t>(&self, types: &'t TypeRegistry, ty: &'t TargetType) -> Result<&'t TargetType> {
        let mut current = ty;
        // Implementations may themselves be abstract; bound the walk.
        for _ in 0..8 {
            match types.describe(current).and_then(|d| d.implementation()) {
                Some(implementation) => current = implementation,
                None => return Ok(current),
            }
        }
        Err(Error::instantiation(
            ty.name(),
            "implementation chain does not terminate",
        ))
    }
}

impl ObjectFactory for DefaultObjectFactory {
    fn create(
        &self,
        graph: &mut ObjectGraph,
        types: &TypeRegistry,
        ty: &TargetType,
    ) -> Result<ObjectId> {
        let resolved = self.resolve(types, ty)?;
        match resolved {
            TargetType::Map => Ok(graph.new_map(ty.clone())),
            TargetType::List => Ok(graph.new_collection(ty.clone())),
            TargetType::Named(name) => {
                let descriptor = types
                    .get(name)
                    .ok_or_else(|| Error::instantiation(name.as_str(), "type is not registered"))?;
                if !descriptor.has_default_constructor() {
                    return Err(Error::instantiation(
                        name.as_str(),
                        "no default constructor",
                    ));
                }
                Ok(graph.new_bean(resolved.clone()))
            }
            scalar => Err(Error::instantiation(
                scalar.name(),
                "scalar types are produced by converters, not constructed",
            )),
        }
    }

    fn create_with_args(
        &self,
        graph: &mut ObjectGraph,
        types: &TypeRegistry,
        ty: &TargetType,
        arg_types: &[TargetType],
        args: Vec<Slot>,
    ) -> Result<ObjectId> {
        let resolved = self.resolve(types, ty)?;
        let descriptor = types
            .describe(resolved)
            .ok_or_else(|| Error::instantiation(resolved.name(), "type is not registered"))?;
        let constructor = descriptor
            .constructors()
            .iter()
            .find(|c| c.matches_arg_types(arg_types))
            .ok_or_else(|| {
                let names: Vec<&str> = arg_types.iter().map(TargetType::name).collect();
                Error::instantiation(
                    resolved.name(),
                    format!("no constructor matching [{}]", names.join(", ")),
                )
            })?;
        let id = graph.new_bean(resolved.clone());
        let object = graph.get_mut(id);
        for (param, arg) in constructor.params.iter().zip(args) {
            object.set(param.property.clone(), arg);
        }
        Ok(id)
    }
}
