//! Uniform property access over beans, maps and collections.
//!
//! [`MetaObject`] picks an [`ObjectWrapper`] once per object, by shape, and
//! then answers the questions the mapping pipelines ask: which property does a
//! column name refer to, is it writable, what type does it expect. Paths may
//! be dotted (`author.name`) and indexed (`posts[0]`, `attrs[key]`).

use crate::error::{Error, Result};
use crate::factory::ObjectFactory;
use crate::meta::{TypeDescriptor, TypeRegistry};
use crate::object::{Object, ObjectGraph, ObjectId, Shape, Slot};
use crate::types::TargetType;
use std::sync::Arc;

/// One segment of a property path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyTokenizer<'a> {
    pub name: &'a str,
    pub index: Option<&'a str>,
    pub children: Option<&'a str>,
}

impl<'a> PropertyTokenizer<'a> {
    pub fn new(path: &'a str) -> Self {
        let (head, children) = match path.find('.') {
            Some(i) => (&path[..i], Some(&path[i + 1..])),
            None => (path, None),
        };
        let (name, index) = match head.find('[') {
            Some(i) => (&head[..i], Some(head[i + 1..].trim_end_matches(']'))),
            None => (head, None),
        };
        Self {
            name,
            index,
            children,
        }
    }
}

/// Shape-specific accessor for a single object level.
pub trait ObjectWrapper {
    fn get(&self, object: &Object, name: &str) -> Option<Slot>;

    fn set(&self, object: &mut Object, name: &str, value: Slot) -> Result<()>;

    fn find_property(&self, name: &str, camel_case: bool) -> Option<String>;

    fn has_setter(&self, name: &str) -> bool;

    fn has_getter(&self, object: &Object, name: &str) -> bool;

    /// Declared type of a property, [`TargetType::Any`] when undeclared.
    fn property_type(&self, name: &str) -> Option<TargetType>;

    fn is_collection(&self) -> bool {
        false
    }

    fn add(&self, object: &mut Object, element: Slot) -> Result<()> {
        let _ = (object, element);
        Err(Error::InvalidOperation(
            "add is only supported on collections".to_string(),
        ))
    }
}

/// Accessor for descriptor-backed beans.
#[derive(Debug, Clone)]
pub struct BeanWrapper {
    descriptor: Arc<TypeDescriptor>,
}

impl ObjectWrapper for BeanWrapper {
    fn get(&self, object: &Object, name: &str) -> Option<Slot> {
        object.get(name).cloned()
    }

    fn set(&self, object: &mut Object, name: &str, value: Slot) -> Result<()> {
        if self.descriptor.get_property(name).is_none() {
            return Err(Error::InvalidOperation(format!(
                "no writable property '{}' on {}",
                name,
                self.descriptor.name()
            )));
        }
        object.set(name, value);
        Ok(())
    }

    fn find_property(&self, name: &str, camel_case: bool) -> Option<String> {
        self.descriptor
            .find_property(name, camel_case)
            .map(str::to_string)
    }

    fn has_setter(&self, name: &str) -> bool {
        self.descriptor.get_property(name).is_some()
    }

    fn has_getter(&self, _object: &Object, name: &str) -> bool {
        self.descriptor.get_property(name).is_some()
    }

    fn property_type(&self, name: &str) -> Option<TargetType> {
        self.descriptor.get_property(name).map(|p| p.ty.clone())
    }
}

/// Accessor for string-keyed maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapWrapper;

impl ObjectWrapper for MapWrapper {
    fn get(&self, object: &Object, name: &str) -> Option<Slot> {
        object.get(name).cloned()
    }

    fn set(&self, object: &mut Object, name: &str, value: Slot) -> Result<()> {
        object.set(name, value);
        Ok(())
    }

    fn find_property(&self, name: &str, _camel_case: bool) -> Option<String> {
        Some(name.to_string())
    }

    fn has_setter(&self, _name: &str) -> bool {
        true
    }

    fn has_getter(&self, object: &Object, name: &str) -> bool {
        object.get(name).is_some()
    }

    fn property_type(&self, _name: &str) -> Option<TargetType> {
        Some(TargetType::Any)
    }
}

/// Accessor for collections: elements can only be appended.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionWrapper;

impl ObjectWrapper for CollectionWrapper {
    fn get(&self, _object: &Object, _name: &str) -> Option<Slot> {
        None
    }

    fn set(&self, _object: &mut Object, name: &str, _value: Slot) -> Result<()> {
        Err(Error::InvalidOperation(format!(
            "cannot set property '{}' on a collection",
            name
        )))
    }

    fn find_property(&self, _name: &str, _camel_case: bool) -> Option<String> {
        None
    }

    fn has_setter(&self, _name: &str) -> bool {
        false
    }

    fn has_getter(&self, _object: &Object, _name: &str) -> bool {
        false
    }

    fn property_type(&self, _name: &str) -> Option<TargetType> {
        None
    }

    fn is_collection(&self) -> bool {
        true
    }

    fn add(&self, object: &mut Object, element: Slot) -> Result<()> {
        object.push(element);
        Ok(())
    }
}

/// Path-aware accessor bound to one object of a graph.
pub struct MetaObject<'t> {
    id: ObjectId,
    ty: TargetType,
    types: &'t TypeRegistry,
    wrapper: Box<dyn ObjectWrapper>,
}

impl<'t> MetaObject<'t> {
    pub fn for_object(graph: &ObjectGraph, types: &'t TypeRegistry, id: ObjectId) -> Result<Self> {
        let object = graph.get(id);
        let wrapper: Box<dyn ObjectWrapper> = match object.shape() {
            Shape::Map => Box::new(MapWrapper),
            Shape::Collection => Box::new(CollectionWrapper),
            Shape::Bean => {
                let descriptor = types.describe(object.ty()).ok_or_else(|| {
                    Error::instantiation(object.ty().name(), "type is not registered")
                })?;
                Box::new(BeanWrapper {
                    descriptor: Arc::clone(descriptor),
                })
            }
        };
        Ok(Self {
            id,
            ty: object.ty().clone(),
            types,
            wrapper,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn ty(&self) -> &TargetType {
        &self.ty
    }

    /// Resolve a (possibly dotted) name to the declared property path.
    pub fn find_property(&self, name: &str, camel_case: bool) -> Option<String> {
        let prop = PropertyTokenizer::new(name);
        let head = self.wrapper.find_property(prop.name, camel_case)?;
        match prop.children {
            None => Some(head),
            Some(rest) => {
                let child_ty = self.wrapper.property_type(&head)?;
                let tail = find_type_property(self.types, &child_ty, rest, camel_case)?;
                Some(format!("{}.{}", head, tail))
            }
        }
    }

    pub fn has_setter(&self, path: &str) -> bool {
        self.setter_type(path).is_some() && {
            let prop = PropertyTokenizer::new(path);
            self.wrapper.has_setter(prop.name)
        }
    }

    pub fn has_getter(&self, graph: &ObjectGraph, path: &str) -> bool {
        let prop = PropertyTokenizer::new(path);
        if !self.wrapper.has_getter(graph.get(self.id), prop.name) {
            return false;
        }
        match prop.children {
            None => true,
            Some(rest) => match self.get_value(graph, prop.name).and_then(|s| s.as_object()) {
                Some(child) => MetaObject::for_object(graph, self.types, child)
                    .is_ok_and(|m| m.has_getter(graph, rest)),
                None => self
                    .wrapper
                    .property_type(prop.name)
                    .and_then(|ty| type_property_type(self.types, &ty, rest))
                    .is_some(),
            },
        }
    }

    /// Declared type of the property at `path`.
    pub fn setter_type(&self, path: &str) -> Option<TargetType> {
        let prop = PropertyTokenizer::new(path);
        let head = self.wrapper.property_type(prop.name)?;
        let head = if prop.index.is_some() {
            TargetType::Any
        } else {
            head
        };
        match prop.children {
            None => Some(head),
            Some(rest) => type_property_type(self.types, &head, rest),
        }
    }

    pub fn getter_type(&self, path: &str) -> Option<TargetType> {
        self.setter_type(path)
    }

    pub fn is_collection(&self) -> bool {
        self.wrapper.is_collection()
    }

    /// Read the slot at `path`. Pending lazy loads are returned as-is.
    pub fn get_value(&self, graph: &ObjectGraph, path: &str) -> Option<Slot> {
        let prop = PropertyTokenizer::new(path);
        let head = self.wrapper.get(graph.get(self.id), prop.name)?;
        let head = match prop.index {
            Some(index) => indexed_get(graph, &head, index)?,
            None => head,
        };
        match prop.children {
            None => Some(head),
            Some(rest) => {
                let child = head.as_object()?;
                MetaObject::for_object(graph, self.types, child)
                    .ok()?
                    .get_value(graph, rest)
            }
        }
    }

    /// Write `value` at `path`, instantiating missing intermediate objects.
    ///
    /// Writing a null through a missing intermediate is a no-op.
    pub fn set_value(
        &self,
        graph: &mut ObjectGraph,
        factory: &dyn ObjectFactory,
        path: &str,
        value: Slot,
    ) -> Result<()> {
        let prop = PropertyTokenizer::new(path);
        if let Some(index) = prop.index {
            let container = self
                .wrapper
                .get(graph.get(self.id), prop.name)
                .and_then(|s| s.as_object())
                .ok_or_else(|| {
                    Error::InvalidOperation(format!(
                        "cannot index into missing property '{}'",
                        prop.name
                    ))
                })?;
            return match prop.children {
                None => indexed_set(graph, container, index, value),
                Some(rest) => {
                    let element = indexed_get(graph, &Slot::Object(container), index)
                        .and_then(|s| s.as_object())
                        .ok_or_else(|| {
                            Error::InvalidOperation(format!(
                                "no object at '{}[{}]'",
                                prop.name, index
                            ))
                        })?;
                    MetaObject::for_object(graph, self.types, element)?
                        .set_value(graph, factory, rest, value)
                }
            };
        }
        match prop.children {
            None => self.wrapper.set(graph.get_mut(self.id), prop.name, value),
            Some(rest) => {
                let existing = self
                    .wrapper
                    .get(graph.get(self.id), prop.name)
                    .and_then(|s| s.as_object());
                let child = match existing {
                    Some(child) => child,
                    None if value.is_null() => return Ok(()),
                    None => self.instantiate_child(graph, factory, prop.name)?,
                };
                MetaObject::for_object(graph, self.types, child)?
                    .set_value(graph, factory, rest, value)
            }
        }
    }

    /// Create an empty object of the declared type of `name` and store it there.
    pub fn instantiate_child(
        &self,
        graph: &mut ObjectGraph,
        factory: &dyn ObjectFactory,
        name: &str,
    ) -> Result<ObjectId> {
        let ty = self.wrapper.property_type(name).ok_or_else(|| {
            Error::InvalidOperation(format!("no property '{}' on {}", name, self.ty))
        })?;
        let ty = if ty == TargetType::Any {
            TargetType::Map
        } else {
            ty
        };
        let child = factory.create(graph, self.types, &ty)?;
        self.wrapper
            .set(graph.get_mut(self.id), name, Slot::Object(child))?;
        Ok(child)
    }

    /// Append to a collection object.
    pub fn add(&self, graph: &mut ObjectGraph, element: Slot) -> Result<()> {
        self.wrapper.add(graph.get_mut(self.id), element)
    }
}

fn indexed_get(graph: &ObjectGraph, container: &Slot, index: &str) -> Option<Slot> {
    let object = graph.get(container.as_object()?);
    match object.shape() {
        Shape::Collection => {
            let i: usize = index.parse().ok()?;
            object.elements().get(i).cloned()
        }
        Shape::Map | Shape::Bean => object.get(index).cloned(),
    }
}

fn indexed_set(graph: &mut ObjectGraph, container: ObjectId, index: &str, value: Slot) -> Result<()> {
    let object = graph.get_mut(container);
    match object.shape() {
        Shape::Collection => {
            let slot = index
                .parse::<usize>()
                .ok()
                .and_then(|i| object.element_mut(i))
                .ok_or_else(|| {
                    Error::InvalidOperation(format!("collection index '{}' out of range", index))
                })?;
            *slot = value;
            Ok(())
        }
        Shape::Map | Shape::Bean => {
            object.set(index, value);
            Ok(())
        }
    }
}

/// Declared type of `path` below a value of type `ty`.
fn type_property_type(types: &TypeRegistry, ty: &TargetType, path: &str) -> Option<TargetType> {
    let prop = PropertyTokenizer::new(path);
    let head = match ty {
        TargetType::Named(_) => types.describe(ty)?.get_property(prop.name)?.ty.clone(),
        TargetType::Map | TargetType::Any => TargetType::Any,
        _ => return None,
    };
    let head = if prop.index.is_some() {
        TargetType::Any
    } else {
        head
    };
    match prop.children {
        None => Some(head),
        Some(rest) => type_property_type(types, &head, rest),
    }
}

fn find_type_property(
    types: &TypeRegistry,
    ty: &TargetType,
    path: &str,
    camel_case: bool,
) -> Option<String> {
    let prop = PropertyTokenizer::new(path);
    let (head, head_ty) = match ty {
        TargetType::Named(_) => {
            let descriptor = types.describe(ty)?;
            let name = descriptor.find_property(prop.name, camel_case)?;
            let head_ty = descriptor.get_property(name)?.ty.clone();
            (name.to_string(), head_ty)
        }
        TargetType::Map | TargetType::Any => (prop.name.to_string(), TargetType::Any),
        _ => return None,
    };
    match prop.children {
        None => Some(head),
        Some(rest) => {
            let tail = find_type_property(types, &head_ty, rest, camel_case)?;
            Some(format!("{}.{}", head, tail))
        }
    }
}
