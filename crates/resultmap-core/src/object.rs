//! Arena-backed object graph.
//!
//! Materialized objects live in an [`ObjectGraph`] and refer to each other
//! through [`ObjectId`] handles. Handles make cyclic graphs (a child pointing
//! back at its ancestor) expressible without shared mutable pointers, and let
//! the engine link an object into its parent before the object is complete.

use crate::error::{Error, Result};
use crate::lazy::PendingLoad;
use crate::types::TargetType;
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};

/// Handle to an object inside an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Contents of a property, map entry or collection element.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Object(ObjectId),
    /// A lazily loaded property that has not been read yet
    Pending(PendingLoad),
}

impl Slot {
    pub const fn null() -> Self {
        Slot::Value(Value::Null)
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Slot::Value(Value::Null))
    }

    pub const fn as_object(&self) -> Option<ObjectId> {
        match self {
            Slot::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Value(v) => Some(v),
            _ => None,
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending(_))
    }
}

impl From<Value> for Slot {
    fn from(v: Value) -> Self {
        Slot::Value(v)
    }
}

impl From<ObjectId> for Slot {
    fn from(id: ObjectId) -> Self {
        Slot::Object(id)
    }
}

/// How an object stores its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Typed properties declared by a type descriptor
    Bean,
    /// Arbitrary string keys
    Map,
    /// Ordered elements
    Collection,
}

/// A single materialized object.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    ty: TargetType,
    shape: Shape,
    fields: BTreeMap<String, Slot>,
    elements: Vec<Slot>,
}

impl Object {
    fn new(ty: TargetType, shape: Shape) -> Self {
        Self {
            ty,
            shape,
            fields: BTreeMap::new(),
            elements: Vec::new(),
        }
    }

    pub fn ty(&self) -> &TargetType {
        &self.ty
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Property (bean) or entry (map) by name.
    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, slot: Slot) {
        self.fields.insert(name.into(), slot);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn elements(&self) -> &[Slot] {
        &self.elements
    }

    pub fn element_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.elements.get_mut(index)
    }

    pub fn push(&mut self, slot: Slot) {
        self.elements.push(slot);
    }

    /// Names of properties still holding a pending lazy load.
    pub fn pending_properties(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, slot)| slot.is_pending())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Owner of all objects produced by one execution.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: Vec<Object>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, object: Object) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    pub fn new_bean(&mut self, ty: TargetType) -> ObjectId {
        self.alloc(Object::new(ty, Shape::Bean))
    }

    pub fn new_map(&mut self, ty: TargetType) -> ObjectId {
        self.alloc(Object::new(ty, Shape::Map))
    }

    pub fn new_collection(&mut self, ty: TargetType) -> ObjectId {
        self.alloc(Object::new(ty, Shape::Collection))
    }

    /// Borrow an object.
    ///
    /// Ids are only minted by this graph, so a foreign id is a logic error
    /// and panics.
    pub fn get(&self, id: ObjectId) -> &Object {
        &self.objects[id.0]
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.0]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Render a slot as JSON.
    ///
    /// Beans and maps become objects, collections become arrays, pending
    /// lazy loads become `null`. A reference back to an object that is still
    /// being rendered (a cycle) is also rendered as `null`.
    pub fn to_json(&self, slot: &Slot) -> serde_json::Value {
        let mut visiting = HashSet::new();
        self.render(slot, &mut visiting)
    }

    fn render(&self, slot: &Slot, visiting: &mut HashSet<ObjectId>) -> serde_json::Value {
        match slot {
            Slot::Value(v) => v.to_json(),
            Slot::Pending(_) => serde_json::Value::Null,
            Slot::Object(id) => {
                if !visiting.insert(*id) {
                    return serde_json::Value::Null;
                }
                let object = self.get(*id);
                let rendered = match object.shape {
                    Shape::Collection => serde_json::Value::Array(
                        object
                            .elements
                            .iter()
                            .map(|e| self.render(e, visiting))
                            .collect(),
                    ),
                    Shape::Bean | Shape::Map => serde_json::Value::Object(
                        object
                            .fields
                            .iter()
                            .map(|(k, v)| (k.clone(), self.render(v, visiting)))
                            .collect(),
                    ),
                };
                visiting.remove(id);
                rendered
            }
        }
    }

    /// Deserialize a materialized slot into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self, slot: &Slot) -> Result<T> {
        serde_json::from_value(self.to_json(slot)).map_err(|e| Error::Serde(e.to_string()))
    }
}
