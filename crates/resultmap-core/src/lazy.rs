//! Deferred sub-query loading.
//!
//! A lazily mapped property holds a [`Slot::Pending`] token until it is read
//! through [`ObjectGraph::resolve_property`], which runs the sub-query via a
//! [`LazyLoader`] and replaces the token with the loaded value.

use crate::cache_key::CacheKey;
use crate::error::Result;
use crate::object::{ObjectGraph, ObjectId, Slot};
use crate::types::TargetType;
use crate::value::Value;
use std::collections::{BTreeMap, HashSet};

/// Parameter passed to a nested sub-query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParameter {
    /// Value of the single linking column
    Value(Value),
    /// Non-null linking column values keyed by the sub-query's parameter names
    Composite(BTreeMap<String, Value>),
}

/// A sub-query that has not run yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLoad {
    pub query_id: String,
    pub parameter: QueryParameter,
    /// Declared type of the property the result is stored in
    pub target: TargetType,
    pub key: CacheKey,
}

/// Runs pending sub-queries on behalf of the object graph.
pub trait LazyLoader {
    /// Execute `load` and return the value to store in the property.
    fn load(&mut self, graph: &mut ObjectGraph, load: &PendingLoad) -> Result<Slot>;
}

/// When reading a property triggers lazy loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyLoadPolicy {
    /// Any read of an object loads all of its pending properties
    pub aggressive: bool,
    /// Reading one of these names loads all pending properties
    pub trigger_properties: HashSet<String>,
}

impl Default for LazyLoadPolicy {
    fn default() -> Self {
        Self {
            aggressive: false,
            trigger_properties: ["equals", "clone", "hashCode", "toString"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl ObjectGraph {
    /// Read a property, running its pending load first if needed.
    pub fn resolve_property(
        &mut self,
        id: ObjectId,
        name: &str,
        policy: &LazyLoadPolicy,
        loader: &mut dyn LazyLoader,
    ) -> Result<Option<Slot>> {
        if policy.aggressive || policy.trigger_properties.contains(name) {
            self.load_pending(id, loader)?;
        } else if let Some(Slot::Pending(pending)) = self.get(id).get(name).cloned() {
            tracing::trace!(property = name, query = %pending.query_id, "triggering lazy load");
            let loaded = loader.load(self, &pending)?;
            self.get_mut(id).set(name, loaded);
        }
        Ok(self.get(id).get(name).cloned())
    }

    /// Run every pending load of one object. Returns how many ran.
    pub fn load_pending(&mut self, id: ObjectId, loader: &mut dyn LazyLoader) -> Result<usize> {
        let names = self.get(id).pending_properties();
        let mut loaded_count = 0;
        for name in names {
            if let Some(Slot::Pending(pending)) = self.get(id).get(&name).cloned() {
                let loaded = loader.load(self, &pending)?;
                self.get_mut(id).set(name, loaded);
                loaded_count += 1;
            }
        }
        Ok(loaded_count)
    }

    /// Run pending loads on every object reachable from `root`, including
    /// objects that loads bring in.
    pub fn load_reachable(&mut self, root: &Slot, loader: &mut dyn LazyLoader) -> Result<usize> {
        let Some(start) = root.as_object() else {
            return Ok(0);
        };
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        let mut total = 0;
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            total += self.load_pending(id, loader)?;
            let object = self.get(id);
            stack.extend(
                object
                    .fields()
                    .map(|(_, slot)| slot)
                    .chain(object.elements())
                    .filter_map(Slot::as_object),
            );
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingLoader {
        calls: usize,
    }

    impl LazyLoader for CountingLoader {
        fn load(&mut self, graph: &mut ObjectGraph, load: &PendingLoad) -> Result<Slot> {
            self.calls += 1;
            let child = graph.new_map(TargetType::Map);
            graph
                .get_mut(child)
                .set("query", Slot::Value(Value::Text(load.query_id.clone())));
            Ok(Slot::Object(child))
        }
    }

    fn pending(query: &str) -> Slot {
        Slot::Pending(PendingLoad {
            query_id: query.to_string(),
            parameter: QueryParameter::Value(Value::BigInt(1)),
            target: TargetType::Map,
            key: CacheKey::new(),
        })
    }

    fn graph() -> (ObjectGraph, ObjectId) {
        let mut graph = ObjectGraph::new();
        let id = graph.new_map(TargetType::Map);
        graph.get_mut(id).set("author", pending("selectAuthor"));
        graph.get_mut(id).set("posts", pending("selectPosts"));
        graph.get_mut(id).set("id", Slot::Value(Value::BigInt(1)));
        (graph, id)
    }

    #[test]
    fn test_read_loads_only_that_property() {
        let (mut graph, id) = graph();
        let mut loader = CountingLoader { calls: 0 };
        let slot = graph
            .resolve_property(id, "author", &LazyLoadPolicy::default(), &mut loader)
            .unwrap()
            .unwrap();
        assert!(slot.as_object().is_some());
        assert_eq!(loader.calls, 1);
        assert!(graph.get(id).get("posts").unwrap().is_pending());

        graph
            .resolve_property(id, "author", &LazyLoadPolicy::default(), &mut loader)
            .unwrap();
        assert_eq!(loader.calls, 1);
    }

    #[test]
    fn test_aggressive_and_trigger_reads_load_everything() {
        let (mut graph, id) = graph();
        let mut loader = CountingLoader { calls: 0 };
        let policy = LazyLoadPolicy {
            aggressive: true,
            ..LazyLoadPolicy::default()
        };
        graph.resolve_property(id, "id", &policy, &mut loader).unwrap();
        assert_eq!(loader.calls, 2);

        let (mut graph, id) = self::graph();
        let mut loader = CountingLoader { calls: 0 };
        graph
            .resolve_property(id, "toString", &LazyLoadPolicy::default(), &mut loader)
            .unwrap();
        assert_eq!(loader.calls, 2);
        assert!(graph.get(id).pending_properties().is_empty());
    }

    #[test]
    fn test_load_reachable() {
        let (mut graph, id) = graph();
        let mut loader = CountingLoader { calls: 0 };
        let total = graph.load_reachable(&Slot::Object(id), &mut loader).unwrap();
        assert_eq!(total, 2);
    }
}
