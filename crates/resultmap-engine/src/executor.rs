//! Running statements and their nested sub-queries.
//!
//! The handler never talks to a data source directly. Nested sub-queries go
//! through a [`SubQueryExecutor`], which owns a statement-local cache: a
//! sub-query already run (or still running, for circular references) within
//! the same outermost query is not run again, and properties waiting on an
//! in-flight sub-query are filled once the outermost query completes.

use crate::context::{Materialized, RowBounds};
use crate::deferred::extract_result;
use crate::handler::ResultSetHandler;
use crate::stream::ObjectCursor;
use resultmap_core::error::{Error, Result};
use resultmap_core::{
    CacheKey, LazyLoader, MetaObject, ObjectGraph, ObjectId, PendingLoad, QueryParameter, Slot,
    StatementResults, TargetType,
};
use resultmap_mapping::{Configuration, MappedStatement};
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

/// Executes the nested sub-queries a result map refers to.
pub trait SubQueryExecutor {
    /// Identity of one sub-query execution.
    fn create_cache_key(&self, statement: &MappedStatement, parameter: &QueryParameter) -> Result<CacheKey>;

    /// Has this execution run, or is it running, within the current outermost query?
    fn is_cached(&self, statement: &MappedStatement, key: &CacheKey) -> bool;

    /// Fill `property` of `object` from the cached execution under `key`,
    /// now if it is complete, otherwise when the outermost query completes.
    fn defer_load(
        &mut self,
        graph: &mut ObjectGraph,
        statement: &Arc<MappedStatement>,
        object: ObjectId,
        property: &str,
        key: CacheKey,
        target: TargetType,
    ) -> Result<()>;

    /// Run a sub-query, materializing its rows into `graph`.
    fn query(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &QueryParameter,
        key: &CacheKey,
        graph: &mut ObjectGraph,
    ) -> Result<Vec<Slot>>;
}

/// Produces the result sets of a statement.
pub trait StatementSource {
    fn open(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&QueryParameter>,
    ) -> Result<Box<dyn StatementResults>>;
}

impl<F> StatementSource for F
where
    F: FnMut(&MappedStatement, Option<&QueryParameter>) -> Result<Box<dyn StatementResults>>,
{
    fn open(
        &mut self,
        statement: &MappedStatement,
        parameter: Option<&QueryParameter>,
    ) -> Result<Box<dyn StatementResults>> {
        self(statement, parameter)
    }
}

#[derive(Debug, Clone)]
enum CacheEntry {
    /// Placeholder while the execution is running
    InFlight,
    Ready(Vec<Vec<Slot>>),
}

#[derive(Debug, Clone)]
struct DeferredLoad {
    object: ObjectId,
    property: String,
    key: CacheKey,
    target: TargetType,
}

/// The rows a sub-query hands to a property.
///
/// A statement with one result map yields that map's rows; with several,
/// one collection per result map.
fn collapse_single_result_list(
    graph: &mut ObjectGraph,
    config: &Configuration,
    mut lists: Vec<Vec<Slot>>,
) -> Result<Vec<Slot>> {
    if lists.len() == 1 {
        return Ok(lists.pop().unwrap_or_default());
    }
    lists
        .into_iter()
        .map(|rows| extract_result(graph, config, rows, &TargetType::List))
        .collect()
}

/// Executor running statements against a [`StatementSource`].
pub struct InMemoryExecutor<S> {
    config: Arc<Configuration>,
    source: S,
    local_cache: HashMap<CacheKey, CacheEntry>,
    query_stack: usize,
    deferred_loads: Vec<DeferredLoad>,
    executions: usize,
}

impl<S> std::fmt::Debug for InMemoryExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryExecutor")
            .field("cached", &self.local_cache.len())
            .field("query_stack", &self.query_stack)
            .field("deferred_loads", &self.deferred_loads.len())
            .field("executions", &self.executions)
            .finish_non_exhaustive()
    }
}

impl<S: StatementSource> InMemoryExecutor<S> {
    pub fn new(config: Arc<Configuration>, source: S) -> Self {
        Self {
            config,
            source,
            local_cache: HashMap::new(),
            query_stack: 0,
            deferred_loads: Vec::new(),
            executions: 0,
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Number of times a statement was opened against the source.
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// Run the statement `statement_id` and materialize all of its result sets.
    pub fn select(&mut self, statement_id: &str, parameter: Option<QueryParameter>) -> Result<Materialized> {
        let statement = self.config.statement(statement_id)?;
        let key = self.key_for(&statement, parameter.as_ref())?;
        let mut graph = ObjectGraph::new();
        let results = self.execute(&statement, parameter.as_ref(), &key, &mut graph)?;
        Ok(Materialized::new(graph, results))
    }

    /// Run the statement `statement_id` and stream the objects of its
    /// first result set.
    pub fn select_cursor(
        &mut self,
        statement_id: &str,
        parameter: Option<QueryParameter>,
        row_bounds: RowBounds,
    ) -> Result<ObjectCursor<'_>> {
        let statement = self.config.statement(statement_id)?;
        self.executions += 1;
        let mut results = self.source.open(&statement, parameter.as_ref())?;
        let config = Arc::clone(&self.config);
        ResultSetHandler::new(config, statement)
            .with_row_bounds(row_bounds)
            .with_executor(self)
            .into_cursor(results.as_mut())
    }

    fn key_for(&self, statement: &MappedStatement, parameter: Option<&QueryParameter>) -> Result<CacheKey> {
        match parameter {
            Some(parameter) => self.create_cache_key(statement, parameter),
            None => CacheKey::from_parts([statement.id()]),
        }
    }

    fn execute(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: Option<&QueryParameter>,
        key: &CacheKey,
        graph: &mut ObjectGraph,
    ) -> Result<Vec<Vec<Slot>>> {
        match self.local_cache.get(key) {
            Some(CacheEntry::Ready(lists)) => {
                tracing::trace!(statement = %statement.id(), "statement cache hit");
                return Ok(lists.clone());
            }
            Some(CacheEntry::InFlight) => {
                return Err(Error::InvalidOperation(format!(
                    "statement '{}' eagerly requires its own result while still running",
                    statement.id()
                )));
            }
            None => {}
        }

        self.query_stack += 1;
        let outcome = self.query_from_source(statement, parameter, key, graph);
        self.query_stack -= 1;

        if self.query_stack > 0 {
            return outcome;
        }
        let outcome = outcome.and_then(|lists| {
            self.run_deferred_loads(graph)?;
            Ok(lists)
        });
        self.deferred_loads.clear();
        self.local_cache.clear();
        outcome
    }

    fn query_from_source(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: Option<&QueryParameter>,
        key: &CacheKey,
        graph: &mut ObjectGraph,
    ) -> Result<Vec<Vec<Slot>>> {
        tracing::debug!(statement = %statement.id(), depth = self.query_stack, "running statement");
        self.local_cache.insert(key.clone(), CacheEntry::InFlight);
        self.executions += 1;
        let mut results = match self.source.open(statement, parameter) {
            Ok(results) => results,
            Err(e) => {
                self.local_cache.remove(key);
                return Err(e);
            }
        };

        let config = Arc::clone(&self.config);
        let mut handler = ResultSetHandler::new(config, Arc::clone(statement))
            .with_graph(mem::take(graph))
            .with_executor(&mut *self);
        let outcome = handler.handle_result_sets(results.as_mut());
        *graph = handler.into_graph();

        match outcome {
            Ok(lists) => {
                self.local_cache
                    .insert(key.clone(), CacheEntry::Ready(lists.clone()));
                Ok(lists)
            }
            Err(e) => {
                self.local_cache.remove(key);
                Err(e)
            }
        }
    }

    fn run_deferred_loads(&mut self, graph: &mut ObjectGraph) -> Result<()> {
        for load in mem::take(&mut self.deferred_loads) {
            match self.local_cache.get(&load.key) {
                Some(CacheEntry::Ready(lists)) => {
                    let lists = lists.clone();
                    self.apply_load(graph, &load, lists)?;
                }
                _ => tracing::warn!(property = %load.property, "deferred load has no completed result"),
            }
        }
        Ok(())
    }

    fn apply_load(&self, graph: &mut ObjectGraph, load: &DeferredLoad, lists: Vec<Vec<Slot>>) -> Result<()> {
        let rows = collapse_single_result_list(graph, &self.config, lists)?;
        let value = extract_result(graph, &self.config, rows, &load.target)?;
        let meta = MetaObject::for_object(graph, self.config.types(), load.object)?;
        meta.set_value(graph, self.config.object_factory(), &load.property, value)
    }
}

impl<S: StatementSource> SubQueryExecutor for InMemoryExecutor<S> {
    fn create_cache_key(&self, statement: &MappedStatement, parameter: &QueryParameter) -> Result<CacheKey> {
        let mut key = CacheKey::new();
        key.update(statement.id())?;
        match parameter {
            QueryParameter::Value(value) => key.update(value)?,
            QueryParameter::Composite(values) => {
                for (name, value) in values {
                    key.update(name.as_str())?;
                    key.update(value)?;
                }
            }
        }
        Ok(key)
    }

    fn is_cached(&self, _statement: &MappedStatement, key: &CacheKey) -> bool {
        self.local_cache.contains_key(key)
    }

    fn defer_load(
        &mut self,
        graph: &mut ObjectGraph,
        _statement: &Arc<MappedStatement>,
        object: ObjectId,
        property: &str,
        key: CacheKey,
        target: TargetType,
    ) -> Result<()> {
        let load = DeferredLoad {
            object,
            property: property.to_string(),
            key,
            target,
        };
        match self.local_cache.get(&load.key) {
            Some(CacheEntry::Ready(lists)) => {
                let lists = lists.clone();
                self.apply_load(graph, &load, lists)
            }
            _ => {
                self.deferred_loads.push(load);
                Ok(())
            }
        }
    }

    fn query(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &QueryParameter,
        key: &CacheKey,
        graph: &mut ObjectGraph,
    ) -> Result<Vec<Slot>> {
        let lists = self.execute(statement, Some(parameter), key, graph)?;
        collapse_single_result_list(graph, &self.config, lists)
    }
}

impl<S: StatementSource> LazyLoader for InMemoryExecutor<S> {
    fn load(&mut self, graph: &mut ObjectGraph, load: &PendingLoad) -> Result<Slot> {
        tracing::debug!(query = %load.query_id, "running lazy load");
        let statement = self.config.statement(&load.query_id)?;
        let rows = self.query(&statement, &load.parameter, &load.key, graph)?;
        let config = Arc::clone(&self.config);
        extract_result(graph, &config, rows, &load.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resultmap_core::{MemoryCursor, MemoryStatement, Value};
    use resultmap_mapping::{ResultMap, ResultMapping, Settings};

    fn config(settings: Settings) -> Arc<Configuration> {
        let mut config = Configuration::new(settings);
        config
            .add_result_map(
                ResultMap::builder("Blog", TargetType::Map)
                    .mapping(ResultMapping::id("id", "id"))
                    .mapping(ResultMapping::column("title", "title"))
                    .mapping(ResultMapping::nested_query("author", "author_id", "selectAuthor"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        config
            .add_result_map(
                ResultMap::builder("Author", TargetType::Map)
                    .mapping(ResultMapping::id("id", "id"))
                    .mapping(ResultMapping::column("name", "name"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        config
            .add_statement(MappedStatement::new("selectBlogs").result_map("Blog"))
            .unwrap();
        config
            .add_statement(MappedStatement::new("selectAuthor").result_map("Author"))
            .unwrap();
        Arc::new(config)
    }

    fn source(statement: &MappedStatement, parameter: Option<&QueryParameter>) -> Result<Box<dyn StatementResults>> {
        let cursor = match statement.id() {
            "selectBlogs" => MemoryCursor::new(
                ["id", "title", "author_id"],
                vec![
                    vec![Value::BigInt(1), Value::Text("first".into()), Value::BigInt(7)],
                    vec![Value::BigInt(2), Value::Text("second".into()), Value::BigInt(7)],
                    vec![Value::BigInt(3), Value::Text("third".into()), Value::Null],
                ],
            ),
            "selectAuthor" => {
                let Some(QueryParameter::Value(id)) = parameter else {
                    return Err(Error::Custom("author id expected".to_string()));
                };
                MemoryCursor::new(["id", "name"], vec![vec![id.clone(), Value::Text("ann".into())]])
            }
            other => return Err(Error::Custom(format!("unknown statement {}", other))),
        };
        Ok(Box::new(MemoryStatement::new([cursor])))
    }

    #[test]
    fn test_eager_sub_query_runs_once_per_parameter() {
        let mut executor = InMemoryExecutor::new(config(Settings::new()), source);
        let result = executor.select("selectBlogs", None).unwrap();
        assert_eq!(
            result.to_json(),
            serde_json::json!([
                {"id": 1, "title": "first", "author": {"id": 7, "name": "ann"}},
                {"id": 2, "title": "second", "author": {"id": 7, "name": "ann"}},
                {"id": 3, "title": "third"}
            ])
        );
        // selectBlogs once, selectAuthor(7) once; the second blog reuses it
        assert_eq!(executor.executions(), 2);
    }

    #[test]
    fn test_lazy_sub_query_waits_for_read() {
        let mut executor = InMemoryExecutor::new(config(Settings::new().lazy_loading(true)), source);
        let mut result = executor.select("selectBlogs", None).unwrap();
        assert_eq!(executor.executions(), 1);

        let first = result.first()[0].as_object().unwrap();
        assert!(result.graph().get(first).get("author").unwrap().is_pending());

        let policy = executor.configuration().lazy_load_policy();
        let author = result
            .graph_mut()
            .resolve_property(first, "author", &policy, &mut executor)
            .unwrap()
            .unwrap();
        assert_eq!(result.graph().to_json(&author), serde_json::json!({"id": 7, "name": "ann"}));
        assert_eq!(executor.executions(), 2);
    }

    #[test]
    fn test_cache_is_cleared_after_outermost_query() {
        let mut executor = InMemoryExecutor::new(config(Settings::new()), source);
        executor.select("selectBlogs", None).unwrap();
        executor.select("selectBlogs", None).unwrap();
        assert_eq!(executor.executions(), 4);
    }

    #[test]
    fn test_source_failure_propagates() {
        fn failing(_: &MappedStatement, _: Option<&QueryParameter>) -> Result<Box<dyn StatementResults>> {
            Err(Error::Custom("connection lost".to_string()))
        }
        let mut executor = InMemoryExecutor::new(config(Settings::new()), failing);
        let err = executor.select("selectBlogs", None).unwrap_err();
        assert!(err.to_string().contains("connection lost"));
        assert!(executor.local_cache.is_empty());
    }

    #[test]
    fn test_cache_key_includes_parameter() {
        let executor = InMemoryExecutor::new(config(Settings::new()), source);
        let statement = MappedStatement::new("selectAuthor");
        let seven = executor
            .create_cache_key(&statement, &QueryParameter::Value(Value::BigInt(7)))
            .unwrap();
        let eight = executor
            .create_cache_key(&statement, &QueryParameter::Value(Value::BigInt(8)))
            .unwrap();
        assert_ne!(seven, eight);
        assert_eq!(
            seven,
            executor
                .create_cache_key(&statement, &QueryParameter::Value(Value::BigInt(7)))
                .unwrap()
        );
    }
}
