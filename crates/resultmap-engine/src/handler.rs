//! Statement-level result set handling.
//!
//! One [`ResultSetHandler`] serves exactly one statement execution. It owns
//! the object graph being built and every per-execution table: the nested
//! object memo, the ancestor map, pending relations for auxiliary result sets
//! and the automapping caches.

use crate::column_set::ResultSetWrapper;
use crate::context::{DefaultResultHandler, DeliveryState, ResultContext, ResultHandler, RowBounds, SinkControl};
use crate::deferred::PendingRelation;
use crate::automap::UnmappedColumnAutoMapping;
use crate::executor::SubQueryExecutor;
use crate::stream::ObjectCursor;
use resultmap_core::error::{Error, Result};
use resultmap_core::{CacheKey, ObjectGraph, ResultCursor, Slot, StatementResults};
use resultmap_mapping::{Configuration, MappedStatement, ResultMap, ResultMapping};
use std::collections::HashMap;
use std::sync::Arc;

/// Where the value of each row goes.
pub(crate) enum RowTarget<'s> {
    /// Deliver top-level objects to a sink
    Sink(&'s mut dyn ResultHandler),
    /// Link rows of an auxiliary result set into their pending parents
    Parent(ResultMapping),
}

/// Materializes the result sets of one statement execution.
pub struct ResultSetHandler<'e> {
    pub(crate) config: Arc<Configuration>,
    pub(crate) statement: Arc<MappedStatement>,
    pub(crate) row_bounds: RowBounds,
    pub(crate) executor: Option<&'e mut dyn SubQueryExecutor>,
    pub(crate) graph: ObjectGraph,

    pub(crate) nested_result_objects: HashMap<CacheKey, Slot>,
    pub(crate) ancestor_objects: HashMap<String, Slot>,
    pub(crate) previous_row_value: Option<Slot>,

    pub(crate) next_result_maps: HashMap<String, ResultMapping>,
    pub(crate) pending_relations: HashMap<CacheKey, Vec<PendingRelation>>,

    pub(crate) auto_mappings_cache: HashMap<String, Arc<Vec<UnmappedColumnAutoMapping>>>,
    pub(crate) constructor_auto_mapping_columns: HashMap<String, Vec<String>>,

    /// Set when the last created result object came from a constructor with arguments
    pub(crate) use_constructor_mappings: bool,
}

impl<'e> ResultSetHandler<'e> {
    pub fn new(config: Arc<Configuration>, statement: Arc<MappedStatement>) -> Self {
        Self {
            config,
            statement,
            row_bounds: RowBounds::default(),
            executor: None,
            graph: ObjectGraph::new(),
            nested_result_objects: HashMap::new(),
            ancestor_objects: HashMap::new(),
            previous_row_value: None,
            next_result_maps: HashMap::new(),
            pending_relations: HashMap::new(),
            auto_mappings_cache: HashMap::new(),
            constructor_auto_mapping_columns: HashMap::new(),
            use_constructor_mappings: false,
        }
    }

    /// Run nested queries through `executor`.
    pub fn with_executor(mut self, executor: &'e mut dyn SubQueryExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Build into an existing graph (sub-queries share the caller's graph).
    pub fn with_graph(mut self, graph: ObjectGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Row bounds applied by [`handle_result_sets`](Self::handle_result_sets).
    pub fn with_row_bounds(mut self, row_bounds: RowBounds) -> Self {
        self.row_bounds = row_bounds;
        self
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn statement(&self) -> &Arc<MappedStatement> {
        &self.statement
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    pub fn into_graph(self) -> ObjectGraph {
        self.graph
    }

    /// Materialize every result set of a statement.
    ///
    /// The first result sets are mapped with the statement's result maps, one
    /// each; the remaining ones are matched by name against auxiliary result
    /// set mappings and linked into their parents. Returns one list per
    /// result map.
    #[tracing::instrument(level = "debug", skip_all, fields(statement = %self.statement.id()))]
    pub fn handle_result_sets(&mut self, results: &mut dyn StatementResults) -> Result<Vec<Vec<Slot>>> {
        let statement = Arc::clone(&self.statement);
        let result_map_ids = statement.result_map_ids();
        let mut multiple_results = Vec::new();
        let mut result_set_count = 0;

        let mut rsw = self.next_result_set(results)?;
        self.validate_result_maps_count(rsw.is_some(), result_map_ids.len())?;
        while result_set_count < result_map_ids.len() {
            let Some(mut current) = rsw.take() else {
                break;
            };
            let result_map = self.config.result_map(&result_map_ids[result_set_count])?;
            let mut sink = DefaultResultHandler::new();
            let outcome = {
                let mut target = RowTarget::Sink(&mut sink);
                self.handle_row_values(&mut current, &result_map, &mut target, self.row_bounds)
            };
            current.close();
            outcome?;
            multiple_results.push(sink.into_results());
            rsw = self.next_result_set(results)?;
            self.clean_up_after_handling_result_set();
            result_set_count += 1;
        }

        let result_sets = statement.result_set_names();
        while result_set_count < result_sets.len() {
            let Some(mut current) = rsw.take() else {
                break;
            };
            let parent_mapping = self.next_result_maps.get(&result_sets[result_set_count]).cloned();
            if let Some(parent_mapping) = parent_mapping {
                let nested_id = parent_mapping.nested_result_map_id().ok_or_else(|| {
                    Error::config(format!(
                        "result set '{}' is linked by a mapping without a nested result map",
                        result_sets[result_set_count]
                    ))
                })?;
                let result_map = self.config.result_map(nested_id)?;
                tracing::debug!(
                    result_set = %result_sets[result_set_count],
                    result_map = result_map.id(),
                    "linking auxiliary result set"
                );
                let mut target = RowTarget::Parent(parent_mapping);
                let outcome =
                    self.handle_row_values(&mut current, &result_map, &mut target, RowBounds::default());
                current.close();
                outcome?;
            } else {
                tracing::debug!(
                    result_set = %result_sets[result_set_count],
                    "no mapping references result set, skipping"
                );
            }
            rsw = self.next_result_set(results)?;
            self.clean_up_after_handling_result_set();
            result_set_count += 1;
        }
        Ok(multiple_results)
    }

    /// Materialize one cursor with `result_map`, delivering to `sink`.
    ///
    /// The cursor is closed when this returns, successfully or not.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(statement = %self.statement.id(), result_map = %result_map.id())
    )]
    pub fn materialize(
        &mut self,
        cursor: &mut dyn ResultCursor,
        result_map: &Arc<ResultMap>,
        row_bounds: RowBounds,
        sink: &mut dyn ResultHandler,
    ) -> Result<()> {
        let mut rsw = ResultSetWrapper::new(Box::new(cursor), Arc::clone(&self.config));
        let outcome = {
            let mut target = RowTarget::Sink(sink);
            self.handle_row_values(&mut rsw, result_map, &mut target, row_bounds)
        };
        rsw.close();
        self.clean_up_after_handling_result_set();
        outcome
    }

    /// Stream the objects of the first result set one at a time.
    ///
    /// The statement must name exactly one result map.
    pub fn into_cursor(self, results: &mut dyn StatementResults) -> Result<ObjectCursor<'e>> {
        let rsw = self.next_result_set(results)?;
        let result_map_ids = self.statement.result_map_ids();
        self.validate_result_maps_count(rsw.is_some(), result_map_ids.len())?;
        if result_map_ids.len() != 1 {
            return Err(Error::config(
                "cursor results cannot be mapped to multiple result maps",
            ));
        }
        let result_map = self.config.result_map(&result_map_ids[0])?;
        Ok(ObjectCursor::new(self, rsw, result_map))
    }

    fn next_result_set(
        &self,
        results: &mut dyn StatementResults,
    ) -> Result<Option<ResultSetWrapper<'static>>> {
        Ok(results
            .next_result_set()?
            .map(|cursor| ResultSetWrapper::new(cursor, Arc::clone(&self.config))))
    }

    fn validate_result_maps_count(&self, has_result_set: bool, result_map_count: usize) -> Result<()> {
        if has_result_set && result_map_count < 1 {
            return Err(Error::config(format!(
                "a query was run and no result maps were found for statement '{}'",
                self.statement.id()
            )));
        }
        Ok(())
    }

    pub(crate) fn clean_up_after_handling_result_set(&mut self) {
        if !self.nested_result_objects.is_empty() {
            tracing::debug!(
                entries = self.nested_result_objects.len(),
                "clearing nested object memo"
            );
        }
        self.nested_result_objects.clear();
        self.previous_row_value = None;
    }

    /// Map every row of `rsw` with `result_map`.
    pub(crate) fn handle_row_values(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        target: &mut RowTarget<'_>,
        row_bounds: RowBounds,
    ) -> Result<()> {
        if result_map.has_nested_result_maps() {
            self.ensure_no_row_bounds(row_bounds)?;
            self.check_result_handler(target)?;
            self.handle_row_values_for_nested_result_map(rsw, result_map, target, row_bounds)
        } else {
            self.handle_row_values_for_simple_result_map(rsw, result_map, target, row_bounds)
        }
    }

    fn ensure_no_row_bounds(&self, row_bounds: RowBounds) -> Result<()> {
        if self.config.settings().safe_row_bounds_enabled && row_bounds.is_bounded() {
            return Err(Error::config(
                "mapped statements with nested result mappings cannot be safely constrained by row bounds; \
                 disable safe_row_bounds_enabled to bypass this check",
            ));
        }
        Ok(())
    }

    fn check_result_handler(&self, target: &RowTarget<'_>) -> Result<()> {
        let custom = match target {
            RowTarget::Sink(handler) => !handler.is_default_handler(),
            RowTarget::Parent(_) => false,
        };
        if custom
            && self.config.settings().safe_result_handler_enabled
            && !self.statement.is_result_ordered()
        {
            return Err(Error::config(
                "mapped statements with nested result mappings cannot be safely used with a custom result handler; \
                 disable safe_result_handler_enabled or mark the statement as result ordered",
            ));
        }
        Ok(())
    }

    /// Skip the rows before `row_bounds.offset`.
    pub(crate) fn skip_rows(rsw: &mut ResultSetWrapper<'_>, row_bounds: RowBounds) -> Result<()> {
        if rsw.kind() == resultmap_core::CursorKind::Scrollable {
            if row_bounds.offset != RowBounds::NO_ROW_OFFSET {
                rsw.absolute(row_bounds.offset)?;
            }
        } else {
            for _ in 0..row_bounds.offset {
                if !rsw.advance()? {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Deliver a finished row value to the sink or link it to its parents.
    pub(crate) fn store_object(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        target: &mut RowTarget<'_>,
        state: &mut DeliveryState,
        row_value: &Slot,
    ) -> Result<()> {
        match target {
            RowTarget::Parent(parent_mapping) => self.link_to_parents(rsw, parent_mapping, row_value),
            RowTarget::Sink(handler) => {
                state.count += 1;
                let context = ResultContext::new(&self.graph, row_value, state.count);
                if handler.handle_result(&context) == SinkControl::Stop {
                    tracing::trace!(count = state.count, "sink requested stop");
                    state.stopped = true;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resultmap_core::{MemoryCursor, MemoryStatement, TargetType, Value};

    fn config() -> Arc<Configuration> {
        let mut config = Configuration::default();
        for id in ["Left", "Right"] {
            config
                .add_result_map(
                    ResultMap::builder(id, TargetType::Map)
                        .mapping(ResultMapping::id("id", "id"))
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        Arc::new(config)
    }

    fn ids(ids: &[i64]) -> MemoryCursor {
        MemoryCursor::new(["id"], ids.iter().map(|&i| vec![Value::BigInt(i)]).collect())
    }

    #[test]
    fn test_one_list_per_result_map() {
        let statement = MappedStatement::new("both").result_map("Left").result_map("Right");
        let mut handler = ResultSetHandler::new(config(), Arc::new(statement));
        let lists = handler
            .handle_result_sets(&mut MemoryStatement::new([ids(&[1, 2]), ids(&[3])]))
            .unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].len(), 2);
        assert_eq!(handler.graph().to_json(&lists[1][0]), serde_json::json!({"id": 3}));
    }

    #[test]
    fn test_fewer_result_sets_than_maps() {
        let statement = MappedStatement::new("both").result_map("Left").result_map("Right");
        let mut handler = ResultSetHandler::new(config(), Arc::new(statement));
        let lists = handler
            .handle_result_sets(&mut MemoryStatement::new([ids(&[1])]))
            .unwrap();
        assert_eq!(lists.len(), 1);
    }

    #[test]
    fn test_result_set_without_result_map_is_rejected() {
        let mut handler = ResultSetHandler::new(config(), Arc::new(MappedStatement::new("bare")));
        let err = handler
            .handle_result_sets(&mut MemoryStatement::new([ids(&[1])]))
            .unwrap_err();
        assert!(err.is_config_error());

        // No result set at all is fine
        let mut handler = ResultSetHandler::new(config(), Arc::new(MappedStatement::new("bare")));
        assert!(handler.handle_result_sets(&mut MemoryStatement::new([])).unwrap().is_empty());
    }

    #[test]
    fn test_unreferenced_auxiliary_result_set_is_skipped() {
        let statement = MappedStatement::new("extra")
            .result_map("Left")
            .result_sets(["main", "unused"]);
        let mut handler = ResultSetHandler::new(config(), Arc::new(statement));
        let lists = handler
            .handle_result_sets(&mut MemoryStatement::new([ids(&[1]), ids(&[9, 9])]))
            .unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].len(), 1);
    }

    #[test]
    fn test_cursor_requires_a_single_result_map() {
        let statement = MappedStatement::new("both").result_map("Left").result_map("Right");
        let handler = ResultSetHandler::new(config(), Arc::new(statement));
        let err = handler
            .into_cursor(&mut MemoryStatement::new([ids(&[1])]))
            .err()
            .unwrap();
        assert!(err.is_config_error());
    }

    struct StopAtFirst {
        seen: Vec<Slot>,
    }

    impl ResultHandler for StopAtFirst {
        fn handle_result(&mut self, context: &ResultContext<'_>) -> SinkControl {
            self.seen.push(context.result_object().clone());
            SinkControl::Stop
        }
    }

    #[test]
    fn test_stopped_ordered_parent_does_not_reach_the_next_cursor() {
        let mut config = Configuration::default();
        config
            .add_result_map(
                ResultMap::builder("Parent", TargetType::Map)
                    .mapping(ResultMapping::id("id", "pid"))
                    .mapping(ResultMapping::collection("children", "Left").column_prefix("c_"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        config
            .add_result_map(
                ResultMap::builder("Left", TargetType::Map)
                    .mapping(ResultMapping::id("id", "id"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let config = Arc::new(config);
        let statement = MappedStatement::new("parents").result_map("Parent").ordered();
        let mut handler = ResultSetHandler::new(Arc::clone(&config), Arc::new(statement));
        let map = config.result_map("Parent").unwrap();
        let rows = |pairs: &[(i64, i64)]| {
            MemoryCursor::new(
                ["pid", "c_id"],
                pairs
                    .iter()
                    .map(|&(p, c)| vec![Value::BigInt(p), Value::BigInt(c)])
                    .collect(),
            )
        };

        let mut first = StopAtFirst { seen: Vec::new() };
        handler
            .materialize(&mut rows(&[(1, 10), (2, 20)]), &map, RowBounds::default(), &mut first)
            .unwrap();
        assert_eq!(first.seen.len(), 1);
        assert!(handler.previous_row_value.is_none());

        let mut second = DefaultResultHandler::new();
        handler
            .materialize(&mut rows(&[(7, 70)]), &map, RowBounds::default(), &mut second)
            .unwrap();
        let delivered: Vec<serde_json::Value> =
            second.results().iter().map(|slot| handler.graph().to_json(slot)).collect();
        assert_eq!(delivered, vec![serde_json::json!({"id": 7, "children": [{"id": 70}]})]);
    }

    #[test]
    fn test_memo_is_empty_after_each_result_set() {
        let statement = MappedStatement::new("one").result_map("Left");
        let mut handler = ResultSetHandler::new(config(), Arc::new(statement));
        handler
            .handle_result_sets(&mut MemoryStatement::new([ids(&[1, 2])]))
            .unwrap();
        assert!(handler.nested_result_objects.is_empty());
        assert!(handler.ancestor_objects.is_empty());
    }
}
