//! Row bounds, row sinks and materialized results.

use resultmap_core::error::Result;
use resultmap_core::{ObjectGraph, Slot};
use serde::de::DeserializeOwned;

/// Offset/limit window over the rows of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = usize::MAX;

    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Does this window restrict anything?
    pub const fn is_bounded(&self) -> bool {
        self.offset > Self::NO_ROW_OFFSET || self.limit < Self::NO_ROW_LIMIT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::new(Self::NO_ROW_OFFSET, Self::NO_ROW_LIMIT)
    }
}

/// What a sink wants after receiving an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    /// Stop advancing the cursor
    Stop,
}

/// One delivered row value, as seen by a [`ResultHandler`].
#[derive(Debug, Clone, Copy)]
pub struct ResultContext<'a> {
    graph: &'a ObjectGraph,
    object: &'a Slot,
    count: usize,
}

impl<'a> ResultContext<'a> {
    pub(crate) fn new(graph: &'a ObjectGraph, object: &'a Slot, count: usize) -> Self {
        Self {
            graph,
            object,
            count,
        }
    }

    pub fn graph(&self) -> &'a ObjectGraph {
        self.graph
    }

    /// The delivered object; a null slot when the row mapped to nothing.
    pub fn result_object(&self) -> &'a Slot {
        self.object
    }

    /// Number of objects delivered so far, this one included.
    pub fn result_count(&self) -> usize {
        self.count
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.graph.to_json(self.object)
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        self.graph.deserialize(self.object)
    }
}

/// Receives completed top-level objects.
pub trait ResultHandler {
    fn handle_result(&mut self, context: &ResultContext<'_>) -> SinkControl;

    /// The collecting handler used when the caller supplies none.
    ///
    /// Only non-default handlers are subject to the unordered nested
    /// result check.
    fn is_default_handler(&self) -> bool {
        false
    }
}

impl<F> ResultHandler for F
where
    F: FnMut(&ResultContext<'_>) -> SinkControl,
{
    fn handle_result(&mut self, context: &ResultContext<'_>) -> SinkControl {
        self(context)
    }
}

/// Collects every non-null object in delivery order.
#[derive(Debug, Default, Clone)]
pub struct DefaultResultHandler {
    results: Vec<Slot>,
}

impl DefaultResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[Slot] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Slot> {
        self.results
    }
}

impl ResultHandler for DefaultResultHandler {
    fn handle_result(&mut self, context: &ResultContext<'_>) -> SinkControl {
        let object = context.result_object();
        if !object.is_null() {
            self.results.push(object.clone());
        }
        SinkControl::Continue
    }

    fn is_default_handler(&self) -> bool {
        true
    }
}

/// Per-call delivery bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DeliveryState {
    pub(crate) count: usize,
    pub(crate) stopped: bool,
}

impl DeliveryState {
    pub(crate) fn should_process_more_rows(&self, bounds: RowBounds) -> bool {
        !self.stopped && self.count < bounds.limit
    }
}

/// The objects of one statement execution and the graph that owns them.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    graph: ObjectGraph,
    results: Vec<Vec<Slot>>,
}

impl Materialized {
    pub fn new(graph: ObjectGraph, results: Vec<Vec<Slot>>) -> Self {
        Self { graph, results }
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    /// One list per result map of the statement.
    pub fn results(&self) -> &[Vec<Slot>] {
        &self.results
    }

    /// The objects of the first result map.
    pub fn first(&self) -> &[Slot] {
        self.results.first().map_or(&[], Vec::as_slice)
    }

    /// The first result map's objects as a JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.first().iter().map(|s| self.graph.to_json(s)).collect())
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.first()
            .iter()
            .map(|s| self.graph.deserialize(s))
            .collect()
    }

    pub fn into_parts(self) -> (ObjectGraph, Vec<Vec<Slot>>) {
        (self.graph, self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resultmap_core::{TargetType, Value};

    #[test]
    fn test_row_bounds() {
        assert!(!RowBounds::default().is_bounded());
        assert!(RowBounds::new(5, 10).is_bounded());
        assert!(RowBounds::new(0, 10).is_bounded());
    }

    #[test]
    fn test_default_handler_skips_nulls() {
        let graph = ObjectGraph::new();
        let mut handler = DefaultResultHandler::new();
        let one = Slot::Value(Value::Int(1));
        let none = Slot::null();
        assert_eq!(
            handler.handle_result(&ResultContext::new(&graph, &one, 1)),
            SinkControl::Continue
        );
        handler.handle_result(&ResultContext::new(&graph, &none, 2));
        assert_eq!(handler.results(), &[one]);
        assert!(handler.is_default_handler());
    }

    #[test]
    fn test_closure_handler() {
        let graph = ObjectGraph::new();
        let mut seen = Vec::new();
        let mut handler = |ctx: &ResultContext<'_>| {
            seen.push(ctx.result_count());
            SinkControl::Stop
        };
        let slot = Slot::null();
        assert_eq!(
            handler.handle_result(&ResultContext::new(&graph, &slot, 3)),
            SinkControl::Stop
        );
        assert!(!handler.is_default_handler());
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn test_delivery_state() {
        let mut state = DeliveryState::default();
        let bounds = RowBounds::new(0, 2);
        assert!(state.should_process_more_rows(bounds));
        state.count = 2;
        assert!(!state.should_process_more_rows(bounds));
        state.count = 0;
        state.stopped = true;
        assert!(!state.should_process_more_rows(bounds));
    }

    #[test]
    fn test_materialized_json() {
        let mut graph = ObjectGraph::new();
        let id = graph.new_map(TargetType::Map);
        graph.get_mut(id).set("k", Slot::Value(Value::Int(1)));
        let done = Materialized::new(graph, vec![vec![Slot::Object(id)]]);
        assert_eq!(done.to_json(), serde_json::json!([{"k": 1}]));
        assert_eq!(done.first().len(), 1);
    }
}
