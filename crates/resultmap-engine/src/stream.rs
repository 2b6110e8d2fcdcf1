//! Pull-based streaming of top-level objects.

use crate::column_set::ResultSetWrapper;
use crate::context::{ResultContext, ResultHandler, RowBounds, SinkControl};
use crate::handler::{ResultSetHandler, RowTarget};
use resultmap_core::error::Result;
use resultmap_core::{ObjectGraph, Slot};
use resultmap_mapping::ResultMap;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Lifecycle of an [`ObjectCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    /// Nothing fetched yet
    Created,
    Open,
    /// Closed before every object was read
    Closed,
    /// Every object (within the row bounds) was read
    Consumed,
}

/// Takes the first non-null object handed to it and asks to stop.
#[derive(Default)]
struct SingleObjectHandler {
    object: Option<Slot>,
}

impl ResultHandler for SingleObjectHandler {
    fn handle_result(&mut self, context: &ResultContext<'_>) -> SinkControl {
        let object = context.result_object();
        if object.is_null() {
            return SinkControl::Continue;
        }
        self.object = Some(object.clone());
        SinkControl::Stop
    }
}

/// Iterator over the objects of one result set, built one at a time.
///
/// Objects are complete when yielded: with a result-ordered nested result
/// map, an object is only handed out once a row with a different identity
/// (or the end of the result set) was seen. Row bounds count objects, not
/// rows.
pub struct ObjectCursor<'e> {
    handler: ResultSetHandler<'e>,
    rsw: Option<ResultSetWrapper<'static>>,
    result_map: Arc<ResultMap>,
    row_bounds: RowBounds,
    fetched_count: usize,
    status: CursorStatus,
}

impl<'e> ObjectCursor<'e> {
    pub(crate) fn new(
        handler: ResultSetHandler<'e>,
        rsw: Option<ResultSetWrapper<'static>>,
        result_map: Arc<ResultMap>,
    ) -> Self {
        let row_bounds = handler.row_bounds;
        Self {
            handler,
            rsw,
            result_map,
            row_bounds,
            fetched_count: 0,
            status: CursorStatus::Created,
        }
    }

    pub fn status(&self) -> CursorStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == CursorStatus::Open
    }

    pub fn is_consumed(&self) -> bool {
        self.status == CursorStatus::Consumed
    }

    /// Number of objects fetched so far, including those skipped by the offset.
    pub fn fetched_count(&self) -> usize {
        self.fetched_count
    }

    /// The graph the yielded objects live in.
    pub fn graph(&self) -> &ObjectGraph {
        self.handler.graph()
    }

    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        self.handler.graph_mut()
    }

    pub fn to_json(&self, object: &Slot) -> serde_json::Value {
        self.handler.graph().to_json(object)
    }

    /// Release the underlying result set.
    pub fn close(&mut self) {
        if let Some(rsw) = self.rsw.as_mut() {
            rsw.close();
        }
        if self.status != CursorStatus::Consumed {
            self.status = CursorStatus::Closed;
        }
    }

    /// The next object within the row bounds, or `None` at the end.
    pub fn fetch_next(&mut self) -> Result<Option<Slot>> {
        let mut next = self.fetch_next_object()?;
        while next.is_some() && self.fetched_count <= self.row_bounds.offset {
            next = self.fetch_next_object()?;
        }
        Ok(next)
    }

    fn fetch_next_object(&mut self) -> Result<Option<Slot>> {
        if matches!(self.status, CursorStatus::Closed | CursorStatus::Consumed) {
            return Ok(None);
        }
        let Some(rsw) = self.rsw.as_mut() else {
            self.status = CursorStatus::Consumed;
            return Ok(None);
        };
        self.status = CursorStatus::Open;

        let mut sink = SingleObjectHandler::default();
        let outcome = if rsw.is_closed() {
            Ok(())
        } else {
            let mut target = RowTarget::Sink(&mut sink);
            self.handler
                .handle_row_values(rsw, &self.result_map, &mut target, RowBounds::default())
        };
        if let Err(e) = outcome {
            self.close();
            return Err(e);
        }

        let next = sink.object;
        if next.is_some() {
            self.fetched_count += 1;
        }
        if next.is_none() || self.fetched_count == self.row_bounds.offset.saturating_add(self.row_bounds.limit) {
            self.close();
            self.status = CursorStatus::Consumed;
            tracing::trace!(fetched = self.fetched_count, "cursor consumed");
        }
        Ok(next)
    }

    /// Yield typed values instead of graph slots.
    pub fn deserialize<T: DeserializeOwned>(self) -> TypedCursor<'e, T> {
        TypedCursor {
            inner: self,
            _marker: PhantomData,
        }
    }

    pub fn into_graph(mut self) -> ObjectGraph {
        self.close();
        let handler = self.handler;
        handler.into_graph()
    }
}

impl Iterator for ObjectCursor<'_> {
    type Item = Result<Slot>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_next().transpose()
    }
}

/// An [`ObjectCursor`] deserializing each object into `T`.
pub struct TypedCursor<'e, T> {
    inner: ObjectCursor<'e>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for TypedCursor<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.fetch_next() {
            Ok(Some(object)) => Some(self.inner.graph().deserialize(&object)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resultmap_core::{MemoryCursor, MemoryStatement, TargetType, Value};
    use resultmap_mapping::{Configuration, MappedStatement, ResultMapping};
    use serde::Deserialize;

    fn config() -> Arc<Configuration> {
        let mut config = Configuration::default();
        config
            .add_result_map(
                ResultMap::builder("Item", TargetType::Map)
                    .mapping(ResultMapping::id("id", "id"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        config
            .add_result_map(
                ResultMap::builder("Parent", TargetType::Map)
                    .mapping(ResultMapping::id("id", "pid"))
                    .mapping(ResultMapping::collection("children", "Child").column_prefix("c_"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        config
            .add_result_map(
                ResultMap::builder("Child", TargetType::Map)
                    .mapping(ResultMapping::id("id", "id"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(config)
    }

    fn items(n: i64) -> MemoryStatement {
        MemoryStatement::new([MemoryCursor::new(
            ["id"],
            (0..n).map(|i| vec![Value::BigInt(i)]).collect(),
        )])
    }

    #[test]
    fn test_streams_every_object() {
        let statement = Arc::new(MappedStatement::new("items").result_map("Item"));
        let handler = ResultSetHandler::new(config(), statement);
        let mut cursor = handler.into_cursor(&mut items(3)).unwrap();
        assert_eq!(cursor.status(), CursorStatus::Created);

        let first = cursor.next().unwrap().unwrap();
        assert!(cursor.is_open());
        assert_eq!(cursor.to_json(&first), serde_json::json!({"id": 0}));
        assert_eq!(cursor.by_ref().count(), 2);
        assert!(cursor.is_consumed());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_row_bounds_count_objects() {
        let statement = Arc::new(MappedStatement::new("items").result_map("Item"));
        let handler = ResultSetHandler::new(config(), statement).with_row_bounds(RowBounds::new(2, 3));
        let cursor = handler.into_cursor(&mut items(10)).unwrap();

        #[derive(Debug, Deserialize, PartialEq)]
        struct Item {
            id: i64,
        }
        let ids: Vec<i64> = cursor.deserialize::<Item>().map(|item| item.unwrap().id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_ordered_nested_objects_are_complete() {
        let statement = Arc::new(MappedStatement::new("parents").result_map("Parent").ordered());
        let handler = ResultSetHandler::new(config(), statement);
        let mut results = MemoryStatement::new([MemoryCursor::new(
            ["pid", "c_id"],
            vec![
                vec![Value::BigInt(1), Value::BigInt(10)],
                vec![Value::BigInt(1), Value::BigInt(11)],
                vec![Value::BigInt(2), Value::BigInt(20)],
            ],
        )]);
        let mut cursor = handler.into_cursor(&mut results).unwrap();
        let parents: Vec<serde_json::Value> = cursor
            .by_ref()
            .map(|p| p.unwrap())
            .collect::<Vec<_>>()
            .iter()
            .map(|p| cursor.to_json(p))
            .collect();
        assert_eq!(
            parents,
            vec![
                serde_json::json!({"id": 1, "children": [{"id": 10}, {"id": 11}]}),
                serde_json::json!({"id": 2, "children": [{"id": 20}]}),
            ]
        );
    }

    #[test]
    fn test_close_before_end() {
        let statement = Arc::new(MappedStatement::new("items").result_map("Item"));
        let handler = ResultSetHandler::new(config(), statement);
        let mut cursor = handler.into_cursor(&mut items(5)).unwrap();
        cursor.next().unwrap().unwrap();
        cursor.close();
        assert_eq!(cursor.status(), CursorStatus::Closed);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_empty_statement_yields_nothing() {
        let statement = Arc::new(MappedStatement::new("items").result_map("Item"));
        let handler = ResultSetHandler::new(config(), statement);
        let mut cursor = handler.into_cursor(&mut MemoryStatement::new([])).unwrap();
        assert!(cursor.next().is_none());
        assert!(cursor.is_consumed());
    }
}
