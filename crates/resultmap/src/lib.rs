//! resultmap - materialize tabular query results into object graphs.
//!
//! Rows come in through cursors; result maps describe how columns become
//! properties, how joined rows group into parents and children, which rows
//! pick a more specific mapping, and which properties are filled by further
//! queries. The engine produces an arena [`ObjectGraph`] that can be walked,
//! rendered as JSON or deserialized into your own types.
//!
//! # Quick Start
//!
//! ```
//! use resultmap::prelude::*;
//! use std::sync::Arc;
//!
//! let mut config = Configuration::default();
//! config.add_result_map(
//!     ResultMap::builder("Parent", TargetType::Map)
//!         .mapping(ResultMapping::id("id", "pid"))
//!         .mapping(ResultMapping::column("name", "pname"))
//!         .mapping(ResultMapping::collection("children", "Child"))
//!         .build()?,
//! )?;
//! config.add_result_map(
//!     ResultMap::builder("Child", TargetType::Map)
//!         .mapping(ResultMapping::id("id", "cid"))
//!         .build()?,
//! )?;
//! config.add_statement(MappedStatement::new("selectParents").result_map("Parent"))?;
//!
//! let mut results = MemoryStatement::new([MemoryCursor::new(
//!     ["pid", "pname", "cid"],
//!     vec![
//!         vec![Value::BigInt(1), Value::Text("A".into()), Value::BigInt(10)],
//!         vec![Value::BigInt(1), Value::Text("A".into()), Value::BigInt(11)],
//!     ],
//! )]);
//! let parents = resultmap::handle_statement(&Arc::new(config), "selectParents", &mut results)?;
//! assert_eq!(
//!     parents.to_json(),
//!     serde_json::json!([{"id": 1, "name": "A", "children": [{"id": 10}, {"id": 11}]}])
//! );
//! # Ok::<(), resultmap::Error>(())
//! ```
//!
//! # Crates
//!
//! - `resultmap-core`: values, cursors, identity keys, converters, type
//!   descriptors and the object graph
//! - `resultmap-mapping`: result maps, statements and settings
//! - `resultmap-engine`: the result set handler, sub-query executor and
//!   object cursor

use std::sync::Arc;

pub use resultmap_core::{
    CacheKey, ColumnInfo, ConstructorDescriptor, ConverterRegistry, CursorKind,
    DefaultObjectFactory, Error, KeyPart, LazyLoadPolicy, LazyLoader, MemoryCursor,
    MemoryStatement, MetaObject, Object, ObjectFactory, ObjectGraph, ObjectId, PendingLoad,
    PropertyDescriptor, QueryParameter, Result, ResultCursor, Row, Shape, Slot, SqlType,
    StatementResults, TargetType, TypeDescriptor, TypeRegistry, Value, ValueConverter,
};
pub use resultmap_engine::{
    CursorStatus, DefaultResultHandler, InMemoryExecutor, Materialized, ObjectCursor,
    ResultContext, ResultHandler, ResultSetHandler, RowBounds, SinkControl, StatementSource,
    SubQueryExecutor, TypedCursor,
};
pub use resultmap_mapping::{
    AutoMappingBehavior, Configuration, Discriminator, FetchType, MappedStatement, ResultMap,
    ResultMapping, Settings, UnknownColumnBehavior,
};

/// Materialize every result set `results` produced for `statement_id`.
///
/// Statements whose result maps run nested sub-queries need an executor;
/// use [`InMemoryExecutor`] for those.
pub fn handle_statement(
    config: &Arc<Configuration>,
    statement_id: &str,
    results: &mut dyn StatementResults,
) -> Result<Materialized> {
    let statement = config.statement(statement_id)?;
    let mut handler = ResultSetHandler::new(Arc::clone(config), statement);
    let lists = handler.handle_result_sets(results)?;
    tracing::debug!(
        statement = statement_id,
        lists = lists.len(),
        objects = lists.iter().map(Vec::len).sum::<usize>(),
        "statement materialized"
    );
    Ok(Materialized::new(handler.into_graph(), lists))
}

pub mod prelude {
    pub use crate::{
        // Cursors and values
        CacheKey,
        // Mapping
        Configuration,
        ConstructorDescriptor,
        DefaultResultHandler,
        Discriminator,
        Error,
        InMemoryExecutor,
        MappedStatement,
        Materialized,
        MemoryCursor,
        MemoryStatement,
        ObjectCursor,
        ObjectGraph,
        QueryParameter,
        Result,
        ResultContext,
        ResultHandler,
        ResultMap,
        ResultMapping,
        // Engine
        ResultSetHandler,
        RowBounds,
        Settings,
        SinkControl,
        Slot,
        SqlType,
        TargetType,
        TypeDescriptor,
        Value,
        handle_statement,
    };
}
