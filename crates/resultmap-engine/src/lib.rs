//! Result set handling for resultmap.
//!
//! `resultmap-engine` turns tabular cursors into object graphs as described by
//! the result maps of a [`resultmap_mapping::Configuration`].
//!
//! # Role In The Architecture
//!
//! - **Simple pipeline**: one row, one object, with automapping and
//!   constructor mapping.
//! - **Nested pipeline**: joined rows grouped by row identity into object
//!   trees, with discriminators and self-references.
//! - **Deferred work**: nested sub-queries (eager, cached or lazy) and
//!   auxiliary result sets linked into their parents.
//! - **Delivery**: collected results, custom [`ResultHandler`] sinks or a
//!   pull-based [`ObjectCursor`].

mod automap;
pub mod column_set;
pub mod context;
mod deferred;
mod discriminator;
pub mod executor;
pub mod handler;
mod instantiate;
mod nested;
mod row_key;
mod simple;
pub mod stream;

pub use column_set::ResultSetWrapper;
pub use context::{
    DefaultResultHandler, Materialized, ResultContext, ResultHandler, RowBounds, SinkControl,
};
pub use executor::{InMemoryExecutor, StatementSource, SubQueryExecutor};
pub use handler::ResultSetHandler;
pub use stream::{CursorStatus, ObjectCursor, TypedCursor};
