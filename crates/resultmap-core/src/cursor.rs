//! Tabular cursors consumed by the materialization engine.
//!
//! A cursor is read exactly once, front to back. Scrollable cursors can also
//! be positioned absolutely, which the engine uses to skip an offset without
//! fetching the skipped rows.

use crate::error::{DriverError, DriverErrorKind, Error, Result};
use crate::row::{ColumnInfo, Row};
use crate::types::SqlType;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Positioning capability of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorKind {
    #[default]
    ForwardOnly,
    Scrollable,
}

/// One physical result set.
pub trait ResultCursor {
    /// Column metadata, stable for the cursor's lifetime.
    fn columns(&self) -> &Arc<ColumnInfo>;

    /// Advance to the next row. Returns `false` once past the last row.
    fn advance(&mut self) -> Result<bool>;

    /// The row the cursor is positioned on.
    fn current(&self) -> Option<&Row>;

    fn kind(&self) -> CursorKind {
        CursorKind::ForwardOnly
    }

    /// Position on the 1-based row `row`; `0` means before the first row.
    fn absolute(&mut self, row: usize) -> Result<bool> {
        let _ = row;
        Err(Error::Driver(DriverError::new(
            DriverErrorKind::Positioning,
            "cursor does not support absolute positioning",
        )))
    }

    fn is_closed(&self) -> bool;

    fn close(&mut self) -> Result<()>;
}

impl<C: ResultCursor + ?Sized> ResultCursor for &mut C {
    fn columns(&self) -> &Arc<ColumnInfo> {
        (**self).columns()
    }

    fn advance(&mut self) -> Result<bool> {
        (**self).advance()
    }

    fn current(&self) -> Option<&Row> {
        (**self).current()
    }

    fn kind(&self) -> CursorKind {
        (**self).kind()
    }

    fn absolute(&mut self, row: usize) -> Result<bool> {
        (**self).absolute(row)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// The sequence of result sets produced by one statement execution.
pub trait StatementResults {
    /// The next physical result set, or `None` when the statement has no more.
    fn next_result_set(&mut self) -> Result<Option<Box<dyn ResultCursor>>>;
}

/// In-memory cursor over pre-built rows.
#[derive(Debug, Clone)]
pub struct MemoryCursor {
    columns: Arc<ColumnInfo>,
    rows: Vec<Row>,
    /// Number of rows advanced over; the current row is `rows[position - 1]`.
    position: usize,
    kind: CursorKind,
    closed: bool,
}

impl MemoryCursor {
    /// Create a cursor from column names and raw row values.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>, rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self::from_columns(Arc::new(ColumnInfo::new(names)), rows)
    }

    /// Create a cursor whose columns carry native type tags.
    pub fn with_types<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, SqlType)>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        let (names, types): (Vec<String>, Vec<SqlType>) =
            columns.into_iter().map(|(n, t)| (n.into(), t)).unzip();
        Self::from_columns(Arc::new(ColumnInfo::with_types(names, types)), rows)
    }

    pub fn from_columns(columns: Arc<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|values| Row::with_columns(Arc::clone(&columns), values))
            .collect();
        Self {
            columns,
            rows,
            position: 0,
            kind: CursorKind::ForwardOnly,
            closed: false,
        }
    }

    /// Make the cursor scrollable.
    pub fn scrollable(mut self) -> Self {
        self.kind = CursorKind::Scrollable;
        self
    }

    /// Number of rows the cursor holds.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Driver(DriverError::new(
                DriverErrorKind::Closed,
                "cursor is closed",
            )));
        }
        Ok(())
    }
}

impl ResultCursor for MemoryCursor {
    fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    fn advance(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn current(&self) -> Option<&Row> {
        if self.closed || self.position == 0 {
            return None;
        }
        self.rows.get(self.position - 1)
    }

    fn kind(&self) -> CursorKind {
        self.kind
    }

    fn absolute(&mut self, row: usize) -> Result<bool> {
        self.ensure_open()?;
        if self.kind == CursorKind::ForwardOnly {
            return Err(Error::Driver(DriverError::new(
                DriverErrorKind::Positioning,
                "forward-only cursor cannot be positioned",
            )));
        }
        self.position = row.min(self.rows.len() + 1);
        Ok(row >= 1 && row <= self.rows.len())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// In-memory statement output: a queue of result sets.
#[derive(Debug, Default)]
pub struct MemoryStatement {
    cursors: VecDeque<MemoryCursor>,
}

impl MemoryStatement {
    pub fn new(cursors: impl IntoIterator<Item = MemoryCursor>) -> Self {
        Self {
            cursors: cursors.into_iter().collect(),
        }
    }

    /// Append another result set.
    pub fn push(mut self, cursor: MemoryCursor) -> Self {
        self.cursors.push_back(cursor);
        self
    }
}

impl StatementResults for MemoryStatement {
    fn next_result_set(&mut self) -> Result<Option<Box<dyn ResultCursor>>> {
        Ok(self
            .cursors
            .pop_front()
            .map(|c| Box::new(c) as Box<dyn ResultCursor>))
    }
}
