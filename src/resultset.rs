//! Result set abstraction: a forward-only cursor over tabular output, or the
//! summary of a write.

use crate::core::{DataError, Result, Value};
use crate::mapping::IntoValue;

/// Column-named tabular source the mapper can read from.
pub trait QueryResult {
    /// Column names, fixed for the lifetime of the result.
    fn columns(&mut self) -> Result<Vec<String>>;

    /// Advances to the next row. Returns `false` once the rows are exhausted.
    fn next(&mut self) -> bool;

    /// Copies the current row into `dest`, which must hold one slot per column.
    fn scan(&mut self, dest: &mut [Value]) -> Result<()>;

    /// Releases the result. Calling it more than once is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Output of a handler or statement call.
///
/// Query results support the cursor half of the interface and reject
/// `last_insert_id`/`rows_affected`; write results do the opposite.
pub trait ResultSet: QueryResult + Send {
    fn last_insert_id(&self) -> Result<i64>;

    fn rows_affected(&self) -> Result<i64>;
}

impl std::fmt::Debug for dyn ResultSet + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResultSet")
    }
}

/// Result set over rows that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct SliceResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
    closed: bool,
}

impl SliceResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        SliceResult {
            columns,
            rows,
            cursor: 0,
            closed: false,
        }
    }

    /// Builds rows from records by looking up every column in each record's
    /// flattened fields. Columns a record does not carry scan as `Null`.
    pub fn from_records<T: IntoValue>(columns: Vec<String>, records: Vec<T>) -> Self {
        let rows = records
            .into_iter()
            .map(|record| {
                let (names, mut values) = record.into_value().into_pairs().unwrap_or_default();
                columns
                    .iter()
                    .map(|column| match names.iter().position(|n| n == column) {
                        Some(i) => std::mem::take(&mut values[i]),
                        None => Value::Null,
                    })
                    .collect()
            })
            .collect();
        Self::new(columns, rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl QueryResult for SliceResult {
    fn columns(&mut self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn next(&mut self) -> bool {
        if self.closed || self.cursor >= self.rows.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    fn scan(&mut self, dest: &mut [Value]) -> Result<()> {
        if dest.len() != self.columns.len() {
            return Err(DataError::ColumnMismatch {
                expected: self.columns.len(),
                actual: dest.len(),
            });
        }
        if self.cursor == 0 {
            return Err(DataError::Unsupported("scan before next"));
        }
        let row = self
            .rows
            .get(self.cursor - 1)
            .ok_or(DataError::Unsupported("scan past end"))?;
        for (slot, value) in dest.iter_mut().zip(row) {
            *slot = value.clone();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl ResultSet for SliceResult {
    fn last_insert_id(&self) -> Result<i64> {
        Err(DataError::Unsupported("query result does not support last insert id"))
    }

    fn rows_affected(&self) -> Result<i64> {
        Err(DataError::Unsupported("query result does not support rows affected"))
    }
}

/// Summary of a write operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub last_insert_id: i64,
    pub rows_affected: i64,
}

impl ExecResult {
    pub fn new(last_insert_id: i64, rows_affected: i64) -> Self {
        ExecResult {
            last_insert_id,
            rows_affected,
        }
    }
}

impl QueryResult for ExecResult {
    fn columns(&mut self) -> Result<Vec<String>> {
        Err(DataError::Unsupported("exec result does not support columns"))
    }

    fn next(&mut self) -> bool {
        false
    }

    fn scan(&mut self, _dest: &mut [Value]) -> Result<()> {
        Err(DataError::Unsupported("exec result does not support scan"))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ResultSet for ExecResult {
    fn last_insert_id(&self) -> Result<i64> {
        Ok(self.last_insert_id)
    }

    fn rows_affected(&self) -> Result<i64> {
        Ok(self.rows_affected)
    }
}
