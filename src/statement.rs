//! Prepared statements.

use crate::core::{Context, Result, Value};
use crate::resultset::ResultSet;

/// A prepared, reusable unit of execution.
///
/// A statement is scoped to the handler that prepared it and must not be used
/// once that handler (or, for a transactional handler, its transaction) is
/// gone. After `close` the statement is invalid.
pub trait Statement: Send + Sync {
    fn query(&self, ctx: &Context, params: &[Value]) -> Result<Box<dyn ResultSet>>;

    fn execute(&self, ctx: &Context, params: &[Value]) -> Result<Box<dyn ResultSet>>;

    fn close(&self) -> Result<()>;
}
