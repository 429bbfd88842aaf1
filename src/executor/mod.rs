/// Executor Module
///
/// Executors are the caller-facing façade: they fetch the current handler from
/// a transaction and run statements through it, and forward begin/commit/
/// rollback to the transaction.
///
/// Two variants exist:
/// - **`SimpleExecutor`**: runs every statement directly on the handler
/// - **`PrepareExecutor`**: prepares statements once per handler and reuses
///   them through a `StatementPool`, purging a transaction's statements when
///   it ends
pub mod prepare;
pub mod simple;

pub use prepare::PrepareExecutor;
pub use simple::SimpleExecutor;

use crate::core::{Context, Result, Value};
use crate::resultset::ResultSet;
use serde::Deserialize;

/// Caller-facing statement runner with transaction control.
pub trait Executor: Send + Sync {
    /// `false` once closed or when the data source does not answer.
    fn ping(&self, ctx: &Context) -> bool;

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>>;

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>>;

    fn begin(&self, ctx: &Context) -> Result<()>;

    /// Commits the open transaction. With `require == false` this is a no-op
    /// success, which lets auto-commit callers skip the round trip.
    fn commit(&self, ctx: &Context, require: bool) -> Result<()>;

    /// Rolls back the open transaction; `require` as for `commit`. A closed
    /// executor treats rollback as a no-op.
    fn rollback(&self, ctx: &Context, require: bool) -> Result<()>;

    /// Closes the executor, first rolling back when `rollback` is set.
    /// Closing is one-way and idempotent.
    fn close(&self, ctx: &Context, rollback: bool) -> Result<()>;
}

/// Which executor variant a data source builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Direct execution on the handler
    Simple,
    /// Prepared-statement caching
    #[default]
    Prepare,
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn ping(&self, ctx: &Context) -> bool {
        (**self).ping(ctx)
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        (**self).query(ctx, sql, params)
    }

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        (**self).execute(ctx, sql, params)
    }

    fn begin(&self, ctx: &Context) -> Result<()> {
        (**self).begin(ctx)
    }

    fn commit(&self, ctx: &Context, require: bool) -> Result<()> {
        (**self).commit(ctx, require)
    }

    fn rollback(&self, ctx: &Context, require: bool) -> Result<()> {
        (**self).rollback(ctx, require)
    }

    fn close(&self, ctx: &Context, rollback: bool) -> Result<()> {
        (**self).close(ctx, rollback)
    }
}
