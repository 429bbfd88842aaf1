/// Session Module
///
/// A session is a direct connection to the data source: statements run as
/// given, with no statement pool and no transaction state machine in front of
/// them. Transaction control is passed straight to the driver, so protocol
/// mistakes (a nested begin, a commit without begin) surface as driver
/// errors wrapped in the transaction error codes.
///
/// Sessions are wrapped with interceptors through
/// [`InterceptedSession`](crate::interceptor::InterceptedSession).
use crate::core::{Context, Result, Value};
use crate::resultset::ResultSet;
use std::sync::Arc;

/// Raw statement runner with unconditional transaction control.
pub trait Session: Send + Sync {
    fn ping(&self, ctx: &Context) -> bool;

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>>;

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>>;

    fn begin(&self, ctx: &Context) -> Result<()>;

    fn commit(&self, ctx: &Context) -> Result<()>;

    fn rollback(&self, ctx: &Context) -> Result<()>;

    /// Releases the session. An open transaction is rolled back; later calls
    /// fail with `ExecutorClosed`. Closing twice is a no-op.
    fn close(&self) -> Result<()>;
}

impl<S: Session + ?Sized> Session for Box<S> {
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

    fn commit(&self, ctx: &Context) -> Result<()> {
        (**self).commit(ctx)
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        (**self).rollback(ctx)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Session + ?Sized> Session for Arc<S> {
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

    fn commit(&self, ctx: &Context) -> Result<()> {
        (**self).commit(ctx)
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        (**self).rollback(ctx)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
