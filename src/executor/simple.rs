use super::Executor;
use crate::core::{Context, DataError, Result, Value};
use crate::handler::HandlerRef;
use crate::resultset::ResultSet;
use crate::transaction::Transaction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info_span, Span};

/// Executor that runs statements directly on the current handler.
pub struct SimpleExecutor {
    transaction: Arc<dyn Transaction>,
    closed: AtomicBool,
    span: Span,
}

impl SimpleExecutor {
    pub fn new(transaction: Arc<dyn Transaction>) -> Self {
        Self::with_span(transaction, info_span!("executor", kind = "simple"))
    }

    /// Creates an executor that logs inside `span`.
    pub fn with_span(transaction: Arc<dyn Transaction>, span: Span) -> Self {
        SimpleExecutor {
            transaction,
            closed: AtomicBool::new(false),
            span,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn handler(&self) -> Result<HandlerRef> {
        if self.is_closed() {
            return Err(DataError::ExecutorClosed("exec sql"));
        }
        self.transaction.handler().ok_or(DataError::HandlerUnavailable)
    }
}

impl Executor for SimpleExecutor {
    fn ping(&self, ctx: &Context) -> bool {
        !self.is_closed() && self.transaction.ping(ctx)
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        self.handler()?.query(ctx, sql, params)
    }

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        self.handler()?.execute(ctx, sql, params)
    }

    fn begin(&self, ctx: &Context) -> Result<()> {
        if self.is_closed() {
            return Err(DataError::ExecutorClosed("transaction begin"));
        }
        self.transaction.begin(ctx, None)
    }

    fn commit(&self, ctx: &Context, require: bool) -> Result<()> {
        if self.is_closed() {
            return Err(DataError::ExecutorClosed("transaction commit"));
        }
        if !require {
            return Ok(());
        }
        self.transaction.commit(ctx, None)
    }

    fn rollback(&self, ctx: &Context, require: bool) -> Result<()> {
        if self.is_closed() || !require {
            return Ok(());
        }
        self.transaction.rollback(ctx, None)
    }

    fn close(&self, ctx: &Context, rollback: bool) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = if rollback {
            self.transaction.rollback(ctx, None)
        } else {
            Ok(())
        };
        if let Err(e) = self.transaction.close() {
            self.span
                .in_scope(|| error!("failed to close transaction: {}", e));
        }
        self.span.in_scope(|| debug!("executor closed"));
        result
    }
}
