use super::Executor;
use crate::core::{Context, DataError, Result, Value};
use crate::handler::{DefaultPool, HandlerRef, StatementPool};
use crate::resultset::ResultSet;
use crate::statement::Statement;
use crate::transaction::Transaction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info_span, Span};

/// Executor that prepares each statement text once per handler and reuses it.
///
/// Statements prepared on a transactional handler are purged when that
/// transaction commits or rolls back, so a cached statement never outlives
/// the handler that created it.
pub struct PrepareExecutor {
    transaction: Arc<dyn Transaction>,
    pool: Arc<dyn StatementPool>,
    closed: AtomicBool,
    span: Span,
}

impl PrepareExecutor {
    pub fn new(transaction: Arc<dyn Transaction>) -> Self {
        Self::with_pool(transaction, Arc::new(DefaultPool::new()))
    }

    pub fn with_pool(transaction: Arc<dyn Transaction>, pool: Arc<dyn StatementPool>) -> Self {
        Self::with_span(transaction, pool, info_span!("executor", kind = "prepare"))
    }

    /// Creates an executor that logs inside `span`.
    pub fn with_span(
        transaction: Arc<dyn Transaction>,
        pool: Arc<dyn StatementPool>,
        span: Span,
    ) -> Self {
        PrepareExecutor {
            transaction,
            pool,
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

    /// Returns the cached statement for (`handler`, `sql`), preparing and
    /// caching it on a miss.
    fn statement(&self, ctx: &Context, handler: &HandlerRef, sql: &str) -> Result<Arc<dyn Statement>> {
        if let Some(stmt) = self.pool.get(handler.as_ref(), sql) {
            return Ok(stmt);
        }
        let stmt = handler.prepare(ctx, sql)?;
        self.span
            .in_scope(|| debug!("prepared statement on {}: {}", handler.id(), sql));
        // A commit or rollback may have purged this handler while we prepared;
        // its id is never reused, so caching under it would only leak.
        let current = self.transaction.handler();
        if current.map_or(false, |h| h.id() == handler.id()) {
            self.pool.put(handler.as_ref(), sql, stmt.clone());
        } else {
            self.span
                .in_scope(|| debug!("handler {} ended during prepare, not caching", handler.id()));
        }
        Ok(stmt)
    }

    fn purge(&self, handler: &HandlerRef) -> Result<()> {
        self.pool.purge(handler.as_ref());
        Ok(())
    }
}

impl Executor for PrepareExecutor {
    fn ping(&self, ctx: &Context) -> bool {
        !self.is_closed() && self.transaction.ping(ctx)
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        let handler = self.handler()?;
        self.statement(ctx, &handler, sql)?.query(ctx, params)
    }

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        let handler = self.handler()?;
        self.statement(ctx, &handler, sql)?.execute(ctx, params)
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
        self.transaction.commit(ctx, Some(&|h: &HandlerRef| self.purge(h)))
    }

    fn rollback(&self, ctx: &Context, require: bool) -> Result<()> {
        if self.is_closed() || !require {
            return Ok(());
        }
        self.transaction.rollback(ctx, Some(&|h: &HandlerRef| self.purge(h)))
    }

    fn close(&self, ctx: &Context, rollback: bool) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = if rollback {
            self.transaction
                .rollback(ctx, Some(&|h: &HandlerRef| self.purge(h)))
        } else {
            Ok(())
        };
        self.pool.purge_all();
        if let Err(e) = self.transaction.close() {
            self.span
                .in_scope(|| error!("failed to close transaction: {}", e));
        }
        self.span.in_scope(|| debug!("executor closed"));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::test_utils::{FakeHandler, FakeProvider};
    use crate::transaction::{DefaultTransaction, SuccessCallback, TransactionState};
    use std::sync::Mutex;

    fn executor() -> (Arc<FakeProvider>, Arc<DefaultPool>, PrepareExecutor) {
        let provider = FakeProvider::new();
        let tx = Arc::new(DefaultTransaction::new(provider.clone()));
        let pool = Arc::new(DefaultPool::new());
        let exec = PrepareExecutor::with_pool(tx, pool.clone());
        (provider, pool, exec)
    }

    #[test]
    fn test_statement_is_prepared_once_per_handler() {
        let (provider, pool, exec) = executor();
        let ctx = Context::background();

        exec.query(&ctx, "select 1", &[]).unwrap();
        exec.query(&ctx, "select 1", &[]).unwrap();
        exec.execute(&ctx, "select 1", &[]).unwrap();
        assert_eq!(provider.prepares(), 1);

        exec.query(&ctx, "select 2", &[]).unwrap();
        assert_eq!(provider.prepares(), 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_commit_purges_transaction_statements() {
        let (provider, pool, exec) = executor();
        let ctx = Context::background();

        exec.begin(&ctx).unwrap();
        exec.query(&ctx, "select * from t", &[]).unwrap();
        exec.query(&ctx, "select * from t", &[]).unwrap();
        assert_eq!(provider.prepares(), 1);
        let tx_handler = provider.last_tx_handler().unwrap();
        assert_eq!(pool.len_for(tx_handler.as_ref()), 1);

        exec.commit(&ctx, true).unwrap();
        assert_eq!(pool.len_for(tx_handler.as_ref()), 0);
        assert!(tx_handler.prepared().iter().all(|s| s.is_closed()));

        exec.query(&ctx, "select * from t", &[]).unwrap();
        assert_eq!(provider.prepares(), 2, "the same text is prepared again after commit");
        exec.query(&ctx, "select * from t", &[]).unwrap();
        assert_eq!(provider.prepares(), 2);
    }

    #[test]
    fn test_rollback_purges_transaction_statements() {
        let (provider, pool, exec) = executor();
        let ctx = Context::background();

        exec.query(&ctx, "select 1", &[]).unwrap();
        exec.begin(&ctx).unwrap();
        exec.query(&ctx, "select 1", &[]).unwrap();
        assert_eq!(pool.len(), 2);

        exec.rollback(&ctx, true).unwrap();
        assert_eq!(pool.len(), 1, "plain handler statements survive the transaction");
        assert_eq!(pool.len_for(provider.plain().as_ref()), 1);
    }

    #[test]
    fn test_failed_commit_keeps_cached_statements() {
        let (provider, pool, exec) = executor();
        let ctx = Context::background();
        exec.begin(&ctx).unwrap();
        exec.query(&ctx, "select 1", &[]).unwrap();

        provider.fail_next_commit();
        assert!(exec.commit(&ctx, true).is_err());
        assert_eq!(pool.len(), 1);

        exec.query(&ctx, "select 1", &[]).unwrap();
        assert_eq!(provider.prepares(), 1);
        exec.commit(&ctx, true).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_close_purges_everything() {
        let (provider, pool, exec) = executor();
        let ctx = Context::background();
        exec.query(&ctx, "select 1", &[]).unwrap();
        exec.query(&ctx, "select 2", &[]).unwrap();

        exec.close(&ctx, false).unwrap();
        assert!(pool.is_empty());
        assert!(provider.plain().prepared().iter().all(|s| s.is_closed()));
        assert_eq!(
            exec.query(&ctx, "select 1", &[]).unwrap_err().kind(),
            ErrorKind::ExecutorClosed
        );
    }

    /// Hands out its handlers in order, repeating the last one.
    struct HandoffTransaction {
        handlers: Mutex<Vec<HandlerRef>>,
    }

    impl Transaction for HandoffTransaction {
        fn close(&self) -> Result<()> {
            Ok(())
        }

        fn ping(&self, _ctx: &Context) -> bool {
            true
        }

        fn handler(&self) -> Option<HandlerRef> {
            let mut handlers = self.handlers.lock().unwrap();
            if handlers.len() > 1 {
                Some(handlers.remove(0))
            } else {
                handlers.first().cloned()
            }
        }

        fn begin(&self, _ctx: &Context, _on_success: Option<SuccessCallback<'_>>) -> Result<()> {
            Ok(())
        }

        fn commit(&self, _ctx: &Context, _on_success: Option<SuccessCallback<'_>>) -> Result<()> {
            Ok(())
        }

        fn rollback(&self, _ctx: &Context, _on_success: Option<SuccessCallback<'_>>) -> Result<()> {
            Ok(())
        }

        fn state(&self) -> TransactionState {
            TransactionState::Begin
        }
    }

    #[test]
    fn test_statement_for_ended_handler_is_not_cached() {
        let tx_handler = FakeHandler::new();
        let plain = FakeHandler::new();
        let transaction = Arc::new(HandoffTransaction {
            handlers: Mutex::new(vec![
                tx_handler.clone() as HandlerRef,
                plain.clone() as HandlerRef,
            ]),
        });
        let pool = Arc::new(DefaultPool::new());
        let exec = PrepareExecutor::with_pool(transaction, pool.clone());
        let ctx = Context::background();

        exec.query(&ctx, "select 1", &[]).unwrap();
        assert_eq!(tx_handler.prepares(), 1);
        assert_eq!(pool.len_for(tx_handler.as_ref()), 0);
        assert!(pool.is_empty());

        exec.query(&ctx, "select 1", &[]).unwrap();
        assert_eq!(plain.prepares(), 1);
        assert_eq!(pool.len_for(plain.as_ref()), 1);
    }

    #[test]
    fn test_prepare_failure_is_not_cached() {
        let (provider, pool, exec) = executor();
        provider.plain().fail_prepare();

        let err = exec
            .query(&Context::background(), "selec 1", &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatementPrepareFailure);
        assert!(pool.is_empty());
    }
}
