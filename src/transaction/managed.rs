use super::{SuccessCallback, Transaction, TransactionProvider, TransactionState, TxResource};
use crate::core::{Context, DataError, Result};
use crate::handler::HandlerRef;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Stores `target` into the state field when dropped, including while
/// unwinding from a panic in the driver or in a callback.
struct StateReset<'a> {
    state: &'a AtomicU8,
    target: TransactionState,
}

impl<'a> StateReset<'a> {
    fn new(state: &'a AtomicU8, target: TransactionState) -> Self {
        StateReset { state, target }
    }
}

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        self.state.store(self.target as u8, Ordering::Release);
    }
}

/// Transaction state machine over a `TransactionProvider`.
pub struct DefaultTransaction {
    provider: Arc<dyn TransactionProvider>,
    state: AtomicU8,
    live: Mutex<Option<Arc<dyn TxResource>>>,
    closed: AtomicBool,
}

impl DefaultTransaction {
    pub fn new(provider: Arc<dyn TransactionProvider>) -> Self {
        DefaultTransaction {
            provider,
            state: AtomicU8::new(TransactionState::Unknown as u8),
            live: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn transition(&self, from: TransactionState, to: TransactionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn live(&self) -> MutexGuard<'_, Option<Arc<dyn TxResource>>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Shared commit/rollback protocol: gate on `Begin`, run the I/O without
    /// holding the handle lock, restore `Begin` on failure, release the
    /// resource and return to `Unknown` on success.
    fn finish(
        &self,
        ctx: &Context,
        pending: TransactionState,
        on_success: Option<SuccessCallback<'_>>,
        io: impl FnOnce(&dyn TxResource, &Context) -> Result<()>,
        wrap: fn(Box<DataError>) -> DataError,
    ) -> Result<()> {
        if !self.transition(TransactionState::Begin, pending) {
            return Err(DataError::TransactionWithoutBegin);
        }
        let mut reset = StateReset::new(&self.state, TransactionState::Begin);

        let tx = self.live().clone();
        let Some(tx) = tx else {
            return Err(DataError::TransactionWithoutBegin);
        };

        io(tx.as_ref(), ctx).map_err(|e| wrap(Box::new(e)))?;

        reset.target = TransactionState::Unknown;
        let handler = tx.handler();
        {
            let mut live = self.live();
            if live.as_ref().is_some_and(|current| Arc::ptr_eq(current, &tx)) {
                live.take();
            }
        }
        debug!("transaction on {} resolved ({:?})", handler.id(), pending);

        match on_success {
            Some(callback) => callback(&handler),
            None => Ok(()),
        }
    }
}

impl Transaction for DefaultTransaction {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let tx = self.live().take();
        match tx {
            Some(tx) => {
                warn!("closing transaction with an unresolved transaction, rolling back");
                tx.rollback(&Context::background())
            }
            None => Ok(()),
        }
    }

    fn ping(&self, ctx: &Context) -> bool {
        !self.closed.load(Ordering::Acquire) && self.provider.ping(ctx)
    }

    fn handler(&self) -> Option<HandlerRef> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        match self.live().as_ref() {
            Some(tx) => Some(tx.handler()),
            None => Some(self.provider.handler()),
        }
    }

    fn begin(&self, ctx: &Context, on_success: Option<SuccessCallback<'_>>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DataError::HandlerUnavailable);
        }
        if !self.transition(TransactionState::Unknown, TransactionState::Begin) {
            return Err(DataError::TransactionAlreadyBegun);
        }

        let tx: Arc<dyn TxResource> = {
            let mut reset = StateReset::new(&self.state, TransactionState::Unknown);
            let tx = self
                .provider
                .begin(ctx)
                .map_err(|e| DataError::TransactionBegin(Box::new(e)))?;
            reset.target = TransactionState::Begin;
            Arc::from(tx)
        };

        let handler = tx.handler();
        *self.live() = Some(tx);
        debug!("transaction begun on {}", handler.id());

        match on_success {
            Some(callback) => callback(&handler),
            None => Ok(()),
        }
    }

    fn commit(&self, ctx: &Context, on_success: Option<SuccessCallback<'_>>) -> Result<()> {
        self.finish(
            ctx,
            TransactionState::Committing,
            on_success,
            |tx, ctx| tx.commit(ctx),
            DataError::TransactionCommit,
        )
    }

    fn rollback(&self, ctx: &Context, on_success: Option<SuccessCallback<'_>>) -> Result<()> {
        self.finish(
            ctx,
            TransactionState::Rollbacking,
            on_success,
            |tx, ctx| tx.rollback(ctx),
            DataError::TransactionRollback,
        )
    }

    fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::test_utils::FakeProvider;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    fn transaction() -> (Arc<FakeProvider>, DefaultTransaction) {
        let provider = FakeProvider::new();
        let tx = DefaultTransaction::new(provider.clone());
        (provider, tx)
    }

    #[test]
    fn test_begin_commit_cycle() {
        let (provider, tx) = transaction();
        let ctx = Context::background();

        tx.begin(&ctx, None).unwrap();
        assert_eq!(tx.state(), TransactionState::Begin);
        tx.commit(&ctx, None).unwrap();
        assert_eq!(tx.state(), TransactionState::Unknown);
        assert_eq!(provider.commits(), 1);

        tx.begin(&ctx, None).unwrap();
        tx.rollback(&ctx, None).unwrap();
        assert_eq!(tx.state(), TransactionState::Unknown);
        assert_eq!(provider.rollbacks(), 1);
    }

    #[test]
    fn test_second_begin_is_rejected() {
        let (_, tx) = transaction();
        let ctx = Context::background();
        tx.begin(&ctx, None).unwrap();

        let err = tx.begin(&ctx, None).unwrap_err();
        assert!(matches!(err, DataError::TransactionAlreadyBegun));
        assert_eq!(tx.state(), TransactionState::Begin);
    }

    #[test]
    fn test_commit_and_rollback_require_begin() {
        let (provider, tx) = transaction();
        let ctx = Context::background();

        let err = tx.commit(&ctx, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionProtocolViolation);
        let err = tx.rollback(&ctx, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionProtocolViolation);
        assert_eq!(tx.state(), TransactionState::Unknown);
        assert_eq!(provider.commits() + provider.rollbacks(), 0);
    }

    #[test]
    fn test_failed_commit_stays_open_for_retry() {
        let (provider, tx) = transaction();
        let ctx = Context::background();
        tx.begin(&ctx, None).unwrap();
        let tx_handler = tx.handler().unwrap();

        provider.fail_next_commit();
        let err = tx.commit(&ctx, None).unwrap_err();
        assert!(matches!(err, DataError::TransactionCommit(_)));
        assert_eq!(tx.state(), TransactionState::Begin);
        assert_eq!(tx.handler().unwrap().id(), tx_handler.id());

        tx.commit(&ctx, None).unwrap();
        assert_eq!(tx.state(), TransactionState::Unknown);
    }

    #[test]
    fn test_failed_rollback_stays_open_for_retry() {
        let (provider, tx) = transaction();
        let ctx = Context::background();
        tx.begin(&ctx, None).unwrap();

        provider.fail_next_rollback();
        let err = tx.rollback(&ctx, None).unwrap_err();
        assert!(matches!(err, DataError::TransactionRollback(_)));
        assert_eq!(tx.state(), TransactionState::Begin);
        tx.rollback(&ctx, None).unwrap();
    }

    #[test]
    fn test_failed_begin_resets_to_unknown() {
        let (provider, tx) = transaction();
        let ctx = Context::background();

        provider.fail_next_begin();
        let err = tx.begin(&ctx, None).unwrap_err();
        assert!(matches!(err, DataError::TransactionBegin(_)));
        assert_eq!(tx.state(), TransactionState::Unknown);

        tx.begin(&ctx, None).unwrap();
    }

    #[test]
    fn test_handler_swaps_with_transaction() {
        let (provider, tx) = transaction();
        let ctx = Context::background();
        let plain = tx.handler().unwrap();
        assert_eq!(plain.id(), provider.plain_id());

        tx.begin(&ctx, None).unwrap();
        let in_tx = tx.handler().unwrap();
        assert_ne!(in_tx.id(), plain.id());

        tx.commit(&ctx, None).unwrap();
        assert_eq!(tx.handler().unwrap().id(), plain.id());
    }

    #[test]
    fn test_callbacks_receive_transactional_handler() {
        let (_, tx) = transaction();
        let ctx = Context::background();
        let begun = Mutex::new(None);
        let committed = Mutex::new(None);

        tx.begin(
            &ctx,
            Some(&|h: &HandlerRef| {
                *begun.lock().unwrap() = Some(h.id());
                Ok(())
            }),
        )
        .unwrap();
        tx.commit(
            &ctx,
            Some(&|h: &HandlerRef| {
                *committed.lock().unwrap() = Some(h.id());
                Ok(())
            }),
        )
        .unwrap();

        assert!(begun.lock().unwrap().is_some());
        assert_eq!(*begun.lock().unwrap(), *committed.lock().unwrap());
    }

    #[test]
    fn test_callback_error_is_returned_after_reset() {
        let (_, tx) = transaction();
        let ctx = Context::background();
        tx.begin(&ctx, None).unwrap();

        let err = tx
            .commit(
                &ctx,
                Some(&|_: &HandlerRef| Err(DataError::Callback("purge failed".into()))),
            )
            .unwrap_err();
        assert!(matches!(err, DataError::Callback(_)));
        assert_eq!(err.kind(), ErrorKind::CallbackFailure);
        assert_eq!(tx.state(), TransactionState::Unknown);
    }

    #[test]
    fn test_panic_during_commit_restores_begin() {
        let (provider, tx) = transaction();
        let ctx = Context::background();
        tx.begin(&ctx, None).unwrap();

        provider.panic_next_commit();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| tx.commit(&ctx, None)));
        assert!(outcome.is_err(), "the panic is re-raised to the caller");
        assert_eq!(tx.state(), TransactionState::Begin);

        tx.commit(&ctx, None).unwrap();
    }

    #[test]
    fn test_concurrent_begin_has_one_winner() {
        let (_, tx) = transaction();
        let tx = Arc::new(tx);
        let barrier = Arc::new(Barrier::new(8));
        let wins = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tx = tx.clone();
                let barrier = barrier.clone();
                let wins = wins.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    match tx.begin(&Context::background(), None) {
                        Ok(()) => {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => assert!(matches!(e, DataError::TransactionAlreadyBegun)),
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_rolls_back_and_hides_handler() {
        let (provider, tx) = transaction();
        let ctx = Context::background();
        tx.begin(&ctx, None).unwrap();

        tx.close().unwrap();
        tx.close().unwrap();
        assert_eq!(provider.rollbacks(), 1);
        assert!(tx.handler().is_none());
        assert!(!tx.ping(&ctx));
        assert_eq!(tx.state(), TransactionState::Begin);
        assert!(matches!(tx.begin(&ctx, None), Err(DataError::HandlerUnavailable)));
    }

    #[test]
    fn test_ping_ignores_transaction_state() {
        let (_, tx) = transaction();
        let ctx = Context::background();
        assert!(tx.ping(&ctx));
        tx.begin(&ctx, None).unwrap();
        assert!(tx.ping(&ctx));
    }
}
