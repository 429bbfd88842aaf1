/// # Test Utilities Module
///
/// In-memory collaborators for unit tests: a handler that counts prepare
/// calls, statements that remember whether they were closed, and a
/// transaction provider whose begin/commit/rollback can be made to fail or
/// panic on demand.

use crate::core::{Context, DataError, Result, Value};
use crate::handler::{Handler, HandlerId, HandlerRef};
use crate::resultset::{ExecResult, ResultSet, SliceResult};
use crate::statement::Statement;
use crate::transaction::{TransactionProvider, TxResource};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn echo(sql: &str, params: &[Value]) -> Box<dyn ResultSet> {
    Box::new(SliceResult::new(
        vec!["sql".to_string(), "params".to_string()],
        vec![vec![Value::from(sql), Value::Int(params.len() as i64)]],
    ))
}

/// Statement that echoes its text and tracks `close`.
pub struct FakeStatement {
    sql: String,
    closed: AtomicBool,
    runs: AtomicUsize,
}

impl FakeStatement {
    pub fn new(sql: &str) -> Arc<Self> {
        Arc::new(FakeStatement {
            sql: sql.to_string(),
            closed: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn run(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        if self.is_closed() {
            return Err(DataError::Query(Box::new(DataError::Unsupported(
                "statement is closed",
            ))));
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Statement for FakeStatement {
    fn query(&self, ctx: &Context, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        self.run(ctx)?;
        Ok(echo(&self.sql, params))
    }

    fn execute(&self, ctx: &Context, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        self.run(ctx)?;
        Ok(Box::new(ExecResult::new(1, params.len() as i64)))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Handler that counts how often it prepares.
pub struct FakeHandler {
    id: HandlerId,
    prepares: Arc<AtomicUsize>,
    fail_prepare: AtomicBool,
    prepared: Mutex<Vec<Arc<FakeStatement>>>,
}

impl FakeHandler {
    pub fn new() -> Arc<Self> {
        Self::sharing(Arc::new(AtomicUsize::new(0)))
    }

    /// Handler whose prepare calls are added to a shared counter.
    pub fn sharing(prepares: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(FakeHandler {
            id: HandlerId::next(),
            prepares,
            fail_prepare: AtomicBool::new(false),
            prepared: Mutex::new(Vec::new()),
        })
    }

    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn fail_prepare(&self) {
        self.fail_prepare.store(true, Ordering::SeqCst);
    }

    /// Every statement this handler has prepared, in order.
    pub fn prepared(&self) -> Vec<Arc<FakeStatement>> {
        self.prepared.lock().unwrap().clone()
    }
}

impl Handler for FakeHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn prepare(&self, ctx: &Context, sql: &str) -> Result<Arc<dyn Statement>> {
        ctx.check()?;
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(DataError::Prepare(Box::new(DataError::Unsupported(
                "syntax error",
            ))));
        }
        self.prepares.fetch_add(1, Ordering::SeqCst);
        let stmt = FakeStatement::new(sql);
        self.prepared.lock().unwrap().push(stmt.clone());
        Ok(stmt)
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        Ok(echo(sql, params))
    }

    fn execute(&self, ctx: &Context, _sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        Ok(Box::new(ExecResult::new(1, params.len() as i64)))
    }
}

#[derive(Default)]
struct ProviderState {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    panic_commit: AtomicBool,
}

/// Provider handing out `FakeHandler`s; every begun transaction gets a new one.
pub struct FakeProvider {
    plain: Arc<FakeHandler>,
    prepares: Arc<AtomicUsize>,
    state: Arc<ProviderState>,
    last_tx: Mutex<Option<Arc<FakeHandler>>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        let prepares = Arc::new(AtomicUsize::new(0));
        Arc::new(FakeProvider {
            plain: FakeHandler::sharing(prepares.clone()),
            prepares,
            state: Arc::new(ProviderState::default()),
            last_tx: Mutex::new(None),
        })
    }

    pub fn plain_id(&self) -> HandlerId {
        self.plain.id()
    }

    pub fn plain(&self) -> Arc<FakeHandler> {
        self.plain.clone()
    }

    pub fn last_tx_handler(&self) -> Option<Arc<FakeHandler>> {
        self.last_tx.lock().unwrap().clone()
    }

    /// Prepare calls across the plain handler and every transaction handler.
    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.state.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    pub fn fail_next_begin(&self) {
        self.state.fail_begin.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_commit(&self) {
        self.state.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_rollback(&self) {
        self.state.fail_rollback.store(true, Ordering::SeqCst);
    }

    pub fn panic_next_commit(&self) {
        self.state.panic_commit.store(true, Ordering::SeqCst);
    }
}

impl TransactionProvider for FakeProvider {
    fn handler(&self) -> HandlerRef {
        self.plain.clone()
    }

    fn begin(&self, ctx: &Context) -> Result<Box<dyn TxResource>> {
        ctx.check()?;
        if self.state.fail_begin.swap(false, Ordering::SeqCst) {
            return Err(DataError::Unsupported("connection refused"));
        }
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        let handler = FakeHandler::sharing(self.prepares.clone());
        *self.last_tx.lock().unwrap() = Some(handler.clone());
        Ok(Box::new(FakeTx {
            handler,
            state: self.state.clone(),
        }))
    }

    fn ping(&self, ctx: &Context) -> bool {
        ctx.check().is_ok()
    }
}

struct FakeTx {
    handler: Arc<FakeHandler>,
    state: Arc<ProviderState>,
}

impl TxResource for FakeTx {
    fn handler(&self) -> HandlerRef {
        self.handler.clone()
    }

    fn commit(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        if self.state.panic_commit.swap(false, Ordering::SeqCst) {
            panic!("transaction handle released twice");
        }
        if self.state.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(DataError::Unsupported("commit lost connection"));
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        if self.state.fail_rollback.swap(false, Ordering::SeqCst) {
            return Err(DataError::Unsupported("rollback lost connection"));
        }
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
