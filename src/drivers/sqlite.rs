/// SQLite Driver Module
///
/// A rusqlite-backed data source. Every executor and session it builds owns a
/// separate connection, so one caller's open transaction never captures
/// another caller's statements. Within an executor the plain handler and the
/// handler of each transaction share that executor's connection; every
/// transaction gets a fresh handler id so cached statements never cross its
/// boundary.
///
/// `:memory:` is opened as a named shared-cache database, kept alive by the
/// data source, so all of its connections see the same tables.
///
/// Query results are read eagerly into a `SliceResult` while the connection
/// lock is held, so no cursor outlives the call that produced it.
use crate::config::SqliteConfig;
use crate::core::{Context, DataError, Result, Value};
use crate::executor::{Executor, ExecutorKind, PrepareExecutor, SimpleExecutor};
use crate::handler::{DefaultPool, Handler, HandlerId, HandlerRef};
use crate::resultset::{ExecResult, ResultSet, SliceResult};
use crate::session::Session;
use crate::statement::Statement;
use crate::transaction::{DefaultTransaction, TransactionProvider, TxResource};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn, Span};

type SharedConnection = Arc<Mutex<Connection>>;

static MEMORY_DATABASES: AtomicU64 = AtomicU64::new(0);

fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(*b as i64)),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Timestamp(t) => ToSqlOutput::Owned(SqlValue::Text(t.to_rfc3339())),
            structured => ToSqlOutput::Owned(SqlValue::Text(structured.to_json().to_string())),
        })
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn run_query(conn: &Connection, sql: &str, params: &[Value]) -> Result<SliceResult> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(from_sql(row.get_ref(i)?));
        }
        out.push(values);
    }
    Ok(SliceResult::new(columns, out))
}

fn run_execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<ExecResult> {
    let mut stmt = conn.prepare_cached(sql)?;
    let affected = stmt.execute(params_from_iter(params.iter()))?;
    Ok(ExecResult::new(conn.last_insert_rowid(), affected as i64))
}

/// Handler over the shared connection.
pub struct SqliteHandler {
    id: HandlerId,
    conn: SharedConnection,
}

impl SqliteHandler {
    fn new(conn: SharedConnection) -> Self {
        SqliteHandler {
            id: HandlerId::next(),
            conn,
        }
    }
}

impl Handler for SqliteHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn prepare(&self, ctx: &Context, sql: &str) -> Result<Arc<dyn Statement>> {
        ctx.check()?;
        lock(&self.conn)
            .prepare_cached(sql)
            .map_err(|e| DataError::Prepare(Box::new(e.into())))?;
        Ok(Arc::new(SqliteStatement {
            sql: sql.to_string(),
            conn: self.conn.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        let result = run_query(&lock(&self.conn), sql, params)
            .map_err(|e| DataError::Query(Box::new(e)))?;
        Ok(Box::new(result))
    }

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        let result = run_execute(&lock(&self.conn), sql, params)
            .map_err(|e| DataError::Execute(Box::new(e)))?;
        Ok(Box::new(result))
    }
}

/// Statement validated at prepare time. Each run goes through the
/// connection's own statement cache.
pub struct SqliteStatement {
    sql: String,
    conn: SharedConnection,
    closed: AtomicBool,
}

impl SqliteStatement {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DataError::Unsupported("statement is closed"));
        }
        Ok(())
    }
}

impl Statement for SqliteStatement {
    fn query(&self, ctx: &Context, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        self.check_open()?;
        let result = run_query(&lock(&self.conn), &self.sql, params)
            .map_err(|e| DataError::Query(Box::new(e)))?;
        Ok(Box::new(result))
    }

    fn execute(&self, ctx: &Context, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        self.check_open()?;
        let result = run_execute(&lock(&self.conn), &self.sql, params)
            .map_err(|e| DataError::Execute(Box::new(e)))?;
        Ok(Box::new(result))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// One open `BEGIN ... COMMIT/ROLLBACK` block.
struct SqliteTx {
    handler: Arc<SqliteHandler>,
    finished: AtomicBool,
}

impl SqliteTx {
    fn finish(&self, ctx: &Context, sql: &str) -> Result<()> {
        ctx.check()?;
        lock(&self.handler.conn).execute_batch(sql)?;
        self.finished.store(true, Ordering::Release);
        debug!("{} on {}", sql, self.handler.id);
        Ok(())
    }
}

impl TxResource for SqliteTx {
    fn handler(&self) -> HandlerRef {
        self.handler.clone()
    }

    fn commit(&self, ctx: &Context) -> Result<()> {
        self.finish(ctx, "COMMIT")
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        self.finish(ctx, "ROLLBACK")
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = lock(&self.handler.conn).execute_batch("ROLLBACK") {
            warn!("failed to roll back abandoned transaction on {}: {}", self.handler.id, e);
        }
    }
}

/// Transaction provider over a shared connection.
pub struct SqliteProvider {
    conn: SharedConnection,
    plain: Arc<SqliteHandler>,
}

impl TransactionProvider for SqliteProvider {
    fn handler(&self) -> HandlerRef {
        self.plain.clone()
    }

    fn begin(&self, ctx: &Context) -> Result<Box<dyn TxResource>> {
        ctx.check()?;
        lock(&self.conn).execute_batch("BEGIN")?;
        let handler = Arc::new(SqliteHandler::new(self.conn.clone()));
        debug!("BEGIN on {}", handler.id);
        Ok(Box::new(SqliteTx {
            handler,
            finished: AtomicBool::new(false),
        }))
    }

    fn ping(&self, ctx: &Context) -> bool {
        ctx.check().is_ok()
            && lock(&self.conn)
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok()
    }
}

/// Direct, non-pooled access over its own connection.
pub struct SqliteSession {
    conn: Mutex<Connection>,
    closed: AtomicBool,
}

impl SqliteSession {
    fn connection(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DataError::ExecutorClosed(operation));
        }
        Ok(self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// `true` while a transaction begun on this session is open.
    pub fn in_transaction(&self) -> bool {
        !self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_autocommit()
    }
}

impl Session for SqliteSession {
    fn ping(&self, ctx: &Context) -> bool {
        ctx.check().is_ok()
            && self.connection("ping").map_or(false, |conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
            })
    }

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        let result = run_query(&*self.connection("exec sql")?, sql, params)
            .map_err(|e| DataError::Query(Box::new(e)))?;
        Ok(Box::new(result))
    }

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>> {
        ctx.check()?;
        let result = run_execute(&*self.connection("exec sql")?, sql, params)
            .map_err(|e| DataError::Execute(Box::new(e)))?;
        Ok(Box::new(result))
    }

    fn begin(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        self.connection("transaction begin")?
            .execute_batch("BEGIN")
            .map_err(|e| DataError::TransactionBegin(Box::new(e.into())))
    }

    fn commit(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        self.connection("transaction commit")?
            .execute_batch("COMMIT")
            .map_err(|e| DataError::TransactionCommit(Box::new(e.into())))
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        self.connection("transaction rollback")?
            .execute_batch("ROLLBACK")
            .map_err(|e| DataError::TransactionRollback(Box::new(e.into())))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !conn.is_autocommit() {
            debug!("rolling back open transaction on session close");
            conn.execute_batch("ROLLBACK")
                .map_err(|e| DataError::TransactionRollback(Box::new(e.into())))?;
        }
        Ok(())
    }
}

/// Entry point: a SQLite database and the executors and sessions built on it.
pub struct SqliteDataSource {
    config: SqliteConfig,
    // Holds a shared in-memory database open while no executor is alive.
    _anchor: Mutex<Connection>,
}

impl SqliteDataSource {
    /// Opens the database at `config.path` and applies its settings.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let mut config = config.clone();
        if config.path == ":memory:" {
            let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
            config.path = format!("file:datarail-memory-{}?mode=memory&cache=shared", n);
        }
        let anchor = connect(&config)?;
        info!("opened sqlite database {}", config.path);
        Ok(SqliteDataSource {
            config,
            _anchor: Mutex::new(anchor),
        })
    }

    /// A private in-memory database with default settings.
    pub fn in_memory() -> Result<Self> {
        Self::open(&SqliteConfig::default())
    }

    /// The connection string in use; `:memory:` is replaced by its
    /// shared-cache name.
    pub fn path(&self) -> &str {
        &self.config.path
    }

    /// A transaction provider over a new connection.
    pub fn provider(&self) -> Result<Arc<SqliteProvider>> {
        let conn = Arc::new(Mutex::new(connect(&self.config)?));
        let plain = Arc::new(SqliteHandler::new(conn.clone()));
        Ok(Arc::new(SqliteProvider { conn, plain }))
    }

    /// Builds an executor of the given kind over a new connection.
    pub fn new_executor(&self, kind: ExecutorKind, span: Span) -> Result<Box<dyn Executor>> {
        let transaction = Arc::new(DefaultTransaction::new(self.provider()?));
        Ok(match kind {
            ExecutorKind::Simple => Box::new(SimpleExecutor::with_span(transaction, span)),
            ExecutorKind::Prepare => Box::new(PrepareExecutor::with_span(
                transaction,
                Arc::new(DefaultPool::new()),
                span,
            )),
        })
    }

    /// Opens a session over a new connection.
    pub fn new_session(&self) -> Result<SqliteSession> {
        Ok(SqliteSession {
            conn: Mutex::new(connect(&self.config)?),
            closed: AtomicBool::new(false),
        })
    }
}

fn connect(config: &SqliteConfig) -> Result<Connection> {
    let conn = Connection::open(&config.path)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    for pragma in &config.pragmas {
        // Some pragmas answer with a row, so step through instead of execute.
        let mut stmt = conn.prepare(&format!("PRAGMA {}", pragma))?;
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
    }
    Ok(conn)
}
