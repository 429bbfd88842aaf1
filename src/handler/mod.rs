/// Handler Module
///
/// A handler is the capability object statements are issued through. It is
/// bound either to the base connection ("plain") or to one open transaction
/// ("transactional"). Handlers are compared by identity, never by content:
/// every handler carries a process-unique `HandlerId`, and the statement pool
/// keys its cache on that id.
pub mod pool;

pub use pool::{DefaultPool, StatementPool};

use crate::core::{Context, Result, Value};
use crate::resultset::ResultSet;
use crate::statement::Statement;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a handler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocates a fresh id. Two calls never return the same id.
    pub fn next() -> Self {
        HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Capability for issuing prepare/query/execute.
pub trait Handler: Send + Sync {
    /// Identity used as the statement cache key.
    fn id(&self) -> HandlerId;

    fn prepare(&self, ctx: &Context, sql: &str) -> Result<Arc<dyn Statement>>;

    fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>>;

    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Box<dyn ResultSet>>;
}

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;
