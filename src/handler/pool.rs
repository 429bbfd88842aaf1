/// Statement Pool Module
///
/// Caches prepared statements per (handler identity, statement text) so that a
/// handler re-running the same text skips preparation. Entries are indexed per
/// handler so everything a transactional handler prepared can be purged in one
/// step when its transaction ends.
use crate::handler::{Handler, HandlerId};
use crate::statement::Statement;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Cache of prepared statements keyed by handler identity and statement text.
pub trait StatementPool: Send + Sync {
    /// Looks up the statement `handler` prepared for `sql`.
    fn get(&self, handler: &dyn Handler, sql: &str) -> Option<Arc<dyn Statement>>;

    /// Stores `stmt` as the statement for (`handler`, `sql`).
    fn put(&self, handler: &dyn Handler, sql: &str, stmt: Arc<dyn Statement>);

    /// Closes and removes every statement cached for `handler`.
    fn purge(&self, handler: &dyn Handler);

    /// Closes and removes every cached statement.
    fn purge_all(&self);
}

#[derive(Default)]
struct HandlerEntries {
    statements: HashMap<String, Arc<dyn Statement>>,
    /// Statements replaced by a concurrent `put` for the same text. They may
    /// still be in use by the caller that prepared them, so they are only
    /// closed when the handler is purged.
    displaced: Vec<Arc<dyn Statement>>,
}

impl HandlerEntries {
    fn close_all(self, id: HandlerId) {
        let count = self.statements.len() + self.displaced.len();
        for stmt in self.statements.into_values().chain(self.displaced) {
            if let Err(e) = stmt.close() {
                warn!("failed to close cached statement of {}: {}", id, e);
            }
        }
        debug!("purged {} statements of {}", count, id);
    }
}

/// `RwLock`-guarded statement pool. Lookups share the lock; inserts and purges
/// take it exclusively.
#[derive(Default)]
pub struct DefaultPool {
    entries: RwLock<HashMap<HandlerId, HandlerEntries>>,
}

impl DefaultPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-displaced) statements across all handlers.
    pub fn len(&self) -> usize {
        self.read().values().map(|e| e.statements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live statements cached for one handler.
    pub fn len_for(&self, handler: &dyn Handler) -> usize {
        self.read()
            .get(&handler.id())
            .map(|e| e.statements.len())
            .unwrap_or(0)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<HandlerId, HandlerEntries>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<HandlerId, HandlerEntries>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl StatementPool for DefaultPool {
    fn get(&self, handler: &dyn Handler, sql: &str) -> Option<Arc<dyn Statement>> {
        self.read()
            .get(&handler.id())
            .and_then(|e| e.statements.get(sql))
            .cloned()
    }

    fn put(&self, handler: &dyn Handler, sql: &str, stmt: Arc<dyn Statement>) {
        let mut entries = self.write();
        let slot = entries.entry(handler.id()).or_default();
        if let Some(previous) = slot.statements.insert(sql.to_string(), stmt.clone()) {
            if !Arc::ptr_eq(&previous, &stmt) {
                slot.displaced.push(previous);
            }
        }
    }

    fn purge(&self, handler: &dyn Handler) {
        let id = handler.id();
        let removed = self.write().remove(&id);
        // Close outside the lock; closing may block on the driver.
        if let Some(entries) = removed {
            entries.close_all(id);
        }
    }

    fn purge_all(&self) {
        let drained: Vec<_> = self.write().drain().collect();
        for (id, entries) in drained {
            entries.close_all(id);
        }
    }
}
