/// Transaction Module
///
/// This module defines the transaction state machine contract and the
/// collaborator traits a data source implements to take part in it.
///
/// ## State machine
///
/// ```text
///   Unknown --begin--> Begin --commit--> Committing --ok--> Unknown
///                        ^  \--rollback--> Rollbacking --ok--> Unknown
///                        |                    |
///                        +------ I/O error ---+
/// ```
///
/// Transitions out of `Unknown` and `Begin` are compare-and-swap operations, so
/// of several concurrent callers exactly one wins the right to perform the
/// begin/commit/rollback I/O. The live transaction resource is guarded by a
/// separate short-lived lock that is never held across that I/O.
mod managed;

pub use managed::DefaultTransaction;

use crate::core::{Context, Result};
use crate::handler::HandlerRef;

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    /// No transaction in progress
    Unknown = 0,
    /// Transaction open
    Begin = 1,
    /// Commit in flight
    Committing = 2,
    /// Rollback in flight
    Rollbacking = 4,
}

impl TransactionState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TransactionState::Begin,
            2 => TransactionState::Committing,
            4 => TransactionState::Rollbacking,
            _ => TransactionState::Unknown,
        }
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        TransactionState::Unknown
    }
}

/// Callback invoked with the transactional handler after a successful
/// begin/commit/rollback.
pub type SuccessCallback<'a> = &'a dyn Fn(&HandlerRef) -> Result<()>;

/// Arbitrates begin/commit/rollback for one unit of work.
pub trait Transaction: Send + Sync {
    /// Releases held resources. Idempotent; the state field is left as is.
    fn close(&self) -> Result<()>;

    /// Liveness check against the base connection.
    fn ping(&self, ctx: &Context) -> bool;

    /// The transactional handler while a transaction is open, the plain
    /// handler otherwise. `None` once the transaction has been closed.
    fn handler(&self) -> Option<HandlerRef>;

    fn begin(&self, ctx: &Context, on_success: Option<SuccessCallback<'_>>) -> Result<()>;

    fn commit(&self, ctx: &Context, on_success: Option<SuccessCallback<'_>>) -> Result<()>;

    fn rollback(&self, ctx: &Context, on_success: Option<SuccessCallback<'_>>) -> Result<()>;

    fn state(&self) -> TransactionState;
}

/// Data-source side of a transaction: hands out the plain handler and opens
/// transaction resources.
pub trait TransactionProvider: Send + Sync {
    /// Handler bound to the base connection.
    fn handler(&self) -> HandlerRef;

    /// Opens a new transaction against the data source.
    fn begin(&self, ctx: &Context) -> Result<Box<dyn TxResource>>;

    fn ping(&self, ctx: &Context) -> bool;
}

/// One open transaction at the data source.
pub trait TxResource: Send + Sync {
    /// Handler bound to this transaction. Must return the same handler (same
    /// identity) for the whole lifetime of the resource.
    fn handler(&self) -> HandlerRef;

    fn commit(&self, ctx: &Context) -> Result<()>;

    fn rollback(&self, ctx: &Context) -> Result<()>;
}
