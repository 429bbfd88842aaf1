// Core infrastructure modules
pub mod core;
pub mod config;

// Data-access layers
pub mod resultset;
pub mod statement;
pub mod handler;
pub mod transaction;
pub mod executor;
pub mod session;
pub mod interceptor;
pub mod mapping;

// Concrete data sources
pub mod drivers;

#[cfg(test)]
mod test_utils;

pub use crate::core::{Context, DataError, ErrorKind, Result, Value};
pub use crate::executor::{Executor, ExecutorKind};
pub use crate::session::Session;
pub use crate::mapping::{get_value, scan_rows, Mapped};
