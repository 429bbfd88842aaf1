/// Core Module for datarail
///
/// This module contains the shared infrastructure every other component
/// builds on: the error taxonomy, the cancellation context and the dynamic
/// raw value produced by result sets.

pub mod context;
pub mod error;
pub mod value;

// Re-export commonly used types for convenience
pub use context::Context;
pub use error::{DataError, ErrorKind, Result};
pub use value::{Value, ValueKind};
