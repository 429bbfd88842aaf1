/// Drivers Module
///
/// Concrete data sources implementing the handler, statement and transaction
/// provider traits.
pub mod sqlite;

pub use sqlite::SqliteDataSource;
