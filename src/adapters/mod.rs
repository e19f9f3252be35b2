pub mod memory_storage;
pub mod postgres_storage;

pub use memory_storage::{MemoryStorage, MemoryTransaction};
pub use postgres_storage::{PgTransactionStorage, PostgresStorage};
