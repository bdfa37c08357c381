pub mod connection;
pub mod memory;
pub mod store;
pub mod tls;

pub use connection::{
    retry_with_backoff, ConnectionManager, DatabaseConfig, ManagedConnection, RetriesExhausted, RetryPolicy,
};
pub use memory::MemoryStore;
pub use store::{PgStore, SchemaStore};
pub use tls::{TlsConfig, TlsMode};
