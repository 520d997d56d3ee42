pub mod bootstrap;
pub mod connection;
pub mod kv;
pub mod migrations;
pub mod persister;

pub use bootstrap::{init_tracing, Session, SessionError};
pub use connection::{connect, DbPool};
pub use kv::{InMemoryKeyValueStore, KeyValueStore, SqliteKeyValueStore, StorageError};
pub use persister::spawn_persister;
