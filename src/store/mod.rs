//! Storage seams: `async_trait`-based stores with in-memory and SQLite backends.

pub mod definition;
pub mod definition_sqlite;
pub mod instance;
pub mod instance_sqlite;

pub use definition::{DefinitionStore, InMemoryDefinitionStore};
pub use definition_sqlite::SqliteDefinitionStore;
pub use instance::{InMemoryInstanceStore, InstancePatch, InstanceStore};
pub use instance_sqlite::SqliteInstanceStore;
