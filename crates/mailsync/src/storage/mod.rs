//! Storage layer: trait abstraction plus in-memory and SQLite backends

mod memory;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::MailStore;
