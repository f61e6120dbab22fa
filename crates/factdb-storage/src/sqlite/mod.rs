//! SQLite-backed storage engine.

pub mod changesets;
pub mod doctor;
pub mod hints;
pub mod history;
pub mod items;
pub mod schema;
pub mod store;

pub use store::SqliteStore;
