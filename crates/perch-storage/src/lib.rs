//! Perch Storage Layer
//!
//! SQLite-based persistence for account and client state.
//! Multi-row writes go through `Database::transaction` so a reader never
//! observes a half-written snapshot.

mod database;
mod error;
mod migrations;

pub use database::{read_setting, remove_setting, write_setting, Database};
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
