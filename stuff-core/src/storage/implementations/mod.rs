//! Storage backends
//!
//! - `sqlite` - catalogue, tag and asset rows
//! - `fs` - blob bytes

pub mod fs;
pub mod sqlite;

pub use fs::FsBlobStore;
pub use sqlite::{SqliteStorage, SqliteStore};
