// kanstore - Concurrent kanban board store with JSON snapshot persistence

pub mod config;
pub mod error;
pub mod models;
pub mod persister;
pub mod record;
pub mod snapshot;
pub mod store;

// Re-export main types for convenience
pub use config::Config;
pub use error::StoreError;
pub use models::{Category, CategoryPatch, Task, TaskPatch, new_id};
pub use persister::Persister;
pub use record::Record;
pub use snapshot::Snapshot;
pub use store::{Board, Store};
