pub mod in_memory;

pub use in_memory::InMemorySettingsStore;

use crate::models::CoreError;

pub type PersistenceResult<T> = Result<T, CoreError>;

/// Forward-only schema versioning. A database written by a newer build is refused.
pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn migrate_to_latest(&self) -> PersistenceResult<()>;
}

/// Flat key-value preferences. Typed access lives in [`crate::models::Settings`].
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PersistenceResult<()>;

    fn remove(&self, key: &str) -> PersistenceResult<()>;

    fn list(&self) -> PersistenceResult<Vec<(String, String)>>;
}
