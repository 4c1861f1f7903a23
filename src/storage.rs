use std::sync::Arc;

use inventario_memory::InMemoryStorage;
use inventario_postgres::PostgresStorage;
use inventario_sqlite::SqliteStorage;

use crate::config::{BackendKind, DatabaseConfig};

// Re-export core storage types so handlers can use crate::storage::*
pub use inventario_core::storage::{Page, StorageBackend, StorageError};

/// Builds the configured backend and materializes its schema.
///
/// Blocking: the PostgreSQL client drives its own runtime, so call this from
/// a plain thread or `spawn_blocking`.
pub fn open_storage(config: &DatabaseConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let storage: Arc<dyn StorageBackend> = match config.backend {
        BackendKind::Memory => Arc::new(InMemoryStorage::new()),
        BackendKind::Sqlite => Arc::new(SqliteStorage::new(&config.url)?),
        BackendKind::Postgres => Arc::new(PostgresStorage::new(&config.url)?),
    };
    storage.materialize_schema()?;
    tracing::info!(backend = ?config.backend, "Storage ready");
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sqlite_in_memory() {
        let config = DatabaseConfig {
            backend: BackendKind::Sqlite,
            url: ":memory:".to_string(),
        };
        let storage = open_storage(&config).unwrap();
        assert!(storage.list_productos(Page::new(0, 10)).unwrap().is_empty());
    }

    #[test]
    fn test_open_postgres_unreachable_is_unavailable() {
        let config = DatabaseConfig {
            backend: BackendKind::Postgres,
            url: "host=127.0.0.1 port=1 user=nobody connect_timeout=1".to_string(),
        };
        assert!(matches!(open_storage(&config), Err(StorageError::Unavailable(_))));
    }
}
