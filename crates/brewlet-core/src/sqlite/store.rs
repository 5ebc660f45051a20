use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{MigrationStore, PersistenceResult, SettingsStore};
use crate::sqlite::migrations::{current_schema_version, migrations};

const MIGRATIONS_TABLE: &str = "brewlet_schema_migrations";

/// Settings persistence backed by a single SQLite file. Each call opens its own connection.
pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    /// Opens the store and brings the schema to the latest version.
    pub fn open(database_path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let store = Self::new(database_path);
        store.migrate_to_latest()?;
        Ok(store)
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn migrate_to_latest(&self) -> PersistenceResult<()> {
        let latest = current_schema_version();
        let recorded = self.current_version()?;
        if recorded > latest {
            return Err(storage_error_text(
                "migrate",
                format!(
                    "database schema version {recorded} is newer than the supported version {latest}"
                ),
            ));
        }

        self.with_connection("migrate", |connection| {
            let transaction = connection.transaction()?;
            for migration in migrations() {
                // Steps are idempotent DDL; recorded versions with missing tables are rebuilt.
                transaction.execute_batch(migration.sql)?;
                if migration.version > recorded {
                    tracing::debug!(version = migration.version, name = migration.name, "applying settings migration");
                    transaction.execute(
                        &format!(
                            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
                             VALUES (?1, ?2, strftime('%s', 'now'))"
                        ),
                        (migration.version, migration.name),
                    )?;
                }
            }
            transaction.commit()
        })
    }
}

impl SettingsStore for SqliteStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        self.with_connection("get_setting", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "SELECT value FROM app_settings WHERE key = ?1",
                    [key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
        })
    }

    fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        if key.trim().is_empty() {
            return Err(storage_error_text("set_setting", "setting key must not be empty"));
        }

        self.with_connection("set_setting", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                (key, value),
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> PersistenceResult<()> {
        self.with_connection("remove_setting", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM app_settings WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    fn list(&self) -> PersistenceResult<Vec<(String, String)>> {
        self.with_connection("list_settings", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement =
                connection.prepare("SELECT key, value FROM app_settings ORDER BY key ASC")?;
            let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    if read_current_version(connection)? <= 0 {
        return Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
            std::io::Error::other("settings schema is not initialized; open the store first"),
        )));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError {
        operation: None,
        kind: CoreErrorKind::StorageFailure,
        message: format!("sqlite {operation} failed: {}", message.as_ref()),
    }
}
