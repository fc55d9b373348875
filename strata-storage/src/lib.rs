//! STRATA Storage Layer
//!
//! SQLite access for the owner-keyed data model. A [`Database`] owns the one
//! connection and the catalog computed at open time; all work happens inside
//! a [`Session`], which wraps a transaction that is committed exactly once.

pub mod predicate;
pub mod rows;
pub mod schema;
pub mod sql;

pub use predicate::{compile, search, CompiledQuery, CompiledSearch, SearchOutcome};
pub use schema::load_catalog;

use rusqlite::{Connection, Transaction};
use sql::sqlite_err;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::{Catalog, KeyConvention, StorageError, StrataConfig, StrataResult};

// ============================================================================
// DATABASE
// ============================================================================

/// Shared handle to the SQLite store.
///
/// The connection sits behind a mutex; [`Database::session`] is the single
/// serialization point for every caller.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    catalog: Arc<Catalog>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the database named by `config` and load its catalog.
    pub fn open(config: &StrataConfig) -> StrataResult<Self> {
        config.validate()?;
        let path = config.database_path()?;
        Self::open_path(&path, &config.convention, config.busy_timeout)
    }

    /// Open a database file directly.
    pub fn open_path(
        path: &Path,
        convention: &KeyConvention,
        busy_timeout: Duration,
    ) -> StrataResult<Self> {
        let open_err = |e: rusqlite::Error| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let conn = Connection::open(path).map_err(open_err)?;
        conn.busy_timeout(busy_timeout).map_err(open_err)?;
        let mut db = Self::from_connection(conn, convention)?;
        db.path = Some(path.to_path_buf());
        Ok(db)
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: Connection, convention: &KeyConvention) -> StrataResult<Self> {
        let catalog = load_catalog(&conn, convention)?;
        Ok(Self {
            conn: Mutex::new(conn),
            catalog: Arc::new(catalog),
            path: None,
        })
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` inside one transaction and commit once.
    ///
    /// If `f` returns `Err` the transaction is rolled back.
    pub fn session<T, F>(&self, f: F) -> StrataResult<T>
    where
        F: FnOnce(&Session<'_>) -> StrataResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        let tx = conn.transaction().map_err(sqlite_err)?;
        let session = Session {
            tx,
            catalog: &self.catalog,
        };
        let out = f(&session)?;
        session.tx.commit().map_err(|e| {
            tracing::error!(error = %e, "Commit failed");
            sqlite_err(e)
        })?;
        Ok(out)
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// One open transaction plus the catalog it was opened against.
///
/// Handlers run against a session but never commit it.
pub struct Session<'a> {
    tx: Transaction<'a>,
    catalog: &'a Catalog,
}

impl<'a> Session<'a> {
    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tables", &self.catalog.tables())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::StrataError;

    fn memory_db() -> Database {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE Registry (OwnerID TEXT PRIMARY KEY);
            CREATE TABLE Notes (OwnerID TEXT, "Index" INTEGER, body TEXT,
                PRIMARY KEY (OwnerID, "Index"));
            "#,
        )
        .unwrap();
        Database::from_connection(conn, &KeyConvention::default()).unwrap()
    }

    #[test]
    fn test_session_commits_on_ok() {
        let db = memory_db();
        db.session(|s| Ok(s.register_owner("u1")?)).unwrap();
        let exists = db.session(|s| Ok(s.owner_exists("u1")?)).unwrap();
        assert!(exists);
    }

    #[test]
    fn test_session_rolls_back_on_err() {
        let db = memory_db();
        let result: StrataResult<()> = db.session(|s| {
            s.register_owner("u1")?;
            Err(StorageError::LockPoisoned.into())
        });
        assert!(matches!(result, Err(StrataError::Storage(_))));
        let exists = db.session(|s| Ok(s.owner_exists("u1")?)).unwrap();
        assert!(!exists);
    }

    #[test]
    fn test_open_path_reports_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let err = Database::open_path(&path, &KeyConvention::default(), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, StrataError::Schema(_)));
    }
}
