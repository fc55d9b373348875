//! STRATA Test Utilities
//!
//! Shared test infrastructure for the STRATA workspace:
//! - A temporary on-disk store with the reference schema
//! - Deterministic owner id generators
//! - Proptest generators for payload pieces
//! - Assertions over envelopes and index contiguity

pub use strata_core::{
    Catalog, Envelope, IdGenerator, KeyConvention, OwnerId, Status, StrataResult, Tool,
};
pub use strata_storage::{Database, Session};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Reference schema: a Registry plus two data relations.
pub const REFERENCE_SCHEMA: &str = r#"
CREATE TABLE Registry (OwnerID TEXT PRIMARY KEY);
CREATE TABLE Contacts (
    OwnerID TEXT NOT NULL,
    "Index" INTEGER NOT NULL,
    first_name TEXT,
    middle_name TEXT,
    last_name TEXT,
    PRIMARY KEY (OwnerID, "Index")
);
CREATE TABLE Notes (
    OwnerID TEXT NOT NULL,
    "Index" INTEGER NOT NULL,
    subject TEXT,
    body TEXT,
    PRIMARY KEY (OwnerID, "Index")
);
"#;

// ============================================================================
// TEST STORE
// ============================================================================

/// SQLite file in a temporary directory, removed on drop.
pub struct TestStore {
    _dir: TempDir,
    path: PathBuf,
    db: Arc<Database>,
}

impl TestStore {
    /// Store with [`REFERENCE_SCHEMA`].
    pub fn new() -> Self {
        Self::with_schema(REFERENCE_SCHEMA, &KeyConvention::default())
    }

    /// Store with custom DDL. Panics if the schema does not load.
    pub fn with_schema(ddl: &str, convention: &KeyConvention) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("strata-test.db");
        {
            let conn = rusqlite::Connection::open(&path).expect("open test db");
            conn.execute_batch(ddl).expect("apply test schema");
        }
        let db = Database::open_path(&path, convention, Duration::from_secs(5))
            .expect("load test catalog");
        Self {
            _dir: dir,
            path,
            db: Arc::new(db),
        }
    }

    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.db.catalog()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only closure in its own session.
    pub fn with_session<T>(&self, f: impl FnOnce(&Session<'_>) -> StrataResult<T>) -> T {
        self.db.session(f).expect("test session")
    }

    pub fn owner_exists(&self, owner: &str) -> bool {
        self.with_session(|s| Ok(s.owner_exists(owner)?))
    }

    /// Index column values of the owner's rows in `table`, ascending.
    pub fn indexes(&self, table: &str, owner: &str) -> Vec<i64> {
        self.with_session(|s| Ok(s.indexes(table, owner)?))
    }

    pub fn row_count(&self, table: &str, owner: &str) -> usize {
        self.indexes(table, owner).len()
    }

    /// Insert rows directly, bypassing the handlers.
    pub fn seed(&self, owner: &str, table: &str, fields: &[&str], rows: &[Vec<serde_json::Value>]) {
        self.with_session(|s| {
            if !s.owner_exists(owner)? {
                s.register_owner(owner)?;
            }
            let start = s.next_index(table, owner)?;
            for (offset, row) in rows.iter().enumerate() {
                s.insert_row(table, owner, start + offset as i64, fields, row)?;
            }
            Ok(())
        })
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ID GENERATORS
// ============================================================================

/// Yields `owner-0` `repeats` times, then `owner-1` `repeats` times, and so
/// on. Exercises the create handler's collision retry.
#[derive(Debug)]
pub struct RepeatingIdGenerator {
    repeats: usize,
    calls: AtomicUsize,
}

impl RepeatingIdGenerator {
    pub fn new(repeats: usize) -> Self {
        Self {
            repeats: repeats.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdGenerator for RepeatingIdGenerator {
    fn next_id(&self) -> OwnerId {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        format!("owner-{}", n / self.repeats)
    }
}

/// Replays a fixed script of ids, then the last one forever.
#[derive(Debug)]
pub struct ScriptedIdGenerator {
    script: Mutex<Vec<OwnerId>>,
    last: OwnerId,
}

impl ScriptedIdGenerator {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OwnerId>,
    {
        let mut script: Vec<OwnerId> = ids.into_iter().map(Into::into).collect();
        let last = script.last().cloned().unwrap_or_default();
        script.reverse();
        Self {
            script: Mutex::new(script),
            last,
        }
    }
}

impl IdGenerator for ScriptedIdGenerator {
    fn next_id(&self) -> OwnerId {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop())
            .unwrap_or_else(|| self.last.clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for payload pieces.

    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Short printable text cell.
    pub fn arb_text() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 ]{0,12}"
    }

    /// `[subject, body]` tuple for the Notes relation.
    pub fn arb_note_row() -> impl Strategy<Value = Vec<Value>> {
        (arb_text(), arb_text()).prop_map(|(s, b)| vec![json!(s), json!(b)])
    }

    /// Operation against one owner's Notes rows.
    #[derive(Debug, Clone)]
    pub enum NoteOp {
        /// Append this many rows
        Create(usize),
        /// Update the row at `position % len`
        Update(usize),
        /// Append one row through an update placeholder
        UpdateInsert,
        /// Delete the rows at these positions (each taken `% len`)
        Delete(Vec<usize>),
    }

    pub fn arb_note_op() -> impl Strategy<Value = NoteOp> {
        prop_oneof![
            (1usize..4).prop_map(NoteOp::Create),
            any::<usize>().prop_map(NoteOp::Update),
            Just(NoteOp::UpdateInsert),
            proptest::collection::vec(any::<usize>(), 1..4).prop_map(NoteOp::Delete),
        ]
    }

    pub fn arb_note_ops() -> impl Strategy<Value = Vec<NoteOp>> {
        proptest::collection::vec(arb_note_op(), 1..10)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions shared by integration tests.

    use super::*;

    pub fn assert_status<A: std::fmt::Debug>(envelope: &Envelope<A>, expected: Status) {
        assert_eq!(
            envelope.status, expected,
            "unexpected status, envelope: {:?}",
            envelope
        );
    }

    pub fn assert_success<A: std::fmt::Debug>(envelope: &Envelope<A>) {
        assert_status(envelope, Status::Success);
        assert!(envelope.errors.is_empty());
    }

    /// Index values of the owner's rows in `table` are exactly `0..n`.
    pub fn assert_contiguous(store: &TestStore, table: &str, owner: &str) {
        let indexes = store.indexes(table, owner);
        let expected: Vec<i64> = (0..indexes.len() as i64).collect();
        assert_eq!(indexes, expected, "indexes of {} in {} not contiguous", owner, table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_store_loads() {
        let store = TestStore::new();
        let catalog = store.catalog();
        assert_eq!(catalog.tables(), ["Registry", "Contacts", "Notes"]);
        assert!(store.path().exists());
    }

    #[test]
    fn test_repeating_generator() {
        let gen = RepeatingIdGenerator::new(3);
        let ids: Vec<_> = (0..7).map(|_| gen.next_id()).collect();
        assert_eq!(ids[0], "owner-0");
        assert_eq!(ids[2], "owner-0");
        assert_eq!(ids[3], "owner-1");
        assert_eq!(ids[6], "owner-2");
        assert_eq!(gen.calls(), 7);
    }

    #[test]
    fn test_scripted_generator_repeats_last() {
        let gen = ScriptedIdGenerator::new(["a", "b"]);
        assert_eq!(gen.next_id(), "a");
        assert_eq!(gen.next_id(), "b");
        assert_eq!(gen.next_id(), "b");
    }

    #[test]
    fn test_seed_appends() {
        let store = TestStore::new();
        store.seed("u1", "Notes", &["subject"], &[vec![serde_json::json!("a")]]);
        store.seed("u1", "Notes", &["subject"], &[vec![serde_json::json!("b")]]);
        assert!(store.owner_exists("u1"));
        assert_eq!(store.indexes("Notes", "u1"), vec![0, 1]);
    }
}
