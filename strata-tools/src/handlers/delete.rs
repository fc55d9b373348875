//! `delete`: targeted row removal or a full owner wipe
//!
//! Every `(relation, owner)` pair that lost a row is reindexed once, after
//! all deletions of the request have run.

use super::{bump, ErrorLog, TableCounts};
use crate::registry::ToolHandler;
use serde::Serialize;
use serde_json::Value;
use strata_core::{
    parse_entries, Catalog, DeleteEntry, Envelope, OwnerId, StrataResult, Tool, ValidationError,
};
use strata_storage::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reindexed {
    pub table: String,
    pub owner: OwnerId,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteAction {
    pub deleted_rows: TableCounts,
    pub removed_owners: Vec<OwnerId>,
    pub reindexed: Vec<Reindexed>,
}

pub struct DeleteHandler;

impl DeleteHandler {
    fn wipe(
        owner: &str,
        session: &Session<'_>,
        catalog: &Catalog,
        action: &mut DeleteAction,
        errors: &mut ErrorLog,
    ) {
        for table in catalog.data_tables() {
            match session.delete_owner_rows(table, owner) {
                Ok(n) => bump(&mut action.deleted_rows, table, n),
                Err(e) => errors.push(format!("owner '{}' table '{}': {}", owner, table, e)),
            }
        }
        match session.unregister_owner(owner) {
            Ok(0) => {}
            Ok(_) => action.removed_owners.push(owner.to_string()),
            Err(e) => errors.push(format!("owner '{}': {}", owner, e)),
        }
    }

    fn targeted(
        owner: &str,
        entry: &DeleteEntry,
        session: &Session<'_>,
        catalog: &Catalog,
        action: &mut DeleteAction,
        touched: &mut Vec<(String, OwnerId)>,
        errors: &mut ErrorLog,
    ) {
        if entry.targets.len() != entry.index.len() {
            errors.push(ValidationError::LengthMismatch {
                context: format!("delete of owner '{}' where/IND", owner),
                expected: entry.targets.len(),
                got: entry.index.len(),
            });
            return;
        }

        for (table, token) in entry.targets.iter().zip(&entry.index) {
            if let Err(e) = catalog.data_table(table) {
                errors.push(format!("owner '{}': {}", owner, e));
                continue;
            }
            let index = match token.position(table) {
                Ok(i) => i,
                Err(e) => {
                    errors.push(format!("owner '{}': {}", owner, e));
                    continue;
                }
            };
            match session.delete_row(table, owner, index) {
                Ok(0) => {}
                Ok(n) => {
                    bump(&mut action.deleted_rows, table, n);
                    if !touched.iter().any(|(t, o)| t == table && o == owner) {
                        touched.push((table.clone(), owner.to_string()));
                    }
                }
                Err(e) => errors.push(format!("owner '{}' table '{}': {}", owner, table, e)),
            }
        }
    }
}

impl ToolHandler for DeleteHandler {
    fn handle(
        &self,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> StrataResult<Envelope> {
        let entries = match parse_entries::<DeleteEntry>(payload, Tool::Delete) {
            Ok(entries) => entries,
            Err(e) => return Ok(Envelope::failed(e.to_string())),
        };

        let mut action = DeleteAction::default();
        let mut errors = ErrorLog::new(Tool::Delete.name());
        let mut touched: Vec<(String, OwnerId)> = Vec::new();

        for (owner, entry) in entries {
            match entry {
                Ok(entry) if entry.is_wipe() => {
                    Self::wipe(&owner, session, catalog, &mut action, &mut errors)
                }
                Ok(entry) => Self::targeted(
                    &owner,
                    &entry,
                    session,
                    catalog,
                    &mut action,
                    &mut touched,
                    &mut errors,
                ),
                Err(e) => errors.push(e),
            }
        }

        for (table, owner) in touched {
            match session.reindex(&table, &owner) {
                Ok(rows) => action.reindexed.push(Reindexed { table, owner, rows }),
                Err(e) => errors.push(format!("reindex of '{}' for owner '{}': {}", table, owner, e)),
            }
        }

        let did_work = !action.deleted_rows.is_empty() || !action.removed_owners.is_empty();
        tracing::debug!(
            deleted = action.deleted_rows.values().sum::<usize>(),
            removed_owners = action.removed_owners.len(),
            reindexed = action.reindexed.len(),
            "Delete handled"
        );
        Ok(Envelope::new(action, errors.into_vec(), did_work).erase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::Status;
    use strata_test_utils::assertions::assert_contiguous;
    use strata_test_utils::TestStore;

    fn run(store: &TestStore, payload: Value) -> Envelope {
        let catalog = store.catalog();
        store.with_session(|s| DeleteHandler.handle(&payload, s, &catalog))
    }

    fn seeded() -> TestStore {
        let store = TestStore::new();
        let notes: Vec<Vec<Value>> = (0..5).map(|i| vec![json!(format!("n{}", i))]).collect();
        store.seed("u1", "Notes", &["subject"], &notes);
        store.seed("u1", "Contacts", &["first_name"], &[vec![json!("John")]]);
        store
    }

    #[test]
    fn test_targeted_delete_reindexes_once() {
        let store = seeded();
        let env = run(
            &store,
            json!({"u1": {"where": ["Notes", "Notes", "Notes"], "IND": [1, 3, "7"]}}),
        );
        assert_eq!(env.status, Status::Success, "{:?}", env);
        assert_eq!(env.action["deleted_rows"]["Notes"], 2);
        assert_eq!(
            env.action["reindexed"],
            json!([{"table": "Notes", "owner": "u1", "rows": 3}])
        );
        assert_contiguous(&store, "Notes", "u1");

        let subjects: Vec<Value> = store
            .with_session(|s| Ok(s.select_rows("Notes", "u1")?))
            .into_iter()
            .map(|r| r[2].clone())
            .collect();
        assert_eq!(subjects, vec![json!("n0"), json!("n2"), json!("n4")]);
    }

    #[test]
    fn test_wipe_is_idempotent() {
        let store = seeded();
        let first = run(&store, json!({"u1": {"where": ["all"]}}));
        assert_eq!(first.status, Status::Success);
        assert_eq!(first.action["removed_owners"], json!(["u1"]));
        assert_eq!(first.action["deleted_rows"]["Notes"], 5);
        assert!(!store.owner_exists("u1"));

        let second = run(&store, json!({"u1": {"where": ["all"]}}));
        assert_eq!(second.status, Status::Success);
        assert!(second.errors.is_empty());
        assert_eq!(second.action["deleted_rows"], json!({}));
        assert_eq!(second.action["removed_owners"], json!([]));
    }

    #[test]
    fn test_validation_errors() {
        let store = seeded();
        let env = run(
            &store,
            json!({
                "u1": {"where": ["Registry", "Ghosts", "Notes", "Notes"], "IND": [0, 0, "first", 0]},
                "u2": {"where": ["Notes"], "IND": []}
            }),
        );
        assert_eq!(env.status, Status::Partial);
        assert_eq!(env.errors.len(), 4, "{:?}", env.errors);
        assert_eq!(store.row_count("Notes", "u1"), 4);
        assert_contiguous(&store, "Notes", "u1");
    }

    #[test]
    fn test_removing_last_row_keeps_owner() {
        let store = seeded();
        let env = run(&store, json!({"u1": {"where": ["Contacts"], "IND": [0]}}));
        assert_eq!(env.status, Status::Success);
        assert!(store.owner_exists("u1"));
        assert_eq!(store.row_count("Contacts", "u1"), 0);
    }
}
