//! `update`: edit existing rows in place or append rows through
//! `new…` placeholders

use super::{bump, ErrorLog, TableCounts};
use crate::registry::ToolHandler;
use serde::Serialize;
use serde_json::Value;
use strata_core::{
    parse_entries, Catalog, Envelope, IndexRef, StorageError, StrataResult, Tool, UpdateEntry,
    ValidationError,
};
use strata_storage::Session;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateAction {
    pub updates: TableCounts,
    pub inserts: TableCounts,
}

pub struct UpdateHandler;

/// Members sharing one placeholder, merged into a single new row.
#[derive(Debug)]
struct PendingRow {
    table: String,
    label: String,
    fields: Vec<String>,
    values: Vec<Value>,
}

impl UpdateHandler {
    fn apply_owner(
        owner: &str,
        entry: UpdateEntry,
        session: &Session<'_>,
        catalog: &Catalog,
        action: &mut UpdateAction,
        errors: &mut ErrorLog,
    ) -> bool {
        let mut did_work = false;
        let n = entry.table.len();
        if entry.field.len() != n || entry.index.len() != n || entry.value.len() != n {
            errors.push(ValidationError::LengthMismatch {
                context: format!("update of owner '{}' table/field/IND/value", owner),
                expected: n,
                got: [entry.field.len(), entry.index.len(), entry.value.len()]
                    .into_iter()
                    .find(|len| *len != n)
                    .unwrap_or(n),
            });
            return false;
        }

        let mut pending: Vec<PendingRow> = Vec::new();
        let quads = entry
            .table
            .into_iter()
            .zip(entry.field)
            .zip(entry.index)
            .zip(entry.value);

        for (((table, fields), indexes), values) in quads {
            if let Err(e) = catalog.data_table(&table) {
                errors.push(format!("owner '{}': {}", owner, e));
                continue;
            }
            if fields.len() != indexes.len() || fields.len() != values.len() {
                errors.push(ValidationError::LengthMismatch {
                    context: format!("update of owner '{}' table '{}'", owner, table),
                    expected: fields.len(),
                    got: if fields.len() != indexes.len() {
                        indexes.len()
                    } else {
                        values.len()
                    },
                });
                continue;
            }

            // One unknown or key field rejects every member of the quadruple.
            // Repeats are allowed here; merged placeholder rows are checked
            // for duplicates on their own.
            let mut named: Vec<String> = Vec::new();
            for name in fields.iter().flat_map(|f| f.clone().into_vec()) {
                if !named.contains(&name) {
                    named.push(name);
                }
            }
            if let Err(e) = catalog.check_payload_fields(&table, &named) {
                errors.push(format!("owner '{}': {}", owner, e));
                continue;
            }

            for ((names, token), vals) in fields.into_iter().zip(indexes).zip(values) {
                let names = names.into_vec();
                let vals = vals.into_vec();
                if names.len() != vals.len() {
                    errors.push(ValidationError::ArityMismatch {
                        context: format!("update of owner '{}' table '{}'", owner, table),
                        fields: names.len(),
                        values: vals.len(),
                    });
                    continue;
                }
                if let Err(e) = catalog.check_payload_fields(&table, &names) {
                    errors.push(format!("owner '{}': {}", owner, e));
                    continue;
                }

                match token.resolve(&table) {
                    Ok(IndexRef::Existing(index)) => {
                        match session.update_row(&table, owner, index, &names, &vals) {
                            Ok(0) => errors.push(StorageError::NoRow {
                                table: table.clone(),
                                owner: owner.to_string(),
                                index,
                            }),
                            Ok(affected) => {
                                did_work = true;
                                bump(&mut action.updates, &table, affected);
                            }
                            Err(e) => errors.push(format!("owner '{}' table '{}': {}", owner, table, e)),
                        }
                    }
                    Ok(IndexRef::Pending(label)) => {
                        match pending
                            .iter_mut()
                            .find(|p| p.table == table && p.label == label)
                        {
                            Some(row) => {
                                row.fields.extend(names);
                                row.values.extend(vals);
                            }
                            None => pending.push(PendingRow {
                                table: table.clone(),
                                label: label.to_string(),
                                fields: names,
                                values: vals,
                            }),
                        }
                    }
                    Err(e) => errors.push(format!("owner '{}': {}", owner, e)),
                }
            }
        }

        for row in pending {
            if let Err(e) = catalog.check_payload_fields(&row.table, &row.fields) {
                errors.push(format!("owner '{}' row '{}': {}", owner, row.label, e));
                continue;
            }
            let inserted = session
                .next_index(&row.table, owner)
                .and_then(|next| session.insert_row(&row.table, owner, next, &row.fields, &row.values));
            match inserted {
                Ok(()) => {
                    did_work = true;
                    bump(&mut action.inserts, &row.table, 1);
                }
                Err(e) => errors.push(format!("owner '{}' table '{}': {}", owner, row.table, e)),
            }
        }
        did_work
    }
}

impl ToolHandler for UpdateHandler {
    fn handle(
        &self,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> StrataResult<Envelope> {
        let entries = match parse_entries::<UpdateEntry>(payload, Tool::Update) {
            Ok(entries) => entries,
            Err(e) => return Ok(Envelope::failed(e.to_string())),
        };

        let mut action = UpdateAction::default();
        let mut errors = ErrorLog::new(Tool::Update.name());
        let mut did_work = false;

        for (owner, entry) in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            match session.owner_exists(&owner) {
                Ok(true) => {}
                Ok(false) => {
                    errors.push(ValidationError::UnregisteredOwner { owner });
                    continue;
                }
                Err(e) => {
                    errors.push(format!("owner '{}': {}", owner, e));
                    continue;
                }
            }
            did_work |= Self::apply_owner(&owner, entry, session, catalog, &mut action, &mut errors);
        }

        tracing::debug!(
            updated = action.updates.values().sum::<usize>(),
            inserted = action.inserts.values().sum::<usize>(),
            "Update handled"
        );
        Ok(Envelope::new(action, errors.into_vec(), did_work).erase())
    }
}
