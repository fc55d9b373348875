//! `create`: register new owners and insert their first rows

use super::{bump, ErrorLog, TableCounts};
use crate::constants::MAX_ID_ATTEMPTS;
use crate::registry::ToolHandler;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use strata_core::{
    parse_entries, Catalog, CreateGroup, Envelope, IdGenerator, OwnerId, StrataError,
    StrataResult, Tool, UniquenessError, ValidationError,
};
use strata_storage::Session;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateAction {
    /// Owner ids resolved for the processed groups, in group order
    pub created: Vec<OwnerId>,
    pub inserts: TableCounts,
}

pub struct CreateHandler {
    ids: Arc<dyn IdGenerator>,
}

impl CreateHandler {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// Pick the owner id for one group.
    ///
    /// `supplied` holds every caller-supplied id of the call; `claimed`
    /// holds ids already taken by earlier groups.
    fn resolve_owner(
        &self,
        key: &str,
        group: &CreateGroup,
        session: &Session<'_>,
        supplied: &HashSet<String>,
        claimed: &HashSet<OwnerId>,
    ) -> Result<OwnerId, StrataError> {
        if let Some(owner) = group.requested_owner() {
            if claimed.contains(owner) || session.owner_exists(owner)? {
                return Err(UniquenessError::OwnerExists {
                    group: key.to_string(),
                    owner: owner.to_string(),
                }
                .into());
            }
            return Ok(owner.to_string());
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = self.ids.next_id();
            if candidate.is_empty()
                || supplied.contains(&candidate)
                || claimed.contains(&candidate)
                || session.owner_exists(&candidate)?
            {
                continue;
            }
            return Ok(candidate);
        }
        Err(UniquenessError::GenerationExhausted {
            group: key.to_string(),
            attempts: MAX_ID_ATTEMPTS,
        }
        .into())
    }

    /// Insert one group's rows; returns how many rows went in.
    #[allow(clippy::too_many_arguments)]
    fn insert_group(
        &self,
        key: &str,
        owner: &str,
        group: CreateGroup,
        session: &Session<'_>,
        catalog: &Catalog,
        action: &mut CreateAction,
        errors: &mut ErrorLog,
    ) -> usize {
        let mut inserted = 0;
        let triples = group.table.into_iter().zip(group.field).zip(group.value);

        for ((table, fields), rows) in triples {
            if let Err(e) = catalog.check_payload_fields(&table, &fields) {
                errors.push(format!("group '{}': {}", key, e));
                continue;
            }
            let mut next = match session.next_index(&table, owner) {
                Ok(n) => n,
                Err(e) => {
                    errors.push(format!("group '{}' table '{}': {}", key, table, e));
                    continue;
                }
            };
            for row in rows.into_rows() {
                if row.len() != fields.len() {
                    errors.push(ValidationError::ArityMismatch {
                        context: format!("group '{}' table '{}'", key, table),
                        fields: fields.len(),
                        values: row.len(),
                    });
                    continue;
                }
                match session.insert_row(&table, owner, next, &fields, &row) {
                    Ok(()) => {
                        next += 1;
                        inserted += 1;
                        bump(&mut action.inserts, &table, 1);
                    }
                    Err(e) => errors.push(format!("group '{}' table '{}': {}", key, table, e)),
                }
            }
        }
        inserted
    }
}

impl ToolHandler for CreateHandler {
    fn handle(
        &self,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> StrataResult<Envelope> {
        let groups = match parse_entries::<CreateGroup>(payload, Tool::Create) {
            Ok(groups) => groups,
            Err(e) => return Ok(Envelope::failed(e.to_string())),
        };

        let supplied: HashSet<String> = groups
            .iter()
            .filter_map(|(_, g)| g.as_ref().ok()?.requested_owner().map(str::to_string))
            .collect();
        let mut claimed: HashSet<OwnerId> = HashSet::new();
        let mut action = CreateAction::default();
        let mut errors = ErrorLog::new(Tool::Create.name());
        let mut did_work = false;

        for (key, group) in groups {
            let group = match group {
                Ok(g) => g,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let (tables, fields, values) = (group.table.len(), group.field.len(), group.value.len());
            if tables != fields || tables != values {
                errors.push(ValidationError::LengthMismatch {
                    context: format!("create group '{}' table/field/value", key),
                    expected: tables,
                    got: if tables != fields { fields } else { values },
                });
                continue;
            }

            let owner = match self.resolve_owner(&key, &group, session, &supplied, &claimed) {
                Ok(owner) => owner,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let had_triples = tables > 0;
            let inserted =
                self.insert_group(&key, &owner, group, session, catalog, &mut action, &mut errors);
            did_work |= inserted > 0;

            if inserted == 0 && had_triples {
                continue;
            }
            match session.register_owner(&owner) {
                Ok(()) => {
                    did_work = true;
                    claimed.insert(owner.clone());
                    action.created.push(owner);
                }
                Err(e) => errors.push(format!("group '{}': {}", key, e)),
            }
        }

        tracing::debug!(
            created = action.created.len(),
            inserted = action.inserts.values().sum::<usize>(),
            "Create handled"
        );
        Ok(Envelope::new(action, errors.into_vec(), did_work).erase())
    }
}
