//! `read`: every row of every data relation for a set of owners

use super::ErrorLog;
use crate::registry::ToolHandler;
use serde::Serialize;
use serde_json::{Map, Value};
use strata_core::{parse_payload, Catalog, Envelope, ReadRequest, StrataResult, Tool};
use strata_storage::Session;

/// `{owner: {table: [row…]}}`, owners in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadAction {
    pub results: Map<String, Value>,
}

pub struct ReadHandler;

impl ToolHandler for ReadHandler {
    fn handle(
        &self,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> StrataResult<Envelope> {
        let request: ReadRequest = match parse_payload(payload, Tool::Read) {
            Ok(r) => r,
            Err(e) => return Ok(Envelope::failed(e.to_string())),
        };

        let mut action = ReadAction::default();
        let mut errors = ErrorLog::new(Tool::Read.name());
        let mut did_work = false;

        for owner in request.owners.into_vec() {
            let mut tables = Map::new();
            for table in catalog.data_tables() {
                let columns = catalog.fields(table).unwrap_or_default();
                match session.select_rows(table, &owner) {
                    Ok(rows) => {
                        did_work = true;
                        let rows = rows
                            .into_iter()
                            .map(|row| {
                                Value::Object(columns.iter().cloned().zip(row).collect())
                            })
                            .collect();
                        tables.insert(table.to_string(), Value::Array(rows));
                    }
                    Err(e) => errors.push(format!("owner '{}' table '{}': {}", owner, table, e)),
                }
            }
            action.results.insert(owner, Value::Object(tables));
        }

        tracing::debug!(owners = action.results.len(), "Read handled");
        Ok(Envelope::new(action, errors.into_vec(), did_work).erase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::Status;
    use strata_test_utils::TestStore;

    #[test]
    fn test_reads_rows_as_maps_in_index_order() {
        let store = TestStore::new();
        store.seed(
            "u1",
            "Notes",
            &["subject", "body"],
            &[vec![json!("first"), json!("1")], vec![json!("second"), json!("2")]],
        );
        let catalog = store.catalog();
        let env = store.with_session(|s| ReadHandler.handle(&json!({"UUID": "u1"}), s, &catalog));

        assert_eq!(env.status, Status::Success);
        let notes = &env.action["results"]["u1"]["Notes"];
        assert_eq!(notes[0]["subject"], "first");
        assert_eq!(notes[1]["Index"], 1);
        assert_eq!(env.action["results"]["u1"]["Contacts"], json!([]));
    }

    #[test]
    fn test_owner_order_is_request_order() {
        let store = TestStore::new();
        let catalog = store.catalog();
        let env = store.with_session(|s| {
            ReadHandler.handle(&json!({"UUID": ["zeta", "alpha"]}), s, &catalog)
        });
        let owners: Vec<&String> = env.action["results"].as_object().unwrap().keys().collect();
        assert_eq!(owners, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_malformed_read() {
        let store = TestStore::new();
        let catalog = store.catalog();
        let env = store.with_session(|s| ReadHandler.handle(&json!({"UUID": 5}), s, &catalog));
        assert_eq!(env.status, Status::Error);
    }
}
