//! `list`: one owner's rows per relation, as column list plus value rows

use super::ErrorLog;
use crate::registry::ToolHandler;
use serde::Serialize;
use serde_json::{Map, Value};
use strata_core::payload::ALL_KEYWORD;
use strata_core::{
    parse_payload, Catalog, Envelope, ListRequest, StrataResult, Tool, ValidationError,
};
use strata_storage::Session;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableListing {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub struct ListHandler;

impl ToolHandler for ListHandler {
    fn handle(
        &self,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> StrataResult<Envelope> {
        let request: ListRequest = match parse_payload(payload, Tool::List) {
            Ok(r) => r,
            Err(e) => return Ok(Envelope::failed(e.to_string())),
        };
        let Some(owner) = request.owner.filter(|o| !o.is_empty()) else {
            return Ok(Envelope::failed(
                ValidationError::MalformedPayload {
                    context: "list payload".to_string(),
                    reason: "missing 'UUID'".to_string(),
                }
                .to_string(),
            ));
        };
        match session.owner_exists(&owner) {
            Ok(true) => {}
            Ok(false) => {
                return Ok(Envelope::failed(
                    ValidationError::UnregisteredOwner { owner }.to_string(),
                ))
            }
            Err(e) => return Ok(Envelope::failed(format!("owner '{}': {}", owner, e))),
        }

        let mut errors = ErrorLog::new(Tool::List.name());
        let selected: Vec<String> = if request.table.is_empty()
            || (request.table.len() == 1 && request.table[0] == ALL_KEYWORD)
        {
            catalog.data_tables().map(str::to_string).collect()
        } else {
            request
                .table
                .into_iter()
                .filter(|t| match catalog.data_table(t) {
                    Ok(_) => true,
                    Err(e) => {
                        errors.push(e);
                        false
                    }
                })
                .collect()
        };

        let mut action = Map::new();
        for table in selected {
            let fields = catalog.fields(&table).unwrap_or_default().to_vec();
            match session.select_rows(&table, &owner) {
                Ok(rows) => {
                    let listing = TableListing { fields, rows };
                    match serde_json::to_value(&listing) {
                        Ok(v) => {
                            action.insert(table, v);
                        }
                        Err(e) => errors.push(format!("table '{}': {}", table, e)),
                    }
                }
                Err(e) => errors.push(format!("owner '{}' table '{}': {}", owner, table, e)),
            }
        }

        let did_work = !action.is_empty();
        tracing::debug!(owner = %owner, tables = action.len(), "List handled");
        Ok(Envelope::new(Value::Object(action), errors.into_vec(), did_work))
    }
}
