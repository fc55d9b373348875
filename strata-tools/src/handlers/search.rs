//! `search`: owners matching a boolean predicate over relation columns

use super::ErrorLog;
use crate::registry::ToolHandler;
use serde_json::{json, Value};
use strata_core::{Catalog, Envelope, StrataResult, Tool};
use strata_storage::{search, SearchOutcome, Session};

pub struct SearchHandler;

impl ToolHandler for SearchHandler {
    fn handle(
        &self,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> StrataResult<Envelope> {
        let SearchOutcome { matches, errors: found } = search(session, payload, catalog);
        let mut errors = ErrorLog::new(Tool::Search.name());
        errors.extend(found);

        let did_work = !matches.is_empty();
        tracing::debug!(matches = matches.len(), "Search handled");
        Ok(Envelope::new(json!({ "matches": matches }), errors.into_vec(), did_work))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Status;
    use strata_test_utils::TestStore;

    #[test]
    fn test_partial_when_errors_and_matches() {
        let store = TestStore::new();
        store.seed("u1", "Contacts", &["first_name"], &[vec![json!("John")]]);
        let catalog = store.catalog();
        let env = store.with_session(|s| {
            SearchHandler.handle(
                &json!({
                    "Contacts": {"first_name": {"and": [{"equals": "John"}]}},
                    "Ghosts": {}
                }),
                s,
                &catalog,
            )
        });
        assert_eq!(env.status, Status::Partial);
        assert_eq!(env.action["matches"], json!(["u1"]));
    }

    #[test]
    fn test_error_when_nothing_matches() {
        let store = TestStore::new();
        let catalog = store.catalog();
        let env = store.with_session(|s| {
            SearchHandler.handle(&json!({"Contacts": {"nickname": {}}}), s, &catalog)
        });
        assert_eq!(env.status, Status::Error);
        assert_eq!(env.action["matches"], json!([]));
    }
}
