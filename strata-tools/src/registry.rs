//! Tool registry and direct execution
//!
//! The registry maps each [`Tool`] to its handler. Coordinators look
//! handlers up here instead of naming them, so tests can swap in
//! replacements.

use crate::handlers::{
    CreateHandler, DeleteHandler, ListHandler, ReadHandler, SearchHandler, UpdateHandler,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{Catalog, Envelope, IdGenerator, StrataResult, Tool};
use strata_storage::{Database, Session};

/// One entity operation.
///
/// `Err` is reserved for faults the caller must report as a failed tool
/// call. Validation and per-row execution failures go into the envelope's
/// `errors`. Handlers never commit.
pub trait ToolHandler: Send + Sync {
    fn handle(
        &self,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> StrataResult<Envelope>;
}

/// Tool → handler table.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<Tool, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the six entity handlers installed.
    pub fn standard(ids: Arc<dyn IdGenerator>) -> Self {
        Self::empty()
            .with(Tool::Create, CreateHandler::new(ids))
            .with(Tool::Read, ReadHandler)
            .with(Tool::Update, UpdateHandler)
            .with(Tool::Delete, DeleteHandler)
            .with(Tool::Search, SearchHandler)
            .with(Tool::List, ListHandler)
    }

    /// Builder-style registration, replacing any previous handler.
    pub fn with<H: ToolHandler + 'static>(mut self, tool: Tool, handler: H) -> Self {
        self.register(tool, Arc::new(handler));
        self
    }

    pub fn register(&mut self, tool: Tool, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(tool, handler);
    }

    pub fn get(&self, tool: Tool) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(&tool)
    }

    /// Run one handler, turning a failed call into an error envelope.
    pub fn invoke(
        &self,
        tool: Tool,
        payload: &Value,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> Envelope {
        let Some(handler) = self.get(tool) else {
            tracing::error!(tool = %tool, "No handler registered");
            return Envelope::failed(format!("{} failed: no handler registered", tool));
        };
        match handler.handle(payload, session, catalog) {
            Ok(envelope) => {
                tracing::debug!(
                    tool = %tool,
                    status = ?envelope.status,
                    errors = envelope.errors.len(),
                    "Tool handled"
                );
                envelope
            }
            Err(e) => {
                tracing::error!(tool = %tool, error = %e, "Tool call failed");
                Envelope::failed(format!("{} failed: {}", tool, e))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tools: Vec<&Tool> = self.handlers.keys().collect();
        tools.sort();
        f.debug_struct("ToolRegistry").field("tools", &tools).finish()
    }
}

/// Direct handler invocation: one handler, one session, one commit.
#[derive(Debug, Clone)]
pub struct Executor {
    db: Arc<Database>,
    registry: Arc<ToolRegistry>,
}

impl Executor {
    pub fn new(db: Arc<Database>, registry: Arc<ToolRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn execute(&self, tool: Tool, payload: &Value) -> StrataResult<Envelope> {
        let catalog = self.db.catalog();
        self.db
            .session(|session| Ok(self.registry.invoke(tool, payload, session, &catalog)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{RandomIdGenerator, Status, StorageError};

    struct Broken;

    impl ToolHandler for Broken {
        fn handle(&self, _: &Value, _: &Session<'_>, _: &Catalog) -> StrataResult<Envelope> {
            Err(StorageError::Sqlite {
                reason: "disk I/O error".to_string(),
            }
            .into())
        }
    }

    #[test]
    fn test_standard_registry_has_every_tool() {
        let registry = ToolRegistry::standard(Arc::new(RandomIdGenerator));
        for tool in Tool::ALL {
            assert!(registry.get(tool).is_some(), "missing {}", tool);
        }
    }

    #[test]
    fn test_failed_call_becomes_error_envelope() {
        let store = strata_test_utils::TestStore::new();
        let registry = ToolRegistry::empty().with(Tool::Read, Broken);
        let executor = Executor::new(store.db(), Arc::new(registry));

        let env = executor
            .execute(Tool::Read, &serde_json::json!({"UUID": ["x"]}))
            .unwrap();
        assert_eq!(env.status, Status::Error);
        assert!(env.errors[0].starts_with("read failed: "));

        let env = executor.execute(Tool::List, &serde_json::json!({})).unwrap();
        assert_eq!(env.errors, vec!["list failed: no handler registered".to_string()]);
    }
}
