//! Batch coordinator
//!
//! Reorganizes a multi-process request into one merged payload per write
//! tool, runs read-style tools as they are met, then applies the writes in
//! [`Tool::WRITE_ORDER`]. The whole request shares one session and one
//! commit.

use crate::constants::GROUP_KEY_PREFIX;
use crate::handlers::ErrorLog;
use crate::registry::ToolRegistry;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use strata_core::{
    has_content, BatchRequest, Catalog, Envelope, Package, Status, StrataResult, Tool,
    ValidationError,
};
use strata_storage::{Database, Session};

/// Per-tool envelopes of a batch request.
///
/// Writes run once per batch, so they carry a single envelope. Read-style
/// tools run once per process and accumulate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<Envelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Envelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Envelope>,
    pub read: Vec<Envelope>,
    pub search: Vec<Envelope>,
    pub list: Vec<Envelope>,
}

impl BatchAction {
    fn record(&mut self, tool: Tool, envelope: Envelope) {
        match tool {
            Tool::Create => self.create = Some(envelope),
            Tool::Update => self.update = Some(envelope),
            Tool::Delete => self.delete = Some(envelope),
            Tool::Read => self.read.push(envelope),
            Tool::Search => self.search.push(envelope),
            Tool::List => self.list.push(envelope),
        }
    }
}

/// Write payloads of one batch, merged across processes.
#[derive(Debug, Default)]
struct MergedWrites {
    create: Map<String, Value>,
    update: Map<String, Value>,
    delete: Map<String, Value>,
    groups: usize,
}

impl MergedWrites {
    fn payload(&self, tool: Tool) -> Option<&Map<String, Value>> {
        let map = match tool {
            Tool::Create => &self.create,
            Tool::Update => &self.update,
            Tool::Delete => &self.delete,
            _ => return None,
        };
        (!map.is_empty()).then_some(map)
    }

    /// Create groups get fresh `group_N` keys; update and delete entries
    /// are keyed by owner, later entries replacing earlier ones.
    fn merge(&mut self, tool: Tool, entries: &Map<String, Value>) {
        for (key, entry) in entries {
            match tool {
                Tool::Create => {
                    self.groups += 1;
                    self.create
                        .insert(format!("{}{}", GROUP_KEY_PREFIX, self.groups), entry.clone());
                }
                Tool::Update => {
                    self.update.insert(key.clone(), entry.clone());
                }
                Tool::Delete => {
                    self.delete.insert(key.clone(), entry.clone());
                }
                Tool::Read | Tool::Search | Tool::List => {}
            }
        }
    }
}

/// Running status inputs across every tool envelope of a request.
#[derive(Debug, Default)]
struct Tally {
    errors: Vec<String>,
    useful: bool,
}

impl Tally {
    fn absorb(&mut self, envelope: &Envelope) {
        self.errors.extend(envelope.errors.iter().cloned());
        self.useful |= envelope.status.is_useful();
    }
}

#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    db: Arc<Database>,
    registry: Arc<ToolRegistry>,
}

impl BatchCoordinator {
    pub fn new(db: Arc<Database>, registry: Arc<ToolRegistry>) -> Self {
        Self { db, registry }
    }

    /// Execute a whole request and commit once.
    ///
    /// `Err` means the session itself failed (lock or commit); every
    /// per-tool failure is reported inside the envelope.
    pub fn handle_batch(&self, request: &BatchRequest) -> StrataResult<Envelope<BatchAction>> {
        let catalog = self.db.catalog();
        let envelope = self
            .db
            .session(|session| Ok(self.run(request, session, &catalog)))?;

        tracing::info!(
            status = ?envelope.status,
            errors = envelope.errors.len(),
            "Batch request completed"
        );
        Ok(envelope)
    }

    fn run(
        &self,
        request: &BatchRequest,
        session: &Session<'_>,
        catalog: &Catalog,
    ) -> Envelope<BatchAction> {
        let mut action = BatchAction::default();
        let mut tally = Tally::default();
        let mut errors = ErrorLog::new("batch");

        for (batch_id, batch) in request.batches() {
            let Some(processes) = batch.as_object() else {
                errors.push(ValidationError::MalformedPayload {
                    context: format!("batch '{}'", batch_id),
                    reason: "expected an object of processes".to_string(),
                });
                continue;
            };

            let mut writes = MergedWrites::default();
            for (process_id, package) in processes {
                let package = match Package::from_value(package, &format!("process '{}'", process_id)) {
                    Ok(p) => p,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                self.absorb_package(
                    &package,
                    &mut writes,
                    session,
                    catalog,
                    &mut action,
                    &mut tally,
                    &mut errors,
                );
            }

            for tool in Tool::WRITE_ORDER {
                let Some(payload) = writes.payload(tool) else {
                    continue;
                };
                let envelope =
                    self.registry
                        .invoke(tool, &Value::Object(payload.clone()), session, catalog);
                tally.absorb(&envelope);
                action.record(tool, envelope);
            }
            tracing::debug!(batch = %batch_id, processes = processes.len(), "Batch reorganized");
        }

        let mut all_errors = errors.into_vec();
        all_errors.extend(tally.errors);
        Envelope {
            status: Status::derive(!all_errors.is_empty(), tally.useful),
            errors: all_errors,
            action,
        }
    }

    /// Route one process package: merge writes, run read-style tools now.
    #[allow(clippy::too_many_arguments)]
    fn absorb_package(
        &self,
        package: &Package,
        writes: &mut MergedWrites,
        session: &Session<'_>,
        catalog: &Catalog,
        action: &mut BatchAction,
        tally: &mut Tally,
        errors: &mut ErrorLog,
    ) {
        for (name, payload) in package.entries() {
            if !has_content(payload) {
                continue;
            }
            let tool = match name.parse::<Tool>() {
                Ok(tool) => tool,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            if !tool.is_write() {
                let envelope = self.registry.invoke(tool, payload, session, catalog);
                tally.absorb(&envelope);
                action.record(tool, envelope);
                continue;
            }
            match payload.as_object() {
                Some(entries) => writes.merge(tool, entries),
                None => errors.push(ValidationError::MalformedPayload {
                    context: format!("{} payload", tool),
                    reason: "expected an object".to_string(),
                }),
            }
        }
    }
}
