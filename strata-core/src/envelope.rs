//! Uniform result envelope returned by every handler

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No errors occurred
    Success,
    /// Errors occurred alongside useful work
    Partial,
    /// Errors occurred and nothing useful happened
    Error,
}

impl Status {
    /// Derive a status from whether errors occurred and whether any useful
    /// work (a write, or a non-empty result) happened alongside them.
    pub fn derive(has_errors: bool, did_work: bool) -> Self {
        match (has_errors, did_work) {
            (false, _) => Status::Success,
            (true, true) => Status::Partial,
            (true, false) => Status::Error,
        }
    }

    /// Whether some part of the call succeeded.
    pub fn is_useful(&self) -> bool {
        !matches!(self, Status::Error)
    }
}

/// `{status, errors, action}` result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<A = Value> {
    pub status: Status,
    pub errors: Vec<String>,
    pub action: A,
}

impl<A> Envelope<A> {
    /// Build an envelope, deriving the status from the collected errors.
    pub fn new(action: A, errors: Vec<String>, did_work: bool) -> Self {
        Self {
            status: Status::derive(!errors.is_empty(), did_work),
            errors,
            action,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl<A: Serialize> Envelope<A> {
    /// Convert the typed action into JSON for tool-agnostic callers.
    pub fn erase(self) -> Envelope<Value> {
        match serde_json::to_value(&self.action) {
            Ok(action) => Envelope {
                status: self.status,
                errors: self.errors,
                action,
            },
            Err(e) => {
                let mut errors = self.errors;
                errors.push(format!("action serialization failed: {}", e));
                Envelope {
                    status: Status::Error,
                    errors,
                    action: Value::Object(Default::default()),
                }
            }
        }
    }
}

impl Envelope<Value> {
    /// Envelope for a call that failed as a whole.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            errors: vec![message.into()],
            action: Value::Object(Default::default()),
        }
    }
}
