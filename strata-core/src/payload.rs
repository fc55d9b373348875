//! Package and tool payload shapes
//!
//! Packages travel as JSON: tool name → payload. The top-level maps keep
//! submission order so "later process wins" merges are well defined. Each
//! handler parses its payload entry by entry, so one malformed group or
//! owner never hides its siblings.

use crate::{OwnerId, Tool, ValidationError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// EMPTINESS
// ============================================================================

/// Whether a payload carries anything worth executing.
///
/// Empty objects, empty arrays, empty strings and null are empty. An object
/// has content iff one of its values is a non-empty array, a non-empty
/// scalar, or a nested object that itself has content.
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => map.values().any(has_content),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

// ============================================================================
// PACKAGE
// ============================================================================

/// Mapping from tool name to tool payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Package(Map<String, Value>);

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, tool: Tool, payload: Value) -> Self {
        self.0.insert(tool.name().to_string(), payload);
        self
    }

    /// Insert a payload under a raw tool name.
    pub fn insert(&mut self, tool: impl Into<String>, payload: Value) {
        self.0.insert(tool.into(), payload);
    }

    pub fn get(&self, tool: Tool) -> Option<&Value> {
        self.0.get(tool.name())
    }

    /// Raw `(tool name, payload)` pairs in submission order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret a JSON value as a package.
    pub fn from_value(value: &Value, context: &str) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Self(map.clone())),
            other => Err(ValidationError::MalformedPayload {
                context: context.to_string(),
                reason: format!("expected an object, found {}", json_kind(other)),
            }),
        }
    }
}

impl From<Map<String, Value>> for Package {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Batch id → process id → package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchRequest(Map<String, Value>);

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of one process package into a batch.
    pub fn with_process(mut self, batch: &str, process: &str, package: Package) -> Self {
        let slot = self
            .0
            .entry(batch.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(processes) = slot {
            processes.insert(process.to_string(), Value::Object(package.0));
        }
        self
    }

    /// `(batch id, batch)` pairs in submission order.
    pub fn batches(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for BatchRequest {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ============================================================================
// TOOL PAYLOADS
// ============================================================================

/// Either one item or a list of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Rows of one create triple: a list of value tuples, or one flat tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowSet {
    Rows(Vec<Vec<Value>>),
    Row(Vec<Value>),
}

impl RowSet {
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        match self {
            RowSet::Rows(rows) => rows,
            RowSet::Row(row) => vec![row],
        }
    }
}

/// One create group: parallel `table`/`field`/`value` lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGroup {
    #[serde(default)]
    pub table: Vec<String>,
    #[serde(default)]
    pub field: Vec<Vec<String>>,
    #[serde(default)]
    pub value: Vec<RowSet>,
    /// Caller-supplied owner id; empty counts as absent.
    #[serde(default, rename = "_UUID", skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,
}

impl CreateGroup {
    pub fn requested_owner(&self) -> Option<&str> {
        self.owner.as_deref().filter(|s| !s.is_empty())
    }
}

/// `IND` entry: a literal row index, or a placeholder such as `"new_1"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexToken {
    Position(i64),
    Label(String),
}

/// Resolved meaning of an [`IndexToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRef<'a> {
    /// Existing row at this index
    Existing(i64),
    /// New row shared by every member with the same placeholder
    Pending(&'a str),
}

/// Prefix marking a placeholder index token.
pub const NEW_ROW_PREFIX: &str = "new";

impl IndexToken {
    pub fn resolve(&self, table: &str) -> Result<IndexRef<'_>, ValidationError> {
        let invalid = || ValidationError::InvalidIndex {
            table: table.to_string(),
            token: self.to_string(),
        };
        match self {
            IndexToken::Position(n) if *n >= 0 => Ok(IndexRef::Existing(*n)),
            IndexToken::Position(_) => Err(invalid()),
            IndexToken::Label(label) if label.starts_with(NEW_ROW_PREFIX) => {
                Ok(IndexRef::Pending(label))
            }
            IndexToken::Label(label) => match label.trim().parse::<i64>() {
                Ok(n) if n >= 0 => Ok(IndexRef::Existing(n)),
                _ => Err(invalid()),
            },
        }
    }

    /// Resolve a token that must name an existing row.
    pub fn position(&self, table: &str) -> Result<i64, ValidationError> {
        match self.resolve(table)? {
            IndexRef::Existing(n) => Ok(n),
            IndexRef::Pending(_) => Err(ValidationError::InvalidIndex {
                table: table.to_string(),
                token: self.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for IndexToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexToken::Position(n) => write!(f, "{}", n),
            IndexToken::Label(s) => f.write_str(s),
        }
    }
}

/// Update request for one owner: parallel quadruple lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    #[serde(default)]
    pub table: Vec<String>,
    #[serde(default)]
    pub field: Vec<Vec<OneOrMany<String>>>,
    #[serde(default, rename = "IND")]
    pub index: Vec<Vec<IndexToken>>,
    #[serde(default)]
    pub value: Vec<Vec<OneOrMany<Value>>>,
}

/// Delete request for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteEntry {
    #[serde(default, rename = "where")]
    pub targets: Vec<String>,
    #[serde(default, rename = "IND")]
    pub index: Vec<IndexToken>,
}

/// `where`/`table` value selecting every data relation.
pub const ALL_KEYWORD: &str = "all";

impl DeleteEntry {
    pub fn wipe() -> Self {
        Self {
            targets: vec![ALL_KEYWORD.to_string()],
            index: Vec::new(),
        }
    }

    pub fn is_wipe(&self) -> bool {
        self.targets.len() == 1 && self.targets[0] == ALL_KEYWORD
    }
}

/// Read request: one or more owner ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    #[serde(default, rename = "UUID")]
    pub owners: OneOrMany<OwnerId>,
}

/// List request: one owner and an optional relation subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default, rename = "UUID")]
    pub owner: Option<OwnerId>,
    #[serde(default)]
    pub table: Vec<String>,
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Parse a whole payload into one typed request.
pub fn parse_payload<T: DeserializeOwned>(payload: &Value, tool: Tool) -> Result<T, ValidationError> {
    serde_json::from_value(payload.clone()).map_err(|e| ValidationError::MalformedPayload {
        context: format!("{} payload", tool),
        reason: e.to_string(),
    })
}

/// Parse an object payload entry by entry.
///
/// Fails only when the payload itself is not an object. Entries that do not
/// match `T` are returned as individual errors.
pub fn parse_entries<T: DeserializeOwned>(
    payload: &Value,
    tool: Tool,
) -> Result<Vec<(String, Result<T, ValidationError>)>, ValidationError> {
    let map = payload
        .as_object()
        .ok_or_else(|| ValidationError::MalformedPayload {
            context: format!("{} payload", tool),
            reason: format!("expected an object, found {}", json_kind(payload)),
        })?;

    Ok(map
        .iter()
        .map(|(key, entry)| {
            let parsed = serde_json::from_value(entry.clone()).map_err(|e| {
                ValidationError::MalformedPayload {
                    context: format!("{} entry '{}'", tool, key),
                    reason: e.to_string(),
                }
            });
            (key.clone(), parsed)
        })
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
