//! Error types for STRATA operations
//!
//! Only [`SchemaError`] and [`ConfigError`] are fatal. Everything else is
//! recorded per offending item by the handlers and rendered into the
//! `errors` list of an envelope.

use thiserror::Error;

/// Schema validation errors. Fatal: the process must not proceed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Missing required '{registry}' table")]
    MissingRegistry { registry: String },

    #[error("'{registry}' table must only contain '{owner_column}', found {columns:?}")]
    InvalidRegistry {
        registry: String,
        owner_column: String,
        columns: Vec<String>,
    },

    #[error("Table '{table}' missing required key columns {missing:?}")]
    MissingKeyColumns { table: String, missing: Vec<String> },

    #[error("Identifier cannot be quoted safely: {name:?}")]
    UnsafeIdentifier { name: String },

    #[error("Schema introspection failed: {reason}")]
    Introspection { reason: String },
}

/// Per-item validation errors. Sibling items keep processing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Table '{table}' does not exist")]
    UnknownTable { table: String },

    #[error("Field '{field}' does not exist in table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("Cannot write directly to '{table}'")]
    ProtectedTable { table: String },

    #[error("Key column '{field}' of table '{table}' is managed internally")]
    KeyColumn { table: String, field: String },

    #[error("Field '{field}' listed more than once for table '{table}'")]
    DuplicateField { table: String, field: String },

    #[error("{context}: expected {expected} entries, got {got}")]
    LengthMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    #[error("{context}: {fields} fields but {values} values")]
    ArityMismatch {
        context: String,
        fields: usize,
        values: usize,
    },

    #[error("Invalid index {token:?} for table '{table}'")]
    InvalidIndex { table: String, token: String },

    #[error("Unsupported condition '{operator}' on field '{field}' in table '{table}'")]
    UnsupportedCondition {
        table: String,
        field: String,
        operator: String,
    },

    #[error("Unknown logic group '{group}' on field '{field}' in table '{table}'")]
    UnknownLogicGroup {
        table: String,
        field: String,
        group: String,
    },

    #[error("Malformed {context}: {reason}")]
    MalformedPayload { context: String, reason: String },

    #[error("Owner '{owner}' is not registered")]
    UnregisteredOwner { owner: String },

    #[error("Unknown tool '{tool}'")]
    UnknownTool { tool: String },
}

/// Owner identifier uniqueness errors. The affected group is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UniquenessError {
    #[error("group '{group}': owner '{owner}' already exists in Registry")]
    OwnerExists { group: String, owner: String },

    #[error("group '{group}': no unique owner id after {attempts} attempts")]
    GenerationExhausted { group: String, attempts: usize },
}

/// Storage execution errors for one row, group or relation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("SQLite error: {reason}")]
    Sqlite { reason: String },

    #[error("No row in '{table}' for owner '{owner}' at index {index}")]
    NoRow {
        table: String,
        owner: String,
        index: i64,
    },

    #[error("Failed to open database '{path}': {reason}")]
    Open { path: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Background storage task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Database '{name}' not found in settings file '{settings}'")]
    UnknownDatabase { name: String, settings: String },

    #[error("Failed to read settings '{path}': {reason}")]
    Io { path: String, reason: String },
}

/// Master error type for all STRATA errors.
#[derive(Debug, Clone, Error)]
pub enum StrataError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Uniqueness error: {0}")]
    Uniqueness(#[from] UniquenessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display_missing_keys() {
        let err = SchemaError::MissingKeyColumns {
            table: "Contacts".to_string(),
            missing: vec!["Index".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Contacts"));
        assert!(msg.contains("Index"));
    }

    #[test]
    fn test_validation_error_display_unknown_field() {
        let err = ValidationError::UnknownField {
            table: "Notes".to_string(),
            field: "colour".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Field 'colour' does not exist in table 'Notes'"
        );
    }

    #[test]
    fn test_uniqueness_error_names_group() {
        let err = UniquenessError::OwnerExists {
            group: "group_1".to_string(),
            owner: "abc".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("group 'group_1'"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_storage_error_display_no_row() {
        let err = StorageError::NoRow {
            table: "Contacts".to_string(),
            owner: "u1".to_string(),
            index: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("Contacts"));
        assert!(msg.contains("u1"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_strata_error_from_variants() {
        let schema = StrataError::from(SchemaError::MissingRegistry {
            registry: "Registry".to_string(),
        });
        assert!(matches!(schema, StrataError::Schema(_)));

        let validation = StrataError::from(ValidationError::UnknownTable {
            table: "Nope".to_string(),
        });
        assert!(matches!(validation, StrataError::Validation(_)));

        let storage = StrataError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, StrataError::Storage(_)));

        let config = StrataError::from(ConfigError::MissingRequired {
            field: "path".to_string(),
        });
        assert!(matches!(config, StrataError::Config(_)));
    }
}
