//! Schema metadata catalog
//!
//! The catalog is computed once by the storage crate at startup and is
//! immutable afterwards. It is the whitelist every caller-supplied table or
//! field name is checked against before it reaches SQL text.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Names of the Registry relation and of the composite key columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConvention {
    pub registry_table: String,
    pub owner_column: String,
    pub index_column: String,
}

impl Default for KeyConvention {
    fn default() -> Self {
        Self {
            registry_table: "Registry".to_string(),
            owner_column: "OwnerID".to_string(),
            index_column: "Index".to_string(),
        }
    }
}

impl KeyConvention {
    /// Convention of stores created with `UUID`/`IND` key columns.
    pub fn legacy() -> Self {
        Self {
            registry_table: "Registry".to_string(),
            owner_column: "UUID".to_string(),
            index_column: "IND".to_string(),
        }
    }
}

/// Ordered parallel lists of relation names and their columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(skip)]
    convention: KeyConvention,
    tables: Vec<String>,
    fields: Vec<Vec<String>>,
}

impl Catalog {
    /// Build a catalog from already validated metadata.
    ///
    /// `tables` and `fields` must be parallel. Validation of the owner-key
    /// convention is the job of the schema loader.
    pub fn new(convention: KeyConvention, tables: Vec<String>, fields: Vec<Vec<String>>) -> Self {
        debug_assert_eq!(tables.len(), fields.len());
        Self {
            convention,
            tables,
            fields,
        }
    }

    pub fn convention(&self) -> &KeyConvention {
        &self.convention
    }

    pub fn registry(&self) -> &str {
        &self.convention.registry_table
    }

    pub fn owner_column(&self) -> &str {
        &self.convention.owner_column
    }

    pub fn index_column(&self) -> &str {
        &self.convention.index_column
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn all_fields(&self) -> &[Vec<String>] {
        &self.fields
    }

    /// Columns of `table`, in declaration order.
    pub fn fields(&self, table: &str) -> Option<&[String]> {
        self.tables
            .iter()
            .position(|t| t == table)
            .map(|i| self.fields[i].as_slice())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    pub fn has_field(&self, table: &str, field: &str) -> bool {
        self.fields(table)
            .is_some_and(|cols| cols.iter().any(|c| c == field))
    }

    pub fn is_registry(&self, table: &str) -> bool {
        table == self.convention.registry_table
    }

    pub fn is_key_column(&self, field: &str) -> bool {
        field == self.convention.owner_column || field == self.convention.index_column
    }

    /// Every relation except the Registry, in catalog order.
    pub fn data_tables(&self) -> impl Iterator<Item = &str> + '_ {
        self.tables
            .iter()
            .map(String::as_str)
            .filter(move |t| !self.is_registry(t))
    }

    /// Resolve a caller-named data relation, returning its columns.
    pub fn data_table(&self, table: &str) -> Result<&[String], ValidationError> {
        if self.is_registry(table) {
            return Err(ValidationError::ProtectedTable {
                table: table.to_string(),
            });
        }
        self.fields(table).ok_or_else(|| ValidationError::UnknownTable {
            table: table.to_string(),
        })
    }

    /// Check a caller-supplied payload field list for `table`.
    ///
    /// Every field must exist, must not be a key column, and must appear
    /// once.
    pub fn check_payload_fields<S: AsRef<str>>(
        &self,
        table: &str,
        fields: &[S],
    ) -> Result<(), ValidationError> {
        let columns = self.data_table(table)?;
        let mut seen = HashSet::with_capacity(fields.len());
        for field in fields.iter().map(AsRef::as_ref) {
            if !columns.iter().any(|c| c == field) {
                return Err(ValidationError::UnknownField {
                    table: table.to_string(),
                    field: field.to_string(),
                });
            }
            if self.is_key_column(field) {
                return Err(ValidationError::KeyColumn {
                    table: table.to_string(),
                    field: field.to_string(),
                });
            }
            if !seen.insert(field) {
                return Err(ValidationError::DuplicateField {
                    table: table.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}
