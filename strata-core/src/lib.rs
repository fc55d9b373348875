//! STRATA Core - Data Types
//!
//! Pure data structures shared by the storage and tools crates: owner
//! identity, tool names, the result envelope, the schema catalog, payload
//! shapes, search vocabulary, errors and configuration. No SQL lives here.

pub mod catalog;
pub mod config;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod identity;
pub mod payload;
pub mod tool;

pub use catalog::{Catalog, KeyConvention};
pub use config::{DatabaseSource, DispatchConfig, StrataConfig};
pub use envelope::{Envelope, Status};
pub use error::{
    ConfigError, SchemaError, StorageError, StrataError, StrataResult, UniquenessError,
    ValidationError,
};
pub use filter::{ConditionOp, LogicGroup};
pub use identity::{new_owner_id, IdGenerator, OwnerId, RandomIdGenerator, Timestamp};
pub use payload::{
    has_content, parse_entries, parse_payload, BatchRequest, CreateGroup, DeleteEntry, IndexRef,
    IndexToken, ListRequest, OneOrMany, Package, ReadRequest, RowSet, UpdateEntry,
};
pub use tool::Tool;
