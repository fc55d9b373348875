//! STRATA Tools - Entity Operations
//!
//! The six entity handlers, the registry that dispatches to them, the
//! batch coordinator that applies merged multi-process requests in one
//! transaction, and the debounced queue that coalesces single packages.

pub mod batch;
pub mod constants;
pub mod dispatch;
pub mod handlers;
pub mod registry;
pub mod telemetry;

pub use batch::{BatchAction, BatchCoordinator};
pub use dispatch::{DispatchQueue, FlushReport, RequestKey};
pub use handlers::{
    CreateAction, CreateHandler, DeleteAction, DeleteHandler, ListHandler, ReadAction, ReadHandler,
    Reindexed, SearchHandler, TableCounts, TableListing, UpdateAction, UpdateHandler,
};
pub use registry::{Executor, ToolHandler, ToolRegistry};
pub use telemetry::{init_tracing, TelemetryConfig};
