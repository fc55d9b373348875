//! Constants for STRATA tools

// ============================================================================
// CREATE
// ============================================================================

/// Candidates drawn from the id generator before a create group gives up.
pub const MAX_ID_ATTEMPTS: usize = 32;

/// Prefix of the group keys the batch coordinator assigns to create groups.
pub const GROUP_KEY_PREFIX: &str = "group_";

// ============================================================================
// DISPATCH
// ============================================================================

/// Prefix of the keys assigned to queued requests.
pub const REQUEST_KEY_PREFIX: &str = "request_";

/// Flush reports buffered per subscriber before it starts lagging.
pub const REPORT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// LOGGING
// ============================================================================

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "strata=info,strata_tools=info,strata_storage=info,warn";

/// `STRATA_LOG_FORMAT` value selecting JSON log lines.
pub const JSON_LOG_FORMAT: &str = "json";
