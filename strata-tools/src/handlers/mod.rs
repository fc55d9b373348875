//! Entity operation handlers
//!
//! Each handler parses its payload entry by entry, validates every table
//! and field against the catalog, and records each failure as one string in
//! the envelope instead of aborting its siblings.

mod create;
mod delete;
mod list;
mod read;
mod search;
mod update;

pub use create::{CreateAction, CreateHandler};
pub use delete::{DeleteAction, DeleteHandler, Reindexed};
pub use list::{ListHandler, TableListing};
pub use read::{ReadAction, ReadHandler};
pub use search::SearchHandler;
pub use update::{UpdateAction, UpdateHandler};

use std::collections::BTreeMap;
use std::fmt::Display;

/// Per-relation counters in an action.
pub type TableCounts = BTreeMap<String, usize>;

/// Error list that logs each entry as it is recorded.
#[derive(Debug)]
pub(crate) struct ErrorLog {
    scope: &'static str,
    entries: Vec<String>,
}

impl ErrorLog {
    pub(crate) fn new(scope: &'static str) -> Self {
        Self {
            scope,
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, error: impl Display) {
        let message = error.to_string();
        tracing::warn!(scope = self.scope, error = %message, "Recorded error");
        self.entries.push(message);
    }

    pub(crate) fn extend<I, E>(&mut self, errors: I)
    where
        I: IntoIterator<Item = E>,
        E: Display,
    {
        for e in errors {
            self.push(e);
        }
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.entries
    }
}

pub(crate) fn bump(counts: &mut TableCounts, table: &str, by: usize) {
    if by > 0 {
        *counts.entry(table.to_string()).or_default() += by;
    }
}
