//! Tool names and the fixed execution order

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One entity operation addressable from a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Create,
    Read,
    Update,
    Delete,
    Search,
    List,
}

impl Tool {
    /// Every tool, in declaration order.
    pub const ALL: [Tool; 6] = [
        Tool::Create,
        Tool::Read,
        Tool::Update,
        Tool::Delete,
        Tool::Search,
        Tool::List,
    ];

    /// Order in which merged write payloads are applied.
    pub const WRITE_ORDER: [Tool; 3] = [Tool::Create, Tool::Update, Tool::Delete];

    /// Order in which a dispatch flush invokes handlers. Reads run after
    /// every write of the same flush.
    pub const DISPATCH_ORDER: [Tool; 5] = [
        Tool::Create,
        Tool::Update,
        Tool::Delete,
        Tool::Read,
        Tool::Search,
    ];

    /// Wire name used as package key.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Create => "create",
            Tool::Read => "read",
            Tool::Update => "update",
            Tool::Delete => "delete",
            Tool::Search => "search",
            Tool::List => "list",
        }
    }

    /// Whether the tool mutates storage.
    pub fn is_write(&self) -> bool {
        Self::WRITE_ORDER.contains(self)
    }

    /// Position in [`Tool::DISPATCH_ORDER`], if the tool can be queued.
    pub fn dispatch_rank(&self) -> Option<usize> {
        Self::DISPATCH_ORDER.iter().position(|t| t == self)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|tool| tool.name() == s)
            .ok_or_else(|| ValidationError::UnknownTool {
                tool: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_order_is_create_update_delete() {
        assert_eq!(Tool::WRITE_ORDER, [Tool::Create, Tool::Update, Tool::Delete]);
        assert!(Tool::WRITE_ORDER.iter().all(Tool::is_write));
    }

    #[test]
    fn test_dispatch_order_puts_reads_after_writes() {
        let last_write = Tool::WRITE_ORDER
            .iter()
            .filter_map(Tool::dispatch_rank)
            .max()
            .unwrap();
        assert!(Tool::Read.dispatch_rank().unwrap() > last_write);
        assert!(Tool::Search.dispatch_rank().unwrap() > last_write);
        assert_eq!(Tool::List.dispatch_rank(), None);
    }

    #[test]
    fn test_parse_roundtrip_and_unknown() {
        for tool in Tool::ALL {
            assert_eq!(tool.name().parse::<Tool>().unwrap(), tool);
        }
        let err = "merge".parse::<Tool>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool 'merge'");
    }
}
