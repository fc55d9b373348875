//! Search predicate vocabulary
//!
//! A search payload maps relation → column → logic block, where a logic
//! block holds up to four condition groups. This module names the groups
//! and atomic operators; the SQL compiler lives in the storage crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Condition group of a column logic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicGroup {
    /// Conditions AND-joined
    And,
    /// Conditions OR-joined
    Or,
    /// Conditions AND-joined, then negated
    Nand,
    /// Conditions OR-joined, then negated
    Nor,
}

impl LogicGroup {
    pub const ALL: [LogicGroup; 4] = [
        LogicGroup::And,
        LogicGroup::Or,
        LogicGroup::Nand,
        LogicGroup::Nor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogicGroup::And => "and",
            LogicGroup::Or => "or",
            LogicGroup::Nand => "nand",
            LogicGroup::Nor => "nor",
        }
    }

    /// SQL connective joining the group's conditions.
    pub fn joiner(&self) -> &'static str {
        match self {
            LogicGroup::And | LogicGroup::Nand => " AND ",
            LogicGroup::Or | LogicGroup::Nor => " OR ",
        }
    }

    /// Whether the joined group is negated.
    pub fn is_negated(&self) -> bool {
        matches!(self, LogicGroup::Nand | LogicGroup::Nor)
    }
}

impl FromStr for LogicGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicGroup::ALL
            .into_iter()
            .find(|g| g.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for LogicGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomic condition operator.
///
/// Only exact match and substring match are defined. Payloads naming any
/// other operator (`is_null` included) are reported as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOp {
    /// Exact match
    Equals,
    /// Substring match
    Contains,
}

impl FromStr for ConditionOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(ConditionOp::Equals),
            "contains" => Ok(ConditionOp::Contains),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negated_groups() {
        assert!(!LogicGroup::And.is_negated());
        assert!(!LogicGroup::Or.is_negated());
        assert!(LogicGroup::Nand.is_negated());
        assert!(LogicGroup::Nor.is_negated());
        assert_eq!(LogicGroup::Nand.joiner(), " AND ");
        assert_eq!(LogicGroup::Nor.joiner(), " OR ");
    }

    #[test]
    fn test_is_null_is_not_an_operator() {
        assert_eq!("equals".parse::<ConditionOp>(), Ok(ConditionOp::Equals));
        assert_eq!("is_null".parse::<ConditionOp>(), Err("is_null".to_string()));
        assert_eq!("xor".parse::<LogicGroup>(), Err("xor".to_string()));
    }
}
