//! Boolean search-predicate compiler
//!
//! Filters map relation → column → logic block. Each relation that
//! contributes at least one clause yields one
//! `SELECT DISTINCT owner FROM relation WHERE …`; the match set is the
//! intersection of the contributing relations' owner sets. Errors are
//! collected per relation, column or condition and never stop siblings.

use crate::sql::{escape_like, quote_ident, to_sql};
use crate::Session;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use strata_core::{Catalog, ConditionOp, LogicGroup, OwnerId, ValidationError};

/// One relation's compiled owner query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub table: String,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledSearch {
    pub queries: Vec<CompiledQuery>,
    pub errors: Vec<String>,
}

/// Sorted owner matches and the errors met on the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub matches: Vec<OwnerId>,
    pub errors: Vec<String>,
}

/// SQL fragment plus its bound values.
struct Clause {
    sql: String,
    params: Vec<SqlValue>,
}

fn malformed(context: String, reason: impl Into<String>) -> String {
    ValidationError::MalformedPayload {
        context,
        reason: reason.into(),
    }
    .to_string()
}

/// Compile one atomic condition object such as `{"equals": "John"}`.
fn compile_condition(
    table: &str,
    field: &str,
    condition: &Value,
    errors: &mut Vec<String>,
) -> Option<Clause> {
    let context = || format!("condition on field '{}' in table '{}'", field, table);
    let object = match condition.as_object() {
        Some(o) if o.len() == 1 => o,
        Some(_) => {
            errors.push(malformed(context(), "expected exactly one operator"));
            return None;
        }
        None => {
            errors.push(malformed(context(), "expected an object"));
            return None;
        }
    };
    let (operator, operand) = object.iter().next()?;

    let op = match ConditionOp::from_str(operator) {
        Ok(op) => op,
        Err(operator) => {
            errors.push(
                ValidationError::UnsupportedCondition {
                    table: table.to_string(),
                    field: field.to_string(),
                    operator,
                }
                .to_string(),
            );
            return None;
        }
    };

    let column = quote_ident(field);
    match op {
        ConditionOp::Equals => Some(Clause {
            sql: format!("{} = ?", column),
            params: vec![to_sql(operand)],
        }),
        ConditionOp::Contains => {
            let needle = match operand {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    errors.push(malformed(context(), "'contains' needs a scalar needle"));
                    return None;
                }
            };
            Some(Clause {
                sql: format!("{} LIKE ? ESCAPE '\\'", column),
                params: vec![SqlValue::Text(format!("%{}%", escape_like(&needle)))],
            })
        }
    }
}

/// Compile a column's logic block; non-empty groups are OR-combined.
fn compile_column(
    table: &str,
    field: &str,
    block: &Map<String, Value>,
    errors: &mut Vec<String>,
) -> Option<Clause> {
    let mut groups = Vec::new();
    let mut params = Vec::new();

    for (key, conditions) in block {
        let group = match LogicGroup::from_str(key) {
            Ok(g) => g,
            Err(group) => {
                errors.push(
                    ValidationError::UnknownLogicGroup {
                        table: table.to_string(),
                        field: field.to_string(),
                        group,
                    }
                    .to_string(),
                );
                continue;
            }
        };
        let Some(conditions) = conditions.as_array() else {
            errors.push(malformed(
                format!("'{}' group on field '{}' in table '{}'", group, field, table),
                "expected a list of conditions",
            ));
            continue;
        };

        let mut parts = Vec::new();
        for condition in conditions {
            if let Some(clause) = compile_condition(table, field, condition, errors) {
                parts.push(clause.sql);
                params.extend(clause.params);
            }
        }
        if parts.is_empty() {
            continue;
        }
        let joined = format!("({})", parts.join(group.joiner()));
        // A NULL cell compares as unknown; negated groups must count it as
        // not matching, so unknown folds to false before the NOT.
        groups.push(if group.is_negated() {
            format!("NOT COALESCE({}, 0)", joined)
        } else {
            joined
        });
    }

    if groups.is_empty() {
        return None;
    }
    Some(Clause {
        sql: format!("({})", groups.join(" OR ")),
        params,
    })
}

/// Compile filters into one owner query per contributing relation.
pub fn compile(filters: &Value, catalog: &Catalog) -> CompiledSearch {
    let mut out = CompiledSearch::default();
    let Some(relations) = filters.as_object() else {
        out.errors
            .push(malformed("search payload".to_string(), "expected an object"));
        return out;
    };

    for (table, columns) in relations {
        if let Err(e) = catalog.data_table(table) {
            out.errors.push(e.to_string());
            continue;
        }
        let Some(columns) = columns.as_object() else {
            out.errors.push(malformed(
                format!("filters for table '{}'", table),
                "expected an object",
            ));
            continue;
        };

        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for (field, block) in columns {
            if !catalog.has_field(table, field) {
                out.errors.push(
                    ValidationError::UnknownField {
                        table: table.clone(),
                        field: field.clone(),
                    }
                    .to_string(),
                );
                continue;
            }
            let Some(block) = block.as_object() else {
                out.errors.push(malformed(
                    format!("logic block for field '{}' in table '{}'", field, table),
                    "expected an object",
                ));
                continue;
            };
            if let Some(clause) = compile_column(table, field, block, &mut out.errors) {
                clauses.push(clause.sql);
                params.extend(clause.params);
            }
        }

        if clauses.is_empty() {
            continue;
        }
        out.queries.push(CompiledQuery {
            table: table.clone(),
            sql: format!(
                "SELECT DISTINCT {} FROM {} WHERE {}",
                quote_ident(catalog.owner_column()),
                quote_ident(table),
                clauses.join(" AND ")
            ),
            params,
        });
    }
    out
}

/// Compile and run a search, intersecting the per-relation owner sets.
pub fn search(session: &Session<'_>, filters: &Value, catalog: &Catalog) -> SearchOutcome {
    let CompiledSearch { queries, mut errors } = compile(filters, catalog);

    let mut matches: Option<BTreeSet<OwnerId>> = None;
    for query in &queries {
        match session.owner_ids(&query.sql, &query.params) {
            Ok(ids) => {
                let ids: BTreeSet<OwnerId> = ids.into_iter().collect();
                matches = Some(match matches {
                    None => ids,
                    Some(acc) => acc.intersection(&ids).cloned().collect(),
                });
            }
            Err(e) => {
                tracing::warn!(table = %query.table, error = %e, "Search query failed");
                errors.push(format!("table '{}': {}", query.table, e));
            }
        }
    }

    SearchOutcome {
        matches: matches.map(|m| m.into_iter().collect()).unwrap_or_default(),
        errors,
    }
}
