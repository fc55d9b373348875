//! Row primitives over the owner-keyed relations
//!
//! Table and field names passed here must already be checked against the
//! catalog. They are still quoted; values are always bound.

use crate::sql::{from_sql, placeholders, quote_ident, sqlite_err, to_sql};
use crate::Session;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use rusqlite::OptionalExtension;
use serde_json::Value;
use strata_core::StorageError;

impl Session<'_> {
    fn owner_col(&self) -> String {
        quote_ident(self.catalog().owner_column())
    }

    fn index_col(&self) -> String {
        quote_ident(self.catalog().index_column())
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    pub fn owner_exists(&self, owner: &str) -> Result<bool, StorageError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
            quote_ident(self.catalog().registry()),
            self.owner_col()
        );
        let found = self
            .conn()
            .query_row(&sql, [owner], |_| Ok(()))
            .optional()
            .map_err(sqlite_err)?;
        Ok(found.is_some())
    }

    pub fn register_owner(&self, owner: &str) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?1)",
            quote_ident(self.catalog().registry()),
            self.owner_col()
        );
        self.conn().execute(&sql, [owner]).map_err(sqlite_err)?;
        Ok(())
    }

    /// Remove an owner from the Registry. Returns the number of rows removed.
    pub fn unregister_owner(&self, owner: &str) -> Result<usize, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(self.catalog().registry()),
            self.owner_col()
        );
        self.conn().execute(&sql, [owner]).map_err(sqlite_err)
    }

    // ------------------------------------------------------------------------
    // Data rows
    // ------------------------------------------------------------------------

    /// `MAX(Index) + 1` for the owner in `table`, or 0 when it has no rows.
    pub fn next_index(&self, table: &str, owner: &str) -> Result<i64, StorageError> {
        let sql = format!(
            "SELECT COALESCE(MAX({idx}) + 1, 0) FROM {table} WHERE {owner} = ?1",
            idx = self.index_col(),
            table = quote_ident(table),
            owner = self.owner_col(),
        );
        self.conn()
            .query_row(&sql, [owner], |row| row.get(0))
            .map_err(sqlite_err)
    }

    pub fn insert_row<S: AsRef<str>>(
        &self,
        table: &str,
        owner: &str,
        index: i64,
        fields: &[S],
        values: &[Value],
    ) -> Result<(), StorageError> {
        let mut columns = vec![self.owner_col(), self.index_col()];
        columns.extend(fields.iter().map(|f| quote_ident(f.as_ref())));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders(columns.len())
        );

        let mut params = vec![SqlValue::Text(owner.to_string()), SqlValue::Integer(index)];
        params.extend(values.iter().map(to_sql));
        self.conn()
            .execute(&sql, params_from_iter(params))
            .map_err(sqlite_err)?;
        Ok(())
    }

    /// Update one existing row. Returns the number of rows affected.
    pub fn update_row<S: AsRef<str>>(
        &self,
        table: &str,
        owner: &str,
        index: i64,
        fields: &[S],
        values: &[Value],
    ) -> Result<usize, StorageError> {
        let assignments: Vec<String> = fields
            .iter()
            .map(|f| format!("{} = ?", quote_ident(f.as_ref())))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ? AND {} = ?",
            quote_ident(table),
            assignments.join(", "),
            self.owner_col(),
            self.index_col()
        );

        let mut params: Vec<SqlValue> = values.iter().map(to_sql).collect();
        params.push(SqlValue::Text(owner.to_string()));
        params.push(SqlValue::Integer(index));
        self.conn()
            .execute(&sql, params_from_iter(params))
            .map_err(sqlite_err)
    }

    pub fn delete_row(&self, table: &str, owner: &str, index: i64) -> Result<usize, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
            quote_ident(table),
            self.owner_col(),
            self.index_col()
        );
        self.conn()
            .execute(&sql, rusqlite::params![owner, index])
            .map_err(sqlite_err)
    }

    pub fn delete_owner_rows(&self, table: &str, owner: &str) -> Result<usize, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(table),
            self.owner_col()
        );
        self.conn().execute(&sql, [owner]).map_err(sqlite_err)
    }

    /// Index values of the owner's rows, ascending.
    pub fn indexes(&self, table: &str, owner: &str) -> Result<Vec<i64>, StorageError> {
        let sql = format!(
            "SELECT {idx} FROM {table} WHERE {owner} = ?1 ORDER BY {idx}",
            idx = self.index_col(),
            table = quote_ident(table),
            owner = self.owner_col(),
        );
        let mut stmt = self.conn().prepare(&sql).map_err(sqlite_err)?;
        let rows = stmt
            .query_map([owner], |row| row.get(0))
            .map_err(sqlite_err)?
            .collect::<Result<Vec<i64>, _>>()
            .map_err(sqlite_err)?;
        Ok(rows)
    }

    /// Renumber the owner's rows to `0..n-1`, preserving order.
    ///
    /// Rows are moved in ascending order, so each target slot is already
    /// free when it is written. Returns the number of surviving rows.
    pub fn reindex(&self, table: &str, owner: &str) -> Result<usize, StorageError> {
        let current = self.indexes(table, owner)?;
        let sql = format!(
            "UPDATE {} SET {idx} = ?1 WHERE {} = ?2 AND {idx} = ?3",
            quote_ident(table),
            self.owner_col(),
            idx = self.index_col(),
        );
        for (target, old) in (0_i64..).zip(current.iter().copied()) {
            if target != old {
                self.conn()
                    .execute(&sql, rusqlite::params![target, owner, old])
                    .map_err(sqlite_err)?;
            }
        }
        Ok(current.len())
    }

    /// All columns of the owner's rows in catalog order, ordered by Index.
    pub fn select_rows(&self, table: &str, owner: &str) -> Result<Vec<Vec<Value>>, StorageError> {
        let columns = self.catalog().fields(table).unwrap_or_default();
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let select: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
            select.join(", "),
            quote_ident(table),
            self.owner_col(),
            self.index_col()
        );
        let width = columns.len();
        let mut stmt = self.conn().prepare(&sql).map_err(sqlite_err)?;
        let rows = stmt
            .query_map([owner], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(from_sql))
                    .collect::<Result<Vec<Value>, _>>()
            })
            .map_err(sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite_err)?;
        Ok(rows)
    }

    /// Distinct owner ids returned by a compiled single-column query.
    pub fn owner_ids(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn().prepare(sql).map_err(sqlite_err)?;
        let ids = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))
            .map_err(sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite_err)?;
        Ok(ids)
    }
}
