//! Schema catalog loader
//!
//! Discovers relations and their columns once at startup and enforces the
//! owner-key convention. Any failure here is fatal.

use crate::sql::is_quotable;
use rusqlite::Connection;
use strata_core::{Catalog, KeyConvention, SchemaError};

fn introspection(e: rusqlite::Error) -> SchemaError {
    SchemaError::Introspection {
        reason: e.to_string(),
    }
}

/// User relations in creation order, internal `sqlite_` relations excluded.
fn table_names(conn: &Connection) -> Result<Vec<String>, SchemaError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY rowid",
        )
        .map_err(introspection)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(introspection)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(introspection)?;
    Ok(names)
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, SchemaError> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(introspection)?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .map_err(introspection)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(introspection)?;
    Ok(names)
}

/// Build and validate the catalog.
///
/// The Registry must exist with exactly one column, the owner column.
/// Every other relation must declare both key columns.
pub fn load_catalog(conn: &Connection, convention: &KeyConvention) -> Result<Catalog, SchemaError> {
    let tables = table_names(conn)?;
    let mut fields = Vec::with_capacity(tables.len());

    for table in &tables {
        if !is_quotable(table) {
            return Err(SchemaError::UnsafeIdentifier {
                name: table.clone(),
            });
        }
        let columns = column_names(conn, table)?;
        if let Some(bad) = columns.iter().find(|c| !is_quotable(c)) {
            return Err(SchemaError::UnsafeIdentifier { name: bad.clone() });
        }
        fields.push(columns);
    }

    let registry_pos = tables
        .iter()
        .position(|t| *t == convention.registry_table)
        .ok_or_else(|| SchemaError::MissingRegistry {
            registry: convention.registry_table.clone(),
        })?;
    if fields[registry_pos] != [convention.owner_column.clone()] {
        return Err(SchemaError::InvalidRegistry {
            registry: convention.registry_table.clone(),
            owner_column: convention.owner_column.clone(),
            columns: fields[registry_pos].clone(),
        });
    }

    for (table, columns) in tables.iter().zip(&fields) {
        if *table == convention.registry_table {
            continue;
        }
        let missing: Vec<String> = [&convention.owner_column, &convention.index_column]
            .into_iter()
            .filter(|key| !columns.contains(key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingKeyColumns {
                table: table.clone(),
                missing,
            });
        }
    }

    tracing::info!(
        tables = ?tables,
        registry = %convention.registry_table,
        "Schema catalog loaded"
    );
    Ok(Catalog::new(convention.clone(), tables, fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with(ddl: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ddl).unwrap();
        conn
    }

    #[test]
    fn test_loads_reference_schema() {
        let conn = conn_with(
            r#"
            CREATE TABLE Registry (OwnerID TEXT PRIMARY KEY);
            CREATE TABLE Contacts (OwnerID TEXT, "Index" INTEGER, first_name TEXT,
                PRIMARY KEY (OwnerID, "Index"));
            CREATE TABLE Notes (OwnerID TEXT, "Index" INTEGER, subject TEXT, body TEXT,
                PRIMARY KEY (OwnerID, "Index"));
            "#,
        );
        let catalog = load_catalog(&conn, &KeyConvention::default()).unwrap();
        assert_eq!(catalog.tables(), ["Registry", "Contacts", "Notes"]);
        assert_eq!(
            catalog.fields("Notes").unwrap(),
            ["OwnerID", "Index", "subject", "body"]
        );
    }

    #[test]
    fn test_sqlite_sequence_is_excluded() {
        let conn = conn_with(
            r#"
            CREATE TABLE Registry (OwnerID TEXT);
            CREATE TABLE Log (id INTEGER PRIMARY KEY AUTOINCREMENT, OwnerID TEXT, "Index" INTEGER);
            INSERT INTO Log (OwnerID, "Index") VALUES ('a', 0);
            "#,
        );
        let catalog = load_catalog(&conn, &KeyConvention::default()).unwrap();
        assert!(!catalog.has_table("sqlite_sequence"));
        assert!(catalog.has_table("Log"));
    }

    #[test]
    fn test_missing_registry() {
        let conn = conn_with(r#"CREATE TABLE Notes (OwnerID TEXT, "Index" INTEGER);"#);
        assert!(matches!(
            load_catalog(&conn, &KeyConvention::default()),
            Err(SchemaError::MissingRegistry { .. })
        ));
    }

    #[test]
    fn test_registry_with_extra_column() {
        let conn = conn_with("CREATE TABLE Registry (OwnerID TEXT, created TEXT);");
        assert!(matches!(
            load_catalog(&conn, &KeyConvention::default()),
            Err(SchemaError::InvalidRegistry { .. })
        ));
    }

    #[test]
    fn test_relation_missing_index_column() {
        let conn = conn_with(
            "CREATE TABLE Registry (OwnerID TEXT); CREATE TABLE Notes (OwnerID TEXT, body TEXT);",
        );
        match load_catalog(&conn, &KeyConvention::default()) {
            Err(SchemaError::MissingKeyColumns { table, missing }) => {
                assert_eq!(table, "Notes");
                assert_eq!(missing, vec!["Index".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_legacy_convention() {
        let conn = conn_with(
            "CREATE TABLE Registry (UUID TEXT); CREATE TABLE Notes (UUID TEXT, IND INTEGER, body TEXT);",
        );
        let catalog = load_catalog(&conn, &KeyConvention::legacy()).unwrap();
        assert!(catalog.is_key_column("IND"));
        assert!(load_catalog(&conn, &KeyConvention::default()).is_err());
    }
}
