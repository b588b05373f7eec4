//! Relational engine adapter over an in-memory SQLite connection.
//!
//! Player SQL goes through [`Engine::execute`] only, and only after the
//! authorization engine allowed it. Lookups used by challenges and LOGIN are
//! parameterized and never see player text.

use crate::core::assets;
use crate::core::cipher;
use crate::core::error::ShellError;
use crate::core::world;
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, OptionalExtension, params};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(f) => Cell::Real(f),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Integer(i) => write!(f, "{i}"),
            Cell::Real(r) => write!(f, "{r}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Outcome of one player command: the last result set plus total row changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub changes: usize,
}

impl ExecutionResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Every text cell in row order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().filter_map(Cell::as_text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Tables and their columns, as handed to the suggestion engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub password: String,
    pub permission: i64,
}

impl UserRecord {
    /// The password as the player would have to type it.
    pub fn plaintext_password(&self) -> String {
        cipher::decode(&self.password, world::HASHING_KEY)
    }
}

pub struct Engine {
    conn: Connection,
}

fn scratch_path() -> PathBuf {
    std::env::temp_dir().join(format!("breachdb-{}.sqlite", Ulid::new()))
}

impl Engine {
    /// Empty engine with the game's SQL functions registered.
    pub fn open_in_memory() -> Result<Self, ShellError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys=ON;", [])?;
        conn.create_scalar_function(
            "unhash",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                let key: Option<String> = ctx.get(1)?;
                Ok(text.map(|t| cipher::decode(&t, key.as_deref().unwrap_or_default())))
            },
        )?;
        Ok(Self { conn })
    }

    /// Engine seeded with the fictional network.
    pub fn new_world() -> Result<Self, ShellError> {
        let engine = Self::open_in_memory()?;
        engine.conn.execute_batch(assets::WORLD_SEED_SQL)?;
        for account in world::CIPHERED_ACCOUNTS {
            engine.conn.execute(
                "UPDATE User SET password = ?1 WHERE name = ?2",
                params![
                    cipher::encode(account.plaintext, world::HASHING_KEY),
                    account.name
                ],
            )?;
        }
        Ok(engine)
    }

    /// Run player SQL. Every statement in the text runs in order; the last
    /// result set is returned together with the total number of changed rows.
    pub fn execute(&self, sql: &str) -> Result<ExecutionResult, ShellError> {
        self.run_batch(sql)
            .map_err(|e| ShellError::EngineExecution(e.to_string()))
    }

    fn run_batch(&self, sql: &str) -> Result<ExecutionResult, rusqlite::Error> {
        let mut result = ExecutionResult::default();
        let mut batch = Batch::new(&self.conn, sql);
        while let Some(mut stmt) = batch.next()? {
            if stmt.column_count() == 0 {
                result.changes += stmt.execute([])?;
                continue;
            }
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let width = columns.len();
            let mut rows = Vec::new();
            let mut cursor = stmt.query([])?;
            while let Some(row) = cursor.next()? {
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    cells.push(Cell::from(row.get_ref(i)?));
                }
                rows.push(cells);
            }
            result.columns = columns;
            result.rows = rows;
        }
        Ok(result)
    }

    pub fn list_tables(&self) -> Result<Vec<String>, ShellError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn describe_table(&self, name: &str) -> Result<Vec<ColumnInfo>, ShellError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([name], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    decl_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    primary_key: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(ShellError::NotFound(format!("table '{name}'")));
        }
        Ok(columns)
    }

    pub fn schema_snapshot(&self) -> Result<SchemaSnapshot, ShellError> {
        let mut tables = Vec::new();
        for name in self.list_tables()? {
            let columns = self
                .describe_table(&name)?
                .into_iter()
                .map(|c| c.name)
                .collect();
            tables.push(TableSchema { name, columns });
        }
        Ok(SchemaSnapshot { tables })
    }

    pub fn lookup_user(&self, name: &str) -> Result<Option<UserRecord>, ShellError> {
        let record = self
            .conn
            .query_row(
                "SELECT name, password, permision FROM User WHERE name = ?1",
                [name],
                |row| {
                    Ok(UserRecord {
                        name: row.get(0)?,
                        password: row.get(1)?,
                        permission: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn lookup_firewall_password(&self, level: i64) -> Result<Option<String>, ShellError> {
        let password = self
            .conn
            .query_row(
                "SELECT password FROM Passwords WHERE level = ?1",
                [level],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(password)
    }

    /// Serialize the whole database to SQLite file bytes.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, ShellError> {
        let path = scratch_path();
        self.conn
            .execute("VACUUM INTO ?1", [path.to_string_lossy().as_ref()])?;
        let bytes = fs::read(&path);
        let _ = fs::remove_file(&path);
        Ok(bytes?)
    }

    /// Rebuild an engine from bytes produced by [`Engine::export_snapshot`].
    pub fn import_snapshot(bytes: &[u8]) -> Result<Self, ShellError> {
        let engine = Self::open_in_memory()?;
        let path = scratch_path();
        fs::write(&path, bytes)?;
        let copied = engine.copy_from(&path);
        let _ = fs::remove_file(&path);
        copied?;
        Ok(engine)
    }

    fn copy_from(&self, path: &Path) -> Result<(), ShellError> {
        self.conn.execute("PRAGMA foreign_keys=OFF;", [])?;
        self.conn.execute(
            "ATTACH DATABASE ?1 AS snapshot",
            [path.to_string_lossy().as_ref()],
        )?;

        let objects: Vec<(String, String, String)> = {
            let mut stmt = self.conn.prepare(
                "SELECT type, name, sql FROM snapshot.sqlite_master WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%'",
            )?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ShellError::Persistence(format!("unreadable world snapshot: {e}")))?
        };

        for (_, name, sql) in objects.iter().filter(|(kind, _, _)| kind == "table") {
            self.conn.execute_batch(sql)?;
            let quoted = name.replace('"', "\"\"");
            self.conn.execute(
                &format!("INSERT INTO main.\"{quoted}\" SELECT * FROM snapshot.\"{quoted}\""),
                [],
            )?;
        }
        for (_, _, sql) in objects.iter().filter(|(kind, _, _)| kind != "table") {
            self.conn.execute_batch(sql)?;
        }

        self.conn.execute("DETACH DATABASE snapshot", [])?;
        self.conn.execute("PRAGMA foreign_keys=ON;", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_world_has_the_network_tables() {
        let engine = Engine::new_world().unwrap();
        let tables = engine.list_tables().unwrap();
        for expected in [
            "Directories",
            "Firewall",
            "Hints",
            "Log",
            "PC",
            "Passwords",
            "Router",
            "User",
            "User_has_access_to_PC",
            "content",
        ] {
            assert!(tables.iter().any(|t| t == expected), "{expected}");
        }
    }

    #[test]
    fn execute_returns_columns_and_rows() {
        let engine = Engine::new_world().unwrap();
        let result = engine
            .execute("SELECT name, permision FROM User WHERE name = 'student'")
            .unwrap();
        assert_eq!(result.columns, vec!["name", "permision"]);
        assert_eq!(
            result.rows,
            vec![vec![Cell::Text("student".into()), Cell::Integer(1)]]
        );
        assert_eq!(result.column_index("NAME"), Some(0));
    }

    #[test]
    fn execute_counts_changes() {
        let engine = Engine::new_world().unwrap();
        let result = engine
            .execute("UPDATE Firewall SET status = 'inactive' WHERE level = 1")
            .unwrap();
        assert_eq!(result.changes, 1);
        assert!(result.columns.is_empty());
    }

    #[test]
    fn execute_runs_every_statement_of_a_batch() {
        let engine = Engine::new_world().unwrap();
        let result = engine
            .execute(
                "UPDATE Firewall SET status = 'inactive' WHERE level = 1; \
                 SELECT status FROM Firewall WHERE level = 1",
            )
            .unwrap();
        assert_eq!(result.changes, 1);
        assert_eq!(result.rows, vec![vec![Cell::Text("inactive".into())]]);
    }

    #[test]
    fn engine_errors_surface_as_execution_errors() {
        let engine = Engine::new_world().unwrap();
        let err = engine.execute("SELEC * FROM User").unwrap_err();
        assert!(matches!(err, ShellError::EngineExecution(_)));

        let err = engine.execute("SELECT * FROM Nope").unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn ciphered_passwords_decode_with_unhash() {
        let engine = Engine::new_world().unwrap();
        let stored = engine.lookup_user("lab_tech").unwrap().unwrap();
        assert!(cipher::is_encoded(&stored.password));
        assert_eq!(stored.plaintext_password(), "quantum7");

        let result = engine
            .execute("SELECT unhash(password, 'tul') FROM User WHERE name = 'lab_tech'")
            .unwrap();
        assert_eq!(result.rows[0][0], Cell::Text("quantum7".into()));
    }

    #[test]
    fn describe_table_lists_columns() {
        let engine = Engine::new_world().unwrap();
        let columns = engine.describe_table("Hints").unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "title", "text"]);
        assert!(columns[0].primary_key);
        assert!(matches!(
            engine.describe_table("Nope"),
            Err(ShellError::NotFound(_))
        ));
    }

    #[test]
    fn firewall_password_lookup() {
        let engine = Engine::new_world().unwrap();
        assert_eq!(
            engine.lookup_firewall_password(1).unwrap().as_deref(),
            Some("bluefin42")
        );
        assert!(engine.lookup_firewall_password(9).unwrap().is_none());
    }

    #[test]
    fn snapshot_export_import_preserves_mutations() {
        let engine = Engine::new_world().unwrap();
        engine
            .execute("UPDATE Router SET locked = 0 WHERE IP = '192.168.0.1'")
            .unwrap();
        let bytes = engine.export_snapshot().unwrap();
        assert!(bytes.starts_with(b"SQLite format 3"));

        let restored = Engine::import_snapshot(&bytes).unwrap();
        let result = restored
            .execute("SELECT locked FROM Router WHERE IP = '192.168.0.1'")
            .unwrap();
        assert_eq!(result.rows, vec![vec![Cell::Integer(0)]]);
        assert_eq!(
            restored.list_tables().unwrap(),
            engine.list_tables().unwrap()
        );
        assert_eq!(
            restored.execute("SELECT unhash('enc:b', 'b')").unwrap().rows,
            vec![vec![Cell::Text("a".into())]]
        );
    }

    #[test]
    fn import_rejects_garbage() {
        assert!(Engine::import_snapshot(b"not a database").is_err());
    }
}
