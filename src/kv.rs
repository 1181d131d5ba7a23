//! SQLite helpers and a key-value cache table
//!
//! [`KvStore`] wraps one SQLite database. Besides ad-hoc statements it keeps a
//! `__cache__` table where every key has an independent text `value` and a
//! JSON `data` column, so the same key can hold both.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::common::{Result, UtilError};

/// File name of the default database under the temp directory
pub const DEFAULT_DB_NAME: &str = "__utilkit__.db";

const CACHE_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS __cache__ (key TEXT PRIMARY KEY, value TEXT, data JSON)";

/// Row as a column name to JSON value map
pub type Row = Map<String, Value>;

/// Path of the default database
pub fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_DB_NAME)
}

/// A SQLite database with key-value helpers
pub struct KvStore {
    path: PathBuf,
    db: Connection,
}

impl KvStore {
    /// Open (or create) the database at `path`, the default database when `None`
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_db_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(&path)?;
        let store = Self { path, db };
        store.execute(CACHE_SCHEMA, &[])?;
        Ok(store)
    }

    pub fn default_store() -> Result<Self> {
        Self::open(None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a statement, returning the number of changed rows
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        debug!(
            "[{}] Executing [{}] with {} params",
            self.path.display(),
            sql,
            params.len()
        );
        Ok(self.db.execute(sql, params)?)
    }

    /// Run a `select` and return every row
    pub fn query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>> {
        if !sql.to_ascii_lowercase().contains("select") {
            return Err(UtilError::InvalidInput(format!(
                "Not a query, use execute instead: {}",
                sql
            )));
        }
        debug!(
            "[{}] Querying [{}] with {} params",
            self.path.display(),
            sql,
            params.len()
        );

        let mut stmt = self.db.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(params)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Map::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(idx)?));
            }
            records.push(record);
        }
        Ok(records)
    }

    pub fn select_all(&self, table: &str) -> Result<Vec<Row>> {
        self.query(&format!("select * from {}", quote_ident(table)), &[])
    }

    /// Names of every table in the database
    pub fn tables(&self) -> Result<Vec<String>> {
        let rows = self.query("select name from sqlite_master where type = 'table'", &[])?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.remove("name") {
                Some(Value::String(name)) => Some(name),
                _ => None,
            })
            .collect())
    }

    /// Print the rows of `table`, or of every table, to stdout
    pub fn dump(&self, table: Option<&str>) -> Result<()> {
        let tables = match table {
            Some(table) => vec![table.to_string()],
            None => self.tables()?,
        };
        for table in tables {
            let rows = self.select_all(&table)?;
            println!("{}", render_rows(&table, &rows));
        }
        Ok(())
    }

    /// Text value stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        debug!("[{}] get {}", self.path.display(), key);
        Ok(self
            .db
            .query_row(
                "SELECT value FROM __cache__ WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten())
    }

    /// Text value under `key` parsed as `T`
    pub fn get_as<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(text) => text.parse::<T>().map(Some).map_err(|_| {
                UtilError::InvalidInput(format!("Cannot convert value of {}: {}", key, text))
            }),
            None => Ok(None),
        }
    }

    /// Store a text value, returning the previous one
    pub fn put(&self, key: &str, value: impl ToString) -> Result<Option<String>> {
        let value = value.to_string();
        let tx = self.db.unchecked_transaction()?;
        let previous = self.get(key)?;
        self.execute(
            "INSERT INTO __cache__ (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            &[&key, &value],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    /// Remove `key` and both of its values
    pub fn delete(&self, key: &str) -> Result<bool> {
        let changed = self.execute("DELETE FROM __cache__ WHERE key = ?1", &[&key])?;
        Ok(changed > 0)
    }

    /// JSON value stored under `key`
    pub fn jget(&self, key: &str) -> Result<Option<Value>> {
        debug!("[{}] jget {}", self.path.display(), key);
        let data = self
            .db
            .query_row(
                "SELECT data FROM __cache__ WHERE key = ?1",
                params![key],
                |row| decode_json(row.get_ref(0)?),
            )
            .optional()?;
        Ok(data.flatten())
    }

    /// Store a JSON value, returning the previous one
    pub fn jput(&self, key: &str, data: &Value) -> Result<Option<Value>> {
        // Bound as a BLOB so column affinity never rewrites the text
        let encoded = serde_json::to_vec(data)?;
        let tx = self.db.unchecked_transaction()?;
        let previous = self.jget(key)?;
        self.execute(
            "INSERT INTO __cache__ (key, data) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET data = excluded.data",
            &[&key, &encoded],
        )?;
        tx.commit()?;
        Ok(previous)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Decode the `data` column; rows written by other tools may hold TEXT or numbers
fn decode_json(value: ValueRef<'_>) -> rusqlite::Result<Option<Value>> {
    let parsed = match value {
        ValueRef::Null => return Ok(None),
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => serde_json::from_slice(bytes),
        other => return Ok(Some(to_json(other))),
    };
    parsed.map(Some).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, value.data_type(), Box::new(e))
    })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(STANDARD.encode(b)),
    }
}

/// Column aligned table, each row tagged with its table name
fn render_rows(table: &str, rows: &[Row]) -> String {
    let mut header = vec!["TABLE".to_string()];
    for row in rows {
        for column in row.keys() {
            if !header.contains(column) {
                header.push(column.clone());
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            header
                .iter()
                .map(|column| match column.as_str() {
                    "TABLE" => table.to_string(),
                    _ => match row.get(column) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    },
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(&header)];
    out.extend(cells.iter().map(|row| line(row)));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(Some(&dir.path().join("kv.db"))).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_returns_previous() {
        let (_dir, store) = store();
        assert_eq!(store.put("k", "b").unwrap(), None);
        assert_eq!(store.put("k", "c").unwrap(), Some("b".to_string()));
        assert_eq!(store.get("k").unwrap(), Some("c".to_string()));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_get_as() {
        let (_dir, store) = store();
        store.put("n", 1).unwrap();
        assert_eq!(store.get_as::<i64>("n").unwrap(), Some(1));
        store.put("n", "x").unwrap();
        assert!(store.get_as::<i64>("n").is_err());
    }

    #[test]
    fn test_json_and_text_are_independent() {
        let (_dir, store) = store();
        assert_eq!(store.jput("k", &json!({"a": 1})).unwrap(), None);
        assert_eq!(store.jput("k", &json!({"b": 2})).unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.jget("k").unwrap(), Some(json!({"b": 2})));

        assert_eq!(store.get("k").unwrap(), None);
        store.put("k", "text").unwrap();
        assert_eq!(store.jget("k").unwrap(), Some(json!({"b": 2})));
        assert_eq!(store.get("k").unwrap(), Some("text".to_string()));
    }

    #[test]
    fn test_json_scalars() {
        let (_dir, store) = store();
        store.jput("n", &json!(5)).unwrap();
        assert_eq!(store.jget("n").unwrap(), Some(json!(5)));
        store.jput("s", &json!("five")).unwrap();
        assert_eq!(store.jget("s").unwrap(), Some(json!("five")));
    }

    #[test]
    fn test_json_numbers_keep_their_form() {
        let (_dir, store) = store();
        for value in [json!(1.0), json!(u64::MAX), json!(-0.5), json!("42"), json!([1.0, 2])] {
            store.jput("num", &value).unwrap();
            assert_eq!(store.jget("num").unwrap(), Some(value.clone()), "{}", value);
        }
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = store();
        store.put("k", "v").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_query_and_tables() {
        let (_dir, store) = store();
        store
            .execute("CREATE TABLE items (id INTEGER, name TEXT, price REAL)", &[])
            .unwrap();
        store
            .execute("INSERT INTO items VALUES (?1, ?2, ?3)", &[&1, &"pen", &1.5])
            .unwrap();

        let rows = store.select_all("items").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("pen"));
        assert_eq!(rows[0]["price"], json!(1.5));

        let tables = store.tables().unwrap();
        assert!(tables.contains(&"__cache__".to_string()));
        assert!(tables.contains(&"items".to_string()));

        assert!(store.query("DELETE FROM items", &[]).is_err());
        assert!(store.dump(None).is_ok());
    }

    #[test]
    fn test_render_rows() {
        let mut row = Row::new();
        row.insert("key".to_string(), json!("k"));
        row.insert("value".to_string(), Value::Null);
        let text = render_rows("__cache__", &[row]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("TABLE"));
        assert!(lines[1].starts_with("__cache__"));
    }
}
