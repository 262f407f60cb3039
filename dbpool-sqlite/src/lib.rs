//! SQLite backend adapter (§4.5, §5).
//!
//! A thin shim over `rusqlite` rather than a reimplementation of the SQLite wire/embedding
//! protocol — per-driver protocol implementations are explicitly out of scope (spec §1) and
//! `rusqlite` is itself a synchronous, blocking client, matching the pool's threading model.
//!
//! BUSY/LOCKED tolerance (§5: "uses the SQLite unlock-notify mechanism or an exponential-
//! backoff retry loop") is delegated to `rusqlite::Connection::busy_timeout`, which drives
//! SQLite's own internal busy-handler backoff — the library-internal lock it spins on is
//! never the pool mutex, satisfying §5's "holding only the SQLite-internal lock".

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dbpool_core::driver::{ConnectionDriver, DriverDescriptor, PlaceholderStyle, PreparedStatementDriver, ResultSetDriver};
use dbpool_core::error::{Error, Result};
use dbpool_core::url::ConnectionUrl;

/// The compiled-in registration for this backend. Consumed by the facade crate's
/// `install_drivers` call when the `sqlite` feature is enabled.
pub static DRIVER: DriverDescriptor = DriverDescriptor {
    name: "sqlite",
    url_schemes: &["sqlite"],
    placeholder_style: PlaceholderStyle::Question,
    open: open_connection,
    // `rusqlite`'s bundled SQLite has no process-wide handle to release.
    on_stop: || {},
};

fn sql_err(e: rusqlite::Error) -> Error {
    Error::sql(e.to_string())
}

fn open_connection(url: &ConnectionUrl) -> Result<Box<dyn ConnectionDriver>> {
    let path = url.path();
    let conn = if path.is_empty() || path == ":memory:" {
        rusqlite::Connection::open_in_memory()
    } else {
        rusqlite::Connection::open(path)
    }
    .map_err(sql_err)?;

    if let Some(limit) = url.parameter("heap_limit").and_then(|v| v.parse::<i64>().ok()) {
        let _ = conn.pragma_update(None, "soft_heap_limit", limit);
    }
    if let Some(sync) = url.parameter("synchronous") {
        let _ = conn.pragma_update(None, "synchronous", sync);
    }

    Ok(Box::new(SqliteConnection { conn: Arc::new(Mutex::new(conn)), last_error: None }))
}

/// One SQLite value, materialized eagerly out of a `rusqlite::Row` so result sets don't need
/// to hold a borrow on the originating `Statement` (see the module doc for why).
#[derive(Debug, Clone)]
enum Cell {
    Null,
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    fn from_value_ref(v: rusqlite::types::ValueRef<'_>) -> Self {
        match v {
            rusqlite::types::ValueRef::Null => Cell::Null,
            rusqlite::types::ValueRef::Integer(i) => Cell::Text(i.to_string()),
            rusqlite::types::ValueRef::Real(r) => Cell::Text(r.to_string()),
            rusqlite::types::ValueRef::Text(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
            rusqlite::types::ValueRef::Blob(bytes) => Cell::Blob(bytes.to_vec()),
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.as_str()),
            Cell::Blob(_) => None,
        }
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.as_bytes()),
            Cell::Blob(b) => Some(b.as_slice()),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    fn byte_len(&self) -> usize {
        self.as_bytes().map(<[u8]>::len).unwrap_or(0)
    }
}

fn bound_value(v: &BoundParam) -> rusqlite::types::Value {
    match v {
        BoundParam::Null => rusqlite::types::Value::Null,
        BoundParam::Text(s) => rusqlite::types::Value::Text(s.clone()),
        BoundParam::Int(i) => rusqlite::types::Value::Integer(*i as i64),
        BoundParam::LLong(i) => rusqlite::types::Value::Integer(*i),
        BoundParam::Double(d) => rusqlite::types::Value::Real(*d),
        BoundParam::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
        BoundParam::Timestamp(epoch) => rusqlite::types::Value::Integer(*epoch),
    }
}

#[derive(Debug, Clone)]
enum BoundParam {
    Null,
    Text(String),
    Int(i32),
    LLong(i64),
    Double(f64),
    Blob(Vec<u8>),
    Timestamp(i64),
}

struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    last_error: Option<String>,
}

impl SqliteConnection {
    fn materialize(conn: &rusqlite::Connection, sql: &str, params: &[BoundParam]) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
        let mut stmt = conn.prepare(sql).map_err(sql_err)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let bound: Vec<rusqlite::types::Value> = params.iter().map(bound_value).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter())).map_err(sql_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(sql_err)? {
            let mut cells = Vec::with_capacity(column_names.len());
            for i in 0..column_names.len() {
                let value_ref = row.get_ref(i).map_err(sql_err)?;
                cells.push(Cell::from_value_ref(value_ref));
            }
            out.push(cells);
        }
        Ok((column_names, out))
    }
}

impl ConnectionDriver for SqliteConnection {
    fn set_query_timeout(&mut self, ms: u32) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.busy_timeout(Duration::from_millis(ms as u64)).map_err(sql_err)
    }

    fn set_max_rows(&mut self, _max: u32) -> Result<()> {
        // Enforced at the facade layer (ResultSet::next), nothing to push down to SQLite.
        Ok(())
    }

    fn ping(&mut self) -> bool {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }

    fn begin_transaction(&mut self) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute_batch("BEGIN").map_err(sql_err)
    }

    fn commit(&mut self) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute_batch("COMMIT").map_err(sql_err)
    }

    fn rollback(&mut self) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute_batch("ROLLBACK").map_err(sql_err)
    }

    fn last_row_id(&mut self) -> i64 {
        self.conn.lock().expect("sqlite connection mutex poisoned").last_insert_rowid()
    }

    fn rows_changed(&mut self) -> i64 {
        self.conn.lock().expect("sqlite connection mutex poisoned").changes() as i64
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute_batch(sql).map_err(|e| {
            self.last_error = Some(e.to_string());
            sql_err(e)
        })
    }

    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ResultSetDriver>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let (columns, rows) = Self::materialize(&conn, sql, &[])?;
        Ok(Box::new(SqliteResultSet { columns, rows, position: None }))
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn PreparedStatementDriver>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let parameter_count = conn.prepare(sql).map_err(sql_err)?.parameter_count();
        drop(conn);
        Ok(Box::new(SqlitePreparedStatement {
            conn: Arc::clone(&self.conn),
            sql: sql.to_owned(),
            params: vec![BoundParam::Null; parameter_count],
            parameter_count,
        }))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

struct SqlitePreparedStatement {
    conn: Arc<Mutex<rusqlite::Connection>>,
    sql: String,
    params: Vec<BoundParam>,
    parameter_count: usize,
}

impl SqlitePreparedStatement {
    fn set(&mut self, index: usize, value: BoundParam) -> Result<()> {
        self.params[index - 1] = value;
        Ok(())
    }
}

impl PreparedStatementDriver for SqlitePreparedStatement {
    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn set_string(&mut self, index: usize, value: Option<&str>) -> Result<()> {
        self.set(index, value.map(|s| BoundParam::Text(s.to_owned())).unwrap_or(BoundParam::Null))
    }

    fn set_int(&mut self, index: usize, value: i32) -> Result<()> {
        self.set(index, BoundParam::Int(value))
    }

    fn set_llong(&mut self, index: usize, value: i64) -> Result<()> {
        self.set(index, BoundParam::LLong(value))
    }

    fn set_double(&mut self, index: usize, value: f64) -> Result<()> {
        self.set(index, BoundParam::Double(value))
    }

    fn set_blob(&mut self, index: usize, value: Option<&[u8]>) -> Result<()> {
        self.set(index, value.map(|b| BoundParam::Blob(b.to_vec())).unwrap_or(BoundParam::Null))
    }

    fn set_timestamp(&mut self, index: usize, value: i64) -> Result<()> {
        self.set(index, BoundParam::Timestamp(value))
    }

    fn execute(&mut self) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn.prepare(&self.sql).map_err(sql_err)?;
        let bound: Vec<rusqlite::types::Value> = self.params.iter().map(bound_value).collect();
        stmt.execute(rusqlite::params_from_iter(bound.iter())).map_err(sql_err)?;
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSetDriver>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let (columns, rows) = SqliteConnection::materialize(&conn, &self.sql, &self.params)?;
        Ok(Box::new(SqliteResultSet { columns, rows, position: None }))
    }

    fn rows_changed(&mut self) -> i64 {
        self.conn.lock().expect("sqlite connection mutex poisoned").changes() as i64
    }
}

struct SqliteResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    position: Option<usize>,
}

impl ResultSetDriver for SqliteResultSet {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> &str {
        &self.columns[index]
    }

    fn column_size(&self, index: usize) -> usize {
        self.position.map(|p| self.rows[p][index].byte_len()).unwrap_or(0)
    }

    fn next(&mut self) -> bool {
        let next_pos = self.position.map(|p| p + 1).unwrap_or(0);
        if next_pos < self.rows.len() {
            self.position = Some(next_pos);
            true
        } else {
            false
        }
    }

    fn isnull(&self, index: usize) -> bool {
        self.position.map(|p| self.rows[p][index].is_null()).unwrap_or(true)
    }

    fn get_string(&self, index: usize) -> Option<&str> {
        self.position.and_then(|p| self.rows[p][index].as_text())
    }

    fn get_blob(&self, index: usize) -> Option<&[u8]> {
        self.position.and_then(|p| self.rows[p][index].as_bytes())
    }
}
