//! MySQL backend adapter (§4.5, §5, §6).
//!
//! A thin shim over the synchronous `mysql` crate, matching the pool's blocking threading
//! model (per-driver wire protocol implementations are out of scope — spec §1). Connection
//! options are assembled field-by-field from the already-parsed [`ConnectionUrl`] rather than
//! handed to `mysql::Opts::from_url` wholesale, since the spec's query parameters
//! (`unix-socket=`, `compress=`, `use-ssl=`, `charset=`, `connect-timeout=`, `secure-auth=`,
//! §6) don't map onto a single connection string the crate would parse for us.
//!
//! `queryTimeoutMs` (§5: "MySQL cannot enforce it") is accepted by
//! [`MysqlConnection::set_query_timeout`] but intentionally not pushed to the server — there
//! is no portable per-statement timeout in the MySQL wire protocol the crate exposes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dbpool_core::driver::{ConnectionDriver, DriverDescriptor, PlaceholderStyle, PreparedStatementDriver, ResultSetDriver};
use dbpool_core::error::{Error, Result};
use dbpool_core::url::ConnectionUrl;
use mysql::prelude::Queryable;

pub static DRIVER: DriverDescriptor = DriverDescriptor {
    name: "mysql",
    url_schemes: &["mysql"],
    placeholder_style: PlaceholderStyle::Question,
    open: open_connection,
    // The source's `onStop` exists because `libmysqlclient` needs an explicit
    // `mysql_library_end()` at process exit; the pure-Rust `mysql` crate used here has no
    // such global handle, so this is a no-op.
    on_stop: || {},
};

const DEFAULT_PORT: u16 = 3306;

fn sql_err(e: mysql::Error) -> Error {
    Error::sql(e.to_string())
}

fn open_connection(url: &ConnectionUrl) -> Result<Box<dyn ConnectionDriver>> {
    let mut builder = mysql::OptsBuilder::new()
        .ip_or_hostname(url.host().map(str::to_owned).or(Some("localhost".to_owned())))
        .tcp_port(url.port().unwrap_or(DEFAULT_PORT))
        .db_name(Some(url.path().to_owned()));

    if let Some(user) = url.effective_user() {
        builder = builder.user(Some(user.to_owned()));
    }
    if let Some(pass) = url.effective_password() {
        builder = builder.pass(Some(pass.to_owned()));
    }
    if let Some(socket) = url.parameter("unix-socket") {
        builder = builder.socket(Some(socket.to_owned()));
    }
    if let Some(charset) = url.parameter("charset") {
        builder = builder.init(vec![format!("SET NAMES '{charset}'")]);
    }
    if let Some(secs) = url.parameter("connect-timeout").and_then(|v| v.parse::<u64>().ok()) {
        builder = builder.tcp_connect_timeout(Some(Duration::from_secs(secs)));
    }
    // `compress=`/`use-ssl=` (§6) are accepted as URL parameters but not wired: this crate is
    // pulled in with `default-features = false, features = ["minimal"]`, which excludes the
    // `native-tls`/`compression` feature gates those options need.

    let opts = mysql::Opts::from(builder);
    let conn = mysql::Conn::new(opts).map_err(sql_err)?;
    Ok(Box::new(MysqlConnection { conn: Arc::new(Mutex::new(conn)), last_error: None }))
}

/// One MySQL column value, normalized to the text/bytes split the façade's getters expect.
#[derive(Debug, Clone)]
enum Cell {
    Null,
    Text(String),
    Bytes(Vec<u8>),
}

impl Cell {
    fn from_value(v: mysql::Value) -> Self {
        match v {
            mysql::Value::NULL => Cell::Null,
            mysql::Value::Bytes(b) => Cell::Bytes(b),
            mysql::Value::Int(i) => Cell::Text(i.to_string()),
            mysql::Value::UInt(i) => Cell::Text(i.to_string()),
            mysql::Value::Float(f) => Cell::Text(f.to_string()),
            mysql::Value::Double(f) => Cell::Text(f.to_string()),
            mysql::Value::Date(y, mo, d, h, mi, s, micro) => Cell::Text(if h == 0 && mi == 0 && s == 0 && micro == 0 {
                format!("{y:04}-{mo:02}-{d:02}")
            } else {
                format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{micro:06}")
            }),
            mysql::Value::Time(neg, days, h, mi, s, micro) => {
                let sign = if neg { "-" } else { "" };
                let total_h = u64::from(days) * 24 + u64::from(h);
                Cell::Text(format!("{sign}{total_h:02}:{mi:02}:{s:02}.{micro:06}"))
            }
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.as_str()),
            Cell::Bytes(b) => std::str::from_utf8(b).ok(),
        }
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.as_bytes()),
            Cell::Bytes(b) => Some(b.as_slice()),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    fn byte_len(&self) -> usize {
        self.as_bytes().map(<[u8]>::len).unwrap_or(0)
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

fn bound_value(v: &BoundParam) -> mysql::Value {
    match v {
        BoundParam::Null => mysql::Value::NULL,
        BoundParam::Text(s) => mysql::Value::Bytes(s.clone().into_bytes()),
        BoundParam::Int(i) => mysql::Value::Int(*i as i64),
        BoundParam::LLong(i) => mysql::Value::Int(*i),
        BoundParam::Double(d) => mysql::Value::Double(*d),
        BoundParam::Blob(b) => mysql::Value::Bytes(b.clone()),
        BoundParam::Timestamp(epoch) => mysql::Value::Int(*epoch),
    }
}

struct MysqlConnection {
    conn: Arc<Mutex<mysql::Conn>>,
    last_error: Option<String>,
}

/// Drains a `QueryResult` (either the text or binary protocol, depending on whether the
/// caller went through `query_iter` or `exec_iter`) into owned columns/rows so the result set
/// façade doesn't need to hold a borrow on the originating `Conn`.
fn drain_result<P: mysql::prelude::Protocol>(mut result: mysql::QueryResult<'_, '_, '_, P>) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let columns: Vec<String> = result
        .columns()
        .as_ref()
        .map(|cols| cols.iter().map(|c| c.name_str().into_owned()).collect())
        .unwrap_or_default();

    let mut rows = Vec::new();
    for row in result.by_ref() {
        let row = row.map_err(sql_err)?;
        let mut values = row.unwrap();
        rows.push(values.drain(..).map(Cell::from_value).collect());
    }
    Ok((columns, rows))
}

fn materialize(conn: &mut mysql::Conn, sql: &str, params: Vec<BoundParam>) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let bound: Vec<mysql::Value> = params.iter().map(bound_value).collect();
    if bound.is_empty() {
        drain_result(conn.query_iter(sql).map_err(sql_err)?)
    } else {
        let stmt = conn.prep(sql).map_err(sql_err)?;
        drain_result(conn.exec_iter(&stmt, mysql::Params::Positional(bound)).map_err(sql_err)?)
    }
}

impl ConnectionDriver for MysqlConnection {
    fn set_query_timeout(&mut self, _ms: u32) -> Result<()> {
        // Advisory only (§5); MySQL's wire protocol has no per-statement timeout knob.
        Ok(())
    }

    fn set_max_rows(&mut self, _max: u32) -> Result<()> {
        Ok(())
    }

    fn ping(&mut self) -> bool {
        self.conn.lock().expect("mysql connection mutex poisoned").ping()
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.conn.lock().expect("mysql connection mutex poisoned").query_drop("START TRANSACTION").map_err(sql_err)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.lock().expect("mysql connection mutex poisoned").query_drop("COMMIT").map_err(sql_err)
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.lock().expect("mysql connection mutex poisoned").query_drop("ROLLBACK").map_err(sql_err)
    }

    fn last_row_id(&mut self) -> i64 {
        self.conn.lock().expect("mysql connection mutex poisoned").last_insert_id() as i64
    }

    fn rows_changed(&mut self) -> i64 {
        self.conn.lock().expect("mysql connection mutex poisoned").affected_rows() as i64
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        let mut conn = self.conn.lock().expect("mysql connection mutex poisoned");
        conn.query_drop(sql).map_err(|e| {
            self.last_error = Some(e.to_string());
            sql_err(e)
        })
    }

    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ResultSetDriver>> {
        let mut conn = self.conn.lock().expect("mysql connection mutex poisoned");
        let (columns, rows) = materialize(&mut conn, sql, Vec::new())?;
        Ok(Box::new(MysqlResultSet { columns, rows, position: None }))
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn PreparedStatementDriver>> {
        let conn = self.conn.lock().expect("mysql connection mutex poisoned");
        let parameter_count = sql.bytes().filter(|&b| b == b'?').count();
        drop(conn);
        Ok(Box::new(MysqlPreparedStatement {
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

struct MysqlPreparedStatement {
    conn: Arc<Mutex<mysql::Conn>>,
    sql: String,
    params: Vec<BoundParam>,
    parameter_count: usize,
}

impl MysqlPreparedStatement {
    fn set(&mut self, index: usize, value: BoundParam) -> Result<()> {
        self.params[index - 1] = value;
        Ok(())
    }
}

impl PreparedStatementDriver for MysqlPreparedStatement {
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
        let mut conn = self.conn.lock().expect("mysql connection mutex poisoned");
        let bound: Vec<mysql::Value> = self.params.iter().map(bound_value).collect();
        if bound.is_empty() {
            conn.query_drop(&self.sql).map_err(sql_err)
        } else {
            let stmt = conn.prep(&self.sql).map_err(sql_err)?;
            conn.exec_drop(&stmt, mysql::Params::Positional(bound)).map_err(sql_err)
        }
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSetDriver>> {
        let mut conn = self.conn.lock().expect("mysql connection mutex poisoned");
        let (columns, rows) = materialize(&mut conn, &self.sql, self.params.clone())?;
        Ok(Box::new(MysqlResultSet { columns, rows, position: None }))
    }

    fn rows_changed(&mut self) -> i64 {
        self.conn.lock().expect("mysql connection mutex poisoned").affected_rows() as i64
    }
}

struct MysqlResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    position: Option<usize>,
}

impl ResultSetDriver for MysqlResultSet {
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
