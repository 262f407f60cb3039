//! PostgreSQL backend adapter (§4.5, §5, §6).
//!
//! A thin shim over the synchronous `postgres` crate (the blocking façade `tokio-postgres`
//! ships alongside itself), matching the pool's blocking threading model. `queryTimeoutMs`
//! maps onto `SET statement_timeout` (§5: "PostgreSQL sets `statement_timeout`"), the one
//! backend in the family that can actually enforce it.
//!
//! Because the synchronous driver's row accessors are statically typed per column (`Row::get`
//! wants to know the Rust type up front), [`materialize`] branches on each column's
//! `postgres::types::Type` to build the same driver-owned, untyped [`Cell`] representation the
//! SQLite and MySQL adapters use, so the façade's string-parsing getters (§4.4) work
//! uniformly across backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dbpool_core::driver::{ConnectionDriver, DriverDescriptor, PlaceholderStyle, PreparedStatementDriver, ResultSetDriver};
use dbpool_core::error::{Error, Result};
use dbpool_core::url::ConnectionUrl;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls, Row};

pub static DRIVER: DriverDescriptor = DriverDescriptor {
    name: "postgresql",
    url_schemes: &["postgresql", "postgres"],
    placeholder_style: PlaceholderStyle::Dollar,
    open: open_connection,
    on_stop: || {},
};

const DEFAULT_PORT: u16 = 5432;

fn sql_err(e: postgres::Error) -> Error {
    Error::sql(e.to_string())
}

fn open_connection(url: &ConnectionUrl) -> Result<Box<dyn ConnectionDriver>> {
    let mut config = postgres::Config::new();
    config.host(url.host().unwrap_or("localhost"));
    config.port(url.port().unwrap_or(DEFAULT_PORT));
    config.dbname(url.path());

    if let Some(user) = url.effective_user() {
        config.user(user);
    }
    if let Some(pass) = url.effective_password() {
        config.password(pass);
    }
    if let Some(socket) = url.parameter("unix-socket") {
        config.host(socket);
    }
    if let Some(name) = url.parameter("application-name") {
        config.application_name(name);
    }
    if let Some(secs) = url.parameter("connect-timeout").and_then(|v| v.parse::<u64>().ok()) {
        config.connect_timeout(Duration::from_secs(secs));
    }
    // `use-ssl=` (§6) is accepted as a URL parameter but not wired to a `tls` negotiator here:
    // doing so needs an additional TLS backend crate (`postgres-native-tls` or
    // `postgres-openssl`); plain `NoTls` is used unconditionally.

    let client = config.connect(NoTls).map_err(sql_err)?;
    Ok(Box::new(PgConnection { client: Arc::new(Mutex::new(client)), last_error: None, last_affected: 0 }))
}

/// One Postgres column value, normalized to the text/bytes split the façade's getters expect.
#[derive(Debug, Clone)]
enum Cell {
    Null,
    Text(String),
    Bytes(Vec<u8>),
}

impl Cell {
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

/// Reads column `idx` out of `row` into a [`Cell`], branching on the column's wire type since
/// `Row::get` needs a concrete Rust type at each call site.
fn cell_from_row(row: &Row, idx: usize) -> Cell {
    let ty = row.columns()[idx].type_();
    macro_rules! get_display {
        ($t:ty) => {
            row.try_get::<_, Option<$t>>(idx).ok().flatten().map(|v| Cell::Text(v.to_string())).unwrap_or(Cell::Null)
        };
    }
    match *ty {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(|v| Cell::Text(if v { "t".into() } else { "f".into() }))
            .unwrap_or(Cell::Null),
        Type::INT2 => get_display!(i16),
        Type::INT4 => get_display!(i32),
        Type::INT8 => get_display!(i64),
        Type::FLOAT4 => get_display!(f32),
        Type::FLOAT8 => get_display!(f64),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx).ok().flatten().map(Cell::Bytes).unwrap_or(Cell::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| Cell::Text(v.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Cell::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(|v| Cell::Text(v.format("%Y-%m-%d %H:%M:%S%:z").to_string()))
            .unwrap_or(Cell::Null),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(|v| Cell::Text(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(Cell::Null),
        Type::TIME => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(|v| Cell::Text(v.format("%H:%M:%S").to_string()))
            .unwrap_or(Cell::Null),
        // TEXT/VARCHAR/BPCHAR/NAME and anything unrecognized: try the textual form.
        _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(Cell::Text).unwrap_or(Cell::Null),
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

/// Boxes a [`BoundParam`] as a `ToSql` trait object. Binding `Timestamp` as a raw `i64`
/// matches every other adapter's uniform `setTimestamp(epoch_seconds)` contract (§4.3), but
/// only type-checks against an `int8`/`bigint` column — callers targeting a native `timestamp`
/// column should format the epoch with [`dbpool_core::temporal::to_string`] and bind it as
/// text instead (see DESIGN.md's open-question note).
fn to_sql_param(p: &BoundParam) -> Box<dyn ToSql + Sync> {
    match p {
        BoundParam::Null => Box::new(Option::<String>::None),
        BoundParam::Text(s) => Box::new(s.clone()),
        BoundParam::Int(i) => Box::new(*i),
        BoundParam::LLong(i) => Box::new(*i),
        BoundParam::Double(d) => Box::new(*d),
        BoundParam::Blob(b) => Box::new(b.clone()),
        BoundParam::Timestamp(epoch) => Box::new(*epoch),
    }
}

struct PgConnection {
    client: Arc<Mutex<Client>>,
    last_error: Option<String>,
    last_affected: i64,
}

fn materialize(client: &mut Client, sql: &str, params: &[BoundParam]) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let boxed: Vec<Box<dyn ToSql + Sync>> = params.iter().map(to_sql_param).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref()).collect();
    let rows = client.query(sql, &refs).map_err(sql_err)?;

    let columns: Vec<String> = rows.first().map(|r| r.columns().iter().map(|c| c.name().to_owned()).collect()).unwrap_or_default();

    let materialized = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| cell_from_row(row, i)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    // A zero-row result still needs correct column metadata; re-query via `query_one`'s
    // sibling `prepare` to fetch column descriptors when no row came back.
    let columns = if columns.is_empty() {
        client.prepare(sql).map_err(sql_err)?.columns().iter().map(|c| c.name().to_owned()).collect()
    } else {
        columns
    };

    Ok((columns, materialized))
}

impl ConnectionDriver for PgConnection {
    fn set_query_timeout(&mut self, ms: u32) -> Result<()> {
        let mut client = self.client.lock().expect("postgres connection mutex poisoned");
        client.batch_execute(&format!("SET statement_timeout = {ms}")).map_err(sql_err)
    }

    fn set_max_rows(&mut self, _max: u32) -> Result<()> {
        Ok(())
    }

    fn ping(&mut self) -> bool {
        let mut client = self.client.lock().expect("postgres connection mutex poisoned");
        client.simple_query("SELECT 1").is_ok()
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.client.lock().expect("postgres connection mutex poisoned").batch_execute("BEGIN").map_err(sql_err)
    }

    fn commit(&mut self) -> Result<()> {
        self.client.lock().expect("postgres connection mutex poisoned").batch_execute("COMMIT").map_err(sql_err)
    }

    fn rollback(&mut self) -> Result<()> {
        self.client.lock().expect("postgres connection mutex poisoned").batch_execute("ROLLBACK").map_err(sql_err)
    }

    fn last_row_id(&mut self) -> i64 {
        // Postgres has no cross-table auto-increment handle analogous to `LAST_INSERT_ID()`;
        // callers use `RETURNING id` instead. 0 is the source's documented "no-op" sentinel.
        0
    }

    fn rows_changed(&mut self) -> i64 {
        self.last_affected
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        let mut client = self.client.lock().expect("postgres connection mutex poisoned");
        let affected = client.execute(sql, &[]).map_err(|e| {
            self.last_error = Some(e.to_string());
            sql_err(e)
        })?;
        drop(client);
        self.last_affected = affected as i64;
        Ok(())
    }

    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ResultSetDriver>> {
        let mut client = self.client.lock().expect("postgres connection mutex poisoned");
        let (columns, rows) = materialize(&mut client, sql, &[])?;
        Ok(Box::new(PgResultSet { columns, rows, position: None }))
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn PreparedStatementDriver>> {
        let client = self.client.lock().expect("postgres connection mutex poisoned");
        let parameter_count = client.prepare(sql).map_err(sql_err)?.params().len();
        drop(client);
        Ok(Box::new(PgPreparedStatement {
            client: Arc::clone(&self.client),
            sql: sql.to_owned(),
            params: vec![BoundParam::Null; parameter_count],
            parameter_count,
            last_affected: 0,
        }))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

struct PgPreparedStatement {
    client: Arc<Mutex<Client>>,
    sql: String,
    params: Vec<BoundParam>,
    parameter_count: usize,
    last_affected: i64,
}

impl PgPreparedStatement {
    fn set(&mut self, index: usize, value: BoundParam) -> Result<()> {
        self.params[index - 1] = value;
        Ok(())
    }
}

impl PreparedStatementDriver for PgPreparedStatement {
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
        let mut client = self.client.lock().expect("postgres connection mutex poisoned");
        let boxed: Vec<Box<dyn ToSql + Sync>> = self.params.iter().map(to_sql_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref()).collect();
        self.last_affected = client.execute(&self.sql, &refs).map_err(sql_err)? as i64;
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSetDriver>> {
        let mut client = self.client.lock().expect("postgres connection mutex poisoned");
        let (columns, rows) = materialize(&mut client, &self.sql, &self.params)?;
        Ok(Box::new(PgResultSet { columns, rows, position: None }))
    }

    fn rows_changed(&mut self) -> i64 {
        self.last_affected
    }
}

struct PgResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    position: Option<usize>,
}

impl ResultSetDriver for PgResultSet {
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
