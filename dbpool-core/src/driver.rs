//! The driver contract every backend adapter satisfies (§4.5).
//!
//! The source represents this as three function-pointer vtables, `Cop_T`/`Pop_T`/`Rop_T`
//! ("connection/prepared/result op"), one static instance per backend, selected by
//! prefix-matching the URL protocol against a small compiled-in array
//! (`Connection.c`'s `cops[]`/`getOp`). Per REDESIGN FLAGS this maps onto trait objects: one
//! capability trait per object class, with per-driver implementations registered at startup
//! and dispatched by protocol prefix — the same shape as `sqlx-core`'s
//! `any::driver::{AnyDriver, install_drivers, from_url}` (`sqlx-core/src/any/driver.rs`).

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::url::ConnectionUrl;

/// How a backend accepts positional parameters, i.e. whether SQL text produced by the
/// [placeholder rewriter](crate::rewrite) needs to run over it before `prepare_statement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Accepts `?` natively (SQLite, MySQL).
    Question,
    /// Needs `?` rewritten to `$1, $2, ...` (PostgreSQL).
    Dollar,
    /// Needs `?` rewritten to `:1, :2, ...` (Oracle).
    Colon,
}

/// A connection delegate's vtable, one per backend (the source's `Cop_T`).
///
/// Implementations own all native handles and free them on `Drop`; there is no separate
/// `free` method because Rust's ownership model makes the source's explicit
/// `ConnectionOps::free` redundant (§4.5's "Destruction order" is instead expressed by field
/// order in [`crate::connection::Connection`]).
pub trait ConnectionDriver: Send {
    fn set_query_timeout(&mut self, ms: u32) -> Result<()>;
    fn set_max_rows(&mut self, max: u32) -> Result<()>;
    fn ping(&mut self) -> bool;
    fn begin_transaction(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn last_row_id(&mut self) -> i64;
    fn rows_changed(&mut self) -> i64;
    fn execute(&mut self, sql: &str) -> Result<()>;
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ResultSetDriver>>;
    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn PreparedStatementDriver>>;
    fn last_error(&self) -> Option<String>;
}

/// A prepared statement delegate's vtable (the source's `Pop_T`).
///
/// `index` on every setter below is 1-based, passed through unchanged from
/// [`crate::statement::PreparedStatement`] after its `[1, parameter_count]` range check —
/// unlike [`ResultSetDriver`], which is 0-based (the façade does that translation itself).
pub trait PreparedStatementDriver: Send {
    /// Number of `?`/`$n`/`:n` placeholders this statement was prepared with.
    fn parameter_count(&self) -> usize;
    fn set_string(&mut self, index: usize, value: Option<&str>) -> Result<()>;
    fn set_int(&mut self, index: usize, value: i32) -> Result<()>;
    fn set_llong(&mut self, index: usize, value: i64) -> Result<()>;
    fn set_double(&mut self, index: usize, value: f64) -> Result<()>;
    fn set_blob(&mut self, index: usize, value: Option<&[u8]>) -> Result<()>;
    fn set_timestamp(&mut self, index: usize, value: i64) -> Result<()>;
    fn execute(&mut self) -> Result<()>;
    fn execute_query(&mut self) -> Result<Box<dyn ResultSetDriver>>;
    fn rows_changed(&mut self) -> i64;
}

/// A result set delegate's vtable (the source's `Rop_T`).
///
/// `column_name`/`get_string`/`get_blob` borrow from the delegate's own row buffer; the
/// borrow's lifetime is tied to `&self`/`&mut self` so the compiler enforces "valid only
/// until the next `next()` call or destruction" (§4.4) instead of it being documentation-only.
pub trait ResultSetDriver: Send {
    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> &str;
    /// Byte-count of the current row's value at `index`, 0 if null.
    fn column_size(&self, index: usize) -> usize;
    fn next(&mut self) -> bool;
    fn isnull(&self, index: usize) -> bool;
    fn get_string(&self, index: usize) -> Option<&str>;
    fn get_blob(&self, index: usize) -> Option<&[u8]>;
}

/// A backend's compiled-in registration: name, recognized URL schemes, how it accepts
/// parameters, and its connection factory.
pub struct DriverDescriptor {
    pub name: &'static str,
    pub url_schemes: &'static [&'static str],
    pub placeholder_style: PlaceholderStyle,
    pub open: fn(&ConnectionUrl) -> Result<Box<dyn ConnectionDriver>>,
    /// Library-teardown hook (the source's `ConnectionOps::onStop`), called once by
    /// [`shutdown`] rather than per-connection — e.g. a client library with its own global
    /// init/cleanup pair (MySQL's `libmysqlclient`) releases it here. Most backends have
    /// nothing to do and supply a no-op.
    pub on_stop: fn(),
}

impl std::fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("name", &self.name)
            .field("url_schemes", &self.url_schemes)
            .finish()
    }
}

static DRIVERS: OnceCell<Vec<&'static DriverDescriptor>> = OnceCell::new();

/// Installs the set of compiled-in drivers. Called once by the facade crate's
/// initialization, assembling the list from whichever backend crates were enabled as
/// features. Calling it more than once is a no-op (the first registration wins), matching
/// the source's compiled-in `cops[]` being fixed for the life of the process.
pub fn install_drivers(drivers: Vec<&'static DriverDescriptor>) {
    let _ = DRIVERS.set(drivers);
}

/// Looks up the driver registered for a URL scheme by exact or prefix match, the same rule
/// `Connection.c`'s `getOp` uses (`Str_startsWith(protocol, cops[i]->name)`), so that e.g.
/// `sqlite` matches a `sqlite3`-named driver table.
pub(crate) fn lookup(scheme: &str) -> Option<&'static DriverDescriptor> {
    let drivers = DRIVERS.get()?;
    drivers
        .iter()
        .find(|d| d.url_schemes.iter().any(|s| scheme.starts_with(s)))
        .copied()
}

pub(crate) fn open(url: &ConnectionUrl) -> Result<Box<dyn ConnectionDriver>> {
    let driver = lookup(url.protocol()).ok_or_else(|| crate::url::unsupported(url.protocol()))?;
    (driver.open)(url)
}

pub(crate) fn placeholder_style(url: &ConnectionUrl) -> Result<PlaceholderStyle> {
    Ok(lookup(url.protocol())
        .ok_or_else(|| crate::url::unsupported(url.protocol()))?
        .placeholder_style)
}

/// Calls every installed driver's `on_stop` hook once. Intended for process/library teardown
/// (§4.5's `onStop`), not for [`crate::pool::Pool::stop`] — a pool can be stopped and
/// restarted many times in a process's life, but library teardown happens at most once.
pub fn shutdown() {
    if let Some(drivers) = DRIVERS.get() {
        for driver in drivers {
            (driver.on_stop)();
        }
    }
}

/// Same lookup `open` performs, without opening a connection — `Connection_isSupported`.
pub fn is_supported(url: &str) -> bool {
    match ConnectionUrl::parse(url) {
        Ok(parsed) => lookup(parsed.protocol()).is_some(),
        Err(_) => false,
    }
}

/// Returns the error that `last_error()` implementations should format when the underlying
/// client library cannot supply a message. The façade wraps this at the `Error::Sql` layer;
/// drivers just need to return `None`.
pub const NO_DRIVER_MESSAGE: &str = "?";
