//! Error and Result types.
//!
//! The original C library propagates failures through a thread-local
//! exception stack with three kinds: `AssertException`, `SQLException` and
//! `MemoryException` (see §7 of SPEC_FULL.md). Rust's native replacement is
//! `Result<T, Error>` threaded through with `?`; [`Error`] keeps the same
//! three-way split as variants instead.

use std::fmt;

/// A specialized `Result` type for dbpool.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A generic error that represents all the ways a method can fail inside of dbpool.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Precondition or invariant violation: null argument where required, index out of
    /// range, negative size, etc. Corresponds to the source's `AssertException`.
    ///
    /// Uncaught, this is expected to reach the installed [`crate::abort::abort_handler`].
    #[error("assertion failed: {0}")]
    Assert(String),

    /// An error reported by the database driver: connect, execute, fetch, bind, or parse
    /// failure. Corresponds to the source's `SQLException`.
    #[error("{0}")]
    Sql(String),

    /// Allocation failure. Treated as effectively fatal by the default abort handler, but
    /// still represented as a `Result` so long-running callers can choose to unwind instead.
    #[error("out of memory")]
    Memory,

    /// The connection URL could not be parsed.
    #[error("invalid connection url: {0}")]
    UrlParse(#[from] url::ParseError),

    /// `url.protocol` did not match any registered driver.
    #[error("database protocol {0:?} not supported")]
    UnsupportedProtocol(String),

    /// A [`crate::pool::Pool::acquire`]-adjacent timeout: no connection became available, or
    /// opening a new physical connection did not complete, within `connection_timeout`.
    #[error("timed out while waiting for an open connection")]
    TimedOut,

    /// The pool has been stopped; no further connections may be acquired or returned.
    #[error("attempted to use a connection pool that has been stopped")]
    PoolStopped,

    /// Column was not found by name in a row (`ResultSet::*_by_name`).
    #[error("Invalid column name '{0}'")]
    ColumnNotFound(String),

    /// Column index was out of bounds, e.g. asking for column 4 in a 2-column row. Column
    /// indices are 1-based at every public API boundary (§6).
    #[error("column index out of bounds: there are {len} columns but the index is {index}")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// Prepared statement parameter index was outside `[1, parameter_count]`.
    #[error("parameter index is out of range")]
    ParameterIndexOutOfRange,

    /// Value at the current cursor position could not be parsed as the requested type.
    #[error("could not parse column value as the requested type: {0}")]
    ValueParse(String),

    /// Unexpected or invalid data was encountered talking to the backend: this indicates a
    /// programming error in a driver, or backend/connection corruption.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    pub fn assert(msg: impl Into<String>) -> Self {
        Error::Assert(msg.into())
    }

    pub fn sql(msg: impl Into<String>) -> Self {
        Error::Sql(msg.into())
    }

    /// `true` if this is the kind of error [`crate::pool::Pool::return_connection`] is
    /// permitted to swallow (a failed best-effort rollback on return).
    pub fn is_sql(&self) -> bool {
        matches!(self, Error::Sql(_))
    }
}
