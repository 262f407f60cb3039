//! `dbpool`: a thread-safe database connection pool with a pluggable driver layer, exposing a
//! uniform SQL API over SQLite, MySQL, PostgreSQL and Oracle (§1-2 of SPEC_FULL.md).
//!
//! All the load-bearing engineering — the pool lifecycle and reaper, the connection/
//! statement/result-set façades, the driver dispatch contract, the placeholder rewriter and
//! the temporal parser — lives in [`dbpool_core`] and is re-exported here. This crate's own
//! job, grounded in `sqlx-core/src/any/driver.rs`'s `install_drivers`, is just to assemble the
//! compiled-in backend list from whichever `sqlite`/`mysql`/`postgres`/`oracle` features are
//! enabled and install it once before first use.

pub use dbpool_core::connection::Connection;
pub use dbpool_core::driver::{ConnectionDriver, DriverDescriptor, PreparedStatementDriver, ResultSetDriver};
pub use dbpool_core::error::{Error, Result};
pub use dbpool_core::pool::Pool;
pub use dbpool_core::result_set::ResultSet;
pub use dbpool_core::statement::PreparedStatement;
pub use dbpool_core::temporal::{self, SqlDate, SqlDateTime, SqlTime};
pub use dbpool_core::url::ConnectionUrl;
pub use dbpool_core::{abort, rewrite};

use std::sync::Once;

static INSTALL: Once = Once::new();

/// Assembles the compiled-in driver list from enabled features and installs it
/// (`dbpool_core::driver::install_drivers`). Idempotent; every entry point that can open a
/// connection calls this first, so callers never have to remember to.
fn ensure_drivers_installed() {
    INSTALL.call_once(|| {
        let mut drivers = Vec::new();

        #[cfg(feature = "sqlite")]
        drivers.push(&dbpool_sqlite::DRIVER);
        #[cfg(feature = "mysql")]
        drivers.push(&dbpool_mysql::DRIVER);
        #[cfg(feature = "postgres")]
        drivers.push(&dbpool_postgres::DRIVER);
        #[cfg(feature = "oracle")]
        drivers.push(&dbpool_oracle::DRIVER);

        dbpool_core::driver::install_drivers(drivers);
    });
}

/// Constructs a new, stopped connection pool for `url` (§4.1's `new`).
///
/// The sole supported way to construct a [`Pool`]: it makes sure the compiled-in drivers are
/// registered before returning, so that a subsequent `start()`/`get_connection()` never fails
/// with `UnsupportedProtocol` for a backend whose feature is actually enabled.
pub fn new_pool(url: &str) -> Result<Pool> {
    ensure_drivers_installed();
    Pool::new_unregistered(url)
}

/// `true` if `url`'s protocol is recognized by a compiled-in driver, without opening a
/// connection (§4.5's `Connection.isSupported`).
///
/// Installs the compiled-in drivers first, same as [`new_pool`], so the answer doesn't depend
/// on whether some other entry point happened to run earlier in the process.
pub fn is_supported(url: &str) -> bool {
    ensure_drivers_installed();
    dbpool_core::driver::is_supported(url)
}

/// The library version string reported by [`Pool::version`], exposed at the crate root to
/// match the source's `ConnectionPool_version()`.
pub fn version() -> &'static str {
    Pool::version()
}

/// Runs every installed driver's library-teardown hook (§4.5's `onStop`) once.
///
/// This is distinct from [`Pool::stop`]: a pool can be started and stopped many times in a
/// process's life, but this call is for the process shutting down entirely, the way
/// `libmysqlclient`-backed drivers need `mysql_library_end()` at exit. Safe to call even if
/// no pool was ever started.
pub fn shutdown() {
    dbpool_core::driver::shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!version().is_empty());
    }

    /// `is_supported` must install drivers itself — this test deliberately does not call
    /// `ensure_drivers_installed()` first, to guard against the entry-point-order bug where
    /// the answer depended on some other function having run earlier in the process.
    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_protocol_is_supported_without_priming() {
        assert!(is_supported("sqlite:///tmp/x.db"));
        assert!(!is_supported("notareal://host/db"));
    }
}
