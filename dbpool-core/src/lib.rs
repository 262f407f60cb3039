//! Core of `dbpool`: the connection pool, the driver contract backend adapters implement, and
//! the SQL-adjacent utilities (placeholder rewriter, temporal parser) they share.
//!
//! This crate is not meant to be used directly; the `dbpool` facade crate re-exports its
//! public surface and wires up whichever backend crates are enabled as Cargo features.

pub mod abort;
pub mod connection;
pub mod driver;
pub mod error;
pub mod pool;
pub mod result_set;
pub mod rewrite;
pub mod statement;
pub mod temporal;
pub mod url;

pub use connection::Connection;
pub use error::{Error, Result};
pub use pool::Pool;
pub use result_set::ResultSet;
pub use statement::PreparedStatement;
pub use url::ConnectionUrl;
