//! The connection façade (§4.2).
//!
//! Owns a driver delegate, the list of prepared statements created from it, and the current
//! result set; routes every call through the [`ConnectionDriver`] contract. Grounded in
//! `original_source/src/db/Connection.c`'s method bodies for the ordering rules (dispose
//! current result before opening a new one, clear `prepared` on `clear()`/drop).

use crate::driver::PlaceholderStyle;
use crate::error::{Error, Result};
use crate::pool::{Pool, Slot};
use crate::result_set::ResultSet;
use crate::statement::PreparedStatement;

const DEFAULT_QUERY_TIMEOUT_MS: u32 = 0;

/// A checked-out logical connection. Not `Clone`, not `Sync`: a `Connection` (and the
/// `PreparedStatement`/`ResultSet` children it owns) may only be used by the thread that
/// checked it out, until [`Connection::close`] returns it (§5: "Connection objects are not
/// thread-safe").
pub struct Connection {
    pool: Pool,
    slot: Option<Slot>,
    query_timeout_ms: u32,
    max_rows: u32,
    transaction_depth: u32,
    current_result: Option<ResultSet>,
    prepared: Vec<PreparedStatement>,
}

impl Connection {
    pub(crate) fn new(pool: Pool, slot: Slot) -> Self {
        Connection {
            pool,
            slot: Some(slot),
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            max_rows: 0,
            transaction_depth: 0,
            current_result: None,
            prepared: Vec::new(),
        }
    }

    fn slot(&self) -> &Slot {
        self.slot.as_ref().expect("connection used after close()")
    }

    fn slot_mut(&mut self) -> &mut Slot {
        self.slot.as_mut().expect("connection used after close()")
    }

    pub(crate) fn placeholder_style(&self) -> Result<PlaceholderStyle> {
        crate::driver::placeholder_style(self.pool.url())
    }

    /// Validates `ms >= 0` is implicit in the `u32` type; stores and pushes to the delegate.
    pub fn set_query_timeout(&mut self, ms: u32) -> Result<()> {
        self.query_timeout_ms = ms;
        self.slot_mut().delegate.set_query_timeout(ms)
    }

    pub fn query_timeout(&self) -> u32 {
        self.query_timeout_ms
    }

    /// The URL of the pool this connection was checked out from (§6's `Connection::getURL`).
    pub fn url(&self) -> &crate::url::ConnectionUrl {
        self.pool.url()
    }

    pub fn set_max_rows(&mut self, n: u32) -> Result<()> {
        self.max_rows = n;
        self.slot_mut().delegate.set_max_rows(n)
    }

    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    pub fn ping(&mut self) -> bool {
        self.slot_mut().delegate.ping()
    }

    /// Nested begins increment the depth counter but, per §9's open-question decision, still
    /// issue one driver `begin_transaction` per call ("flat" semantics — see DESIGN.md).
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.slot_mut().delegate.begin_transaction()?;
        self.transaction_depth += 1;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.transaction_depth = 0;
        self.slot_mut().delegate.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        if self.transaction_depth > 0 {
            self.current_result = None;
        }
        self.transaction_depth = 0;
        self.slot_mut().delegate.rollback()
    }

    pub fn transaction_depth(&self) -> u32 {
        self.transaction_depth
    }

    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.current_result = None;
        self.slot_mut().delegate.execute(sql)
    }

    /// Executes a query with no parameters. Callers with parameters must go through
    /// [`Connection::prepare_statement`] (§9: "treat the explicit prepareStatement path as
    /// canonical and the varargs convenience as best-effort").
    pub fn execute_query(&mut self, sql: &str) -> Result<&mut ResultSet> {
        self.current_result = None;
        let max_rows = self.max_rows;
        let driver_result = self.slot_mut().delegate.execute_query(sql)?;
        self.current_result = Some(ResultSet::new(driver_result, max_rows));
        Ok(self.current_result.as_mut().expect("just assigned"))
    }

    /// Applies the driver's placeholder rewrite (if its native parameter style isn't `?`)
    /// before delegating, per §4.6/§4.5.
    pub fn prepare_statement(&mut self, sql: &str) -> Result<usize> {
        let style = self.placeholder_style()?;
        let rewritten = match style {
            PlaceholderStyle::Question => sql.to_owned(),
            PlaceholderStyle::Dollar => crate::rewrite::rewrite_dollar(sql)?,
            PlaceholderStyle::Colon => crate::rewrite::rewrite_colon(sql)?,
        };
        let driver_statement = self.slot_mut().delegate.prepare_statement(&rewritten)?;
        self.prepared.push(PreparedStatement::new(driver_statement));
        Ok(self.prepared.len() - 1)
    }

    pub fn statement(&mut self, handle: usize) -> Result<&mut PreparedStatement> {
        self.prepared.get_mut(handle).ok_or_else(|| Error::assert("invalid prepared statement handle"))
    }

    /// Disposes the current result set, resets `maxRows`/`queryTimeoutMs` to their defaults,
    /// and destroys every prepared statement created from this connection.
    pub fn clear(&mut self) {
        self.current_result = None;
        self.max_rows = 0;
        self.query_timeout_ms = DEFAULT_QUERY_TIMEOUT_MS;
        self.prepared.clear();
    }

    /// Returns this connection to its parent pool. Does not destroy the physical connection.
    ///
    /// If still in a transaction, attempts a rollback first, swallowing any failure — the
    /// connection goes back to the pool regardless (§7).
    pub fn close(mut self) {
        self.roll_back_if_in_transaction();
        self.clear();
        if let Some(slot) = self.slot.take() {
            self.pool.return_slot(slot);
        }
    }

    fn roll_back_if_in_transaction(&mut self) {
        if self.transaction_depth > 0 {
            if let Some(slot) = self.slot.as_mut() {
                if let Err(err) = slot.delegate.rollback() {
                    tracing::debug!(error = %err, "swallowing rollback failure on return");
                }
            }
            self.transaction_depth = 0;
        }
    }

    pub fn last_row_id(&mut self) -> i64 {
        self.slot_mut().delegate.last_row_id()
    }

    pub fn rows_changed(&mut self) -> i64 {
        self.slot_mut().delegate.rows_changed()
    }

    /// Returns the driver error string, or the `"?"` sentinel if the driver has none (§4.2).
    pub fn get_last_error(&self) -> String {
        self.slot().delegate.last_error().unwrap_or_else(|| crate::driver::NO_DRIVER_MESSAGE.to_owned())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.slot.is_some() {
            self.roll_back_if_in_transaction();
            self.current_result = None;
            self.prepared.clear();
            if let Some(slot) = self.slot.take() {
                self.pool.return_slot(slot);
            }
        }
    }
}
