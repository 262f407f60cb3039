//! The connection pool (§4.1): lifecycle, acquire/release, and the reaper.
//!
//! Grounded in `sqlx-core/src/pool/{mod,inner,options}.rs` for the overall split between a
//! small `Pool` handle and an inner state object, but the concurrency primitive itself is
//! rewritten from the teacher's semaphore-based async waiter queue to a blocking
//! `Mutex`/`Condvar` pair, per `original_source/src/db/ConnectionPool.c`'s `LOCK`/`WAIT_SIGNAL`
//! macros and §5's mutex discipline (a single mutex covers the connection set, configuration,
//! and `stopped`; the sweeper sleeps on the condvar with an absolute deadline;
//! `getConnection` never blocks on a full pool, it returns `None` immediately).
//!
//! A connection checked out by a client is removed from `connections` for the duration of the
//! checkout (its `Slot` lives inside the returned [`Connection`] instead) rather than staying
//! in the vec flagged "in-use". This sidesteps holding the pool mutex across driver calls
//! (§5: "the mutex is not held across driver calls in general") while keeping the same
//! observable accounting: `size()` counts both, `active()` counts what's checked out.

mod reaper;
mod slot;

use std::sync::{Arc, Condvar, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::connection::Connection;
use crate::driver;
use crate::error::{Error, Result};
use crate::url::ConnectionUrl;

pub(crate) use slot::Slot;

const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Pool construction/tuning options, set before [`Pool::start`] or at any time afterward
/// (every setter takes the pool mutex, per §4.1's "configure setters... mutate respective
/// fields under the mutex").
#[derive(Debug, Clone)]
struct PoolOptions {
    initial: u32,
    max_connections: u32,
    connection_timeout_seconds: u32,
    sweep_interval_seconds: u32,
    reaper_enabled: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            initial: 5,
            max_connections: 20,
            connection_timeout_seconds: 30,
            sweep_interval_seconds: 60,
            reaper_enabled: false,
        }
    }
}

struct PoolState {
    /// Physical connections currently available (not checked out).
    connections: Vec<Slot>,
    /// Count of connections currently checked out; these slots temporarily live inside their
    /// [`Connection`] handle rather than here.
    active: usize,
    options: PoolOptions,
    stopped: bool,
    sweeper_should_stop: bool,
}

struct Shared {
    url: ConnectionUrl,
    state: Mutex<PoolState>,
    condvar: Condvar,
}

/// A thread-safe, bounded pool of physical backend connections.
///
/// Cloning a `Pool` is cheap and shares the same underlying state (`Arc`), matching
/// `sqlx::Pool`'s clone-as-handle semantics.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
    sweeper: Arc<Mutex<Option<std::thread::JoinHandle<()>>>>,
}

impl Pool {
    /// Constructs a pool in the stopped state with the defaults from §4.1:
    /// `{maxConnections=20, initial=5, connectionTimeoutSeconds=30, sweepIntervalSeconds=60,
    /// reaperEnabled=false}`.
    ///
    /// Does *not* register any backend drivers — this crate has no knowledge of
    /// `dbpool-sqlite`/`dbpool-mysql`/etc. Not meant to be called directly: the `dbpool`
    /// facade crate's `new_pool` is the supported constructor, which installs the compiled-in
    /// drivers first and is the only path re-exported there.
    #[doc(hidden)]
    pub fn new_unregistered(url: &str) -> Result<Self> {
        let url = ConnectionUrl::parse(url)?;
        Ok(Pool {
            shared: Arc::new(Shared {
                url,
                state: Mutex::new(PoolState {
                    connections: Vec::new(),
                    active: 0,
                    options: PoolOptions::default(),
                    stopped: true,
                    sweeper_should_stop: false,
                }),
                condvar: Condvar::new(),
            }),
            sweeper: Arc::new(Mutex::new(None)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.shared.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_initial_connections(&self, initial: u32) -> Result<()> {
        let mut state = self.lock();
        if initial > state.options.max_connections {
            return Err(Error::assert("initial must be <= maxConnections"));
        }
        state.options.initial = initial;
        Ok(())
    }

    pub fn initial_connections(&self) -> u32 {
        self.lock().options.initial
    }

    pub fn set_max_connections(&self, max: u32) -> Result<()> {
        let mut state = self.lock();
        if max < state.options.initial {
            return Err(Error::assert("maxConnections must be >= initial"));
        }
        state.options.max_connections = max;
        Ok(())
    }

    pub fn max_connections(&self) -> u32 {
        self.lock().options.max_connections
    }

    pub fn set_connection_timeout(&self, seconds: u32) -> Result<()> {
        if seconds == 0 {
            return Err(Error::assert("connectionTimeoutSeconds must be > 0"));
        }
        self.lock().options.connection_timeout_seconds = seconds;
        Ok(())
    }

    pub fn connection_timeout(&self) -> u32 {
        self.lock().options.connection_timeout_seconds
    }

    /// Enables the reaper and sets its sweep interval; takes effect the next time the pool is
    /// started (§4.1: "`setReaper(interval)` also sets `reaperEnabled = true`").
    pub fn set_reaper(&self, sweep_interval_seconds: u32) -> Result<()> {
        if sweep_interval_seconds == 0 {
            return Err(Error::assert("sweepIntervalSeconds must be > 0"));
        }
        let mut state = self.lock();
        state.options.sweep_interval_seconds = sweep_interval_seconds;
        state.options.reaper_enabled = true;
        Ok(())
    }

    pub fn url(&self) -> &ConnectionUrl {
        &self.shared.url
    }

    pub fn version() -> &'static str {
        VERSION
    }

    /// Opens exactly `initial` physical connections, in order. Idempotent: re-calling on an
    /// already-started pool is a no-op.
    ///
    /// If the first open fails the pool is left unstarted and the failure is fatal, reported
    /// through [`crate::abort::abort`] (§7: "`start` failure on the first initial connection
    /// is reported to the caller via the abort path"). If a later open fails, `start`
    /// succeeds with whatever connections were opened and logs at `debug`.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.stopped {
            return Ok(());
        }

        let initial = state.options.initial;
        for i in 0..initial {
            match driver::open(&self.shared.url) {
                Ok(delegate) => state.connections.push(Slot::new(delegate)),
                Err(err) => {
                    if i == 0 {
                        let message = format!("Failed to start connection pool -- {err}");
                        drop(state);
                        crate::abort::abort(&message);
                        return Err(err);
                    }
                    tracing::debug!(error = %err, opened = i, wanted = initial, "pool start: partial fill");
                    break;
                }
            }
        }

        state.stopped = false;
        state.sweeper_should_stop = false;
        let reaper_enabled = state.options.reaper_enabled;
        let opened = state.connections.len();
        drop(state);

        if reaper_enabled {
            reaper::spawn(self.clone());
        }

        tracing::info!(size = opened, "pool started");
        Ok(())
    }

    /// Marks the pool stopped, destroys every physical connection, and — if a sweeper is
    /// running — wakes and joins it outside the mutex.
    pub fn stop(&self) {
        {
            let mut state = self.lock();
            state.stopped = true;
            state.sweeper_should_stop = true;
            state.connections.clear();
        }
        self.shared.condvar.notify_all();

        if let Some(handle) = self.sweeper.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = handle.join();
        }
        tracing::info!("pool stopped");
    }

    /// Scans the available set in order, returning the first connection that currently
    /// responds to `ping`, opening a new one if the cap allows, or `None` (§4.1). Never
    /// blocks.
    pub fn get_connection(&self) -> Option<Connection> {
        let mut state = self.lock();
        if state.stopped {
            return None;
        }

        let mut found = None;
        for i in 0..state.connections.len() {
            if state.connections[i].delegate.ping() {
                found = Some(state.connections.remove(i));
                break;
            }
        }

        let slot = match found {
            Some(slot) => slot,
            None => {
                let total = state.connections.len() + state.active;
                if (total as u32) >= state.options.max_connections {
                    return None;
                }
                match driver::open(&self.shared.url) {
                    Ok(delegate) => Slot::new(delegate),
                    Err(err) => {
                        tracing::debug!(error = %err, "pool: failed to open new connection");
                        return None;
                    }
                }
            }
        };

        state.active += 1;
        let default_timeout_ms = 0;
        let mut slot = slot;
        slot.delegate.set_query_timeout(default_timeout_ms).ok();
        Some(Connection::new(self.clone(), slot))
    }

    /// Called when a [`Connection`] is returned to the pool. Pushes the slot back into the
    /// available set and decrements the active count.
    pub(crate) fn return_slot(&self, mut slot: Slot) {
        slot.last_accessed_at = now_seconds();
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        if !state.stopped {
            state.connections.push(slot);
        }
    }

    /// Runs the manual sweep described in §4.1's reaper algorithm: among the eviction
    /// candidates (available connections above the `initial` floor), remove every one that
    /// is either idle past `connectionTimeoutSeconds` or fails to `ping`.
    pub fn reap_connections(&self) {
        let mut state = self.lock();
        let initial = state.options.initial as usize;
        let timeout = state.options.connection_timeout_seconds as u64;
        let now = now_seconds();

        let candidates = state.connections.len().saturating_sub(initial);
        if candidates == 0 {
            return;
        }

        let mut removed = 0;
        let mut i = 0;
        while i < state.connections.len() && removed < candidates {
            let idle_too_long = now.saturating_sub(state.connections[i].last_accessed_at) > timeout;
            let dead = !state.connections[i].delegate.ping();
            if idle_too_long || dead {
                state.connections.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "reaper: evicted idle connections");
        }
    }

    /// Current physical connection count (available + checked out).
    pub fn size(&self) -> usize {
        let state = self.lock();
        state.connections.len() + state.active
    }

    /// Count of connections currently checked out.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    pub(crate) fn condvar_wait_deadline(&self, deadline_seconds: u32) -> bool {
        let state = self.lock();
        if state.sweeper_should_stop || state.stopped {
            return true;
        }
        let (guard, _timeout) = self
            .shared
            .condvar
            .wait_timeout(state, std::time::Duration::from_secs(deadline_seconds as u64))
            .unwrap_or_else(|p| p.into_inner());
        guard.sweeper_should_stop || guard.stopped
    }

    pub(crate) fn sweep_interval(&self) -> u32 {
        self.lock().options.sweep_interval_seconds
    }

    pub(crate) fn set_sweeper_handle(&self, handle: std::thread::JoinHandle<()>) {
        *self.sweeper.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }
}

pub(crate) fn now_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let d = PoolOptions::default();
        assert_eq!(d.initial, 5);
        assert_eq!(d.max_connections, 20);
        assert_eq!(d.connection_timeout_seconds, 30);
        assert_eq!(d.sweep_interval_seconds, 60);
        assert!(!d.reaper_enabled);
    }
}
