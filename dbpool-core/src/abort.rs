//! Process-wide diagnostics singletons.
//!
//! The source keeps two module-level globals: `AbortHandler`, a user-installable callback
//! invoked in place of the default "print to stderr and terminate" behavior, and `ZBDEBUG`,
//! a boolean that enables verbose diagnostic output (`ConnectionPool.c`). Per REDESIGN FLAGS
//! these become an explicit process-scoped registry instead of bare global variables.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type Handler = Box<dyn Fn(&str) + Send + Sync + 'static>;

static ABORT_HANDLER: Mutex<Option<Handler>> = Mutex::new(None);
static DEBUG: AtomicBool = AtomicBool::new(false);

/// Installs a process-wide abort handler, replacing the default behavior of logging the
/// message at `error` level and aborting the process.
///
/// Reassignable at any time, matching the source's plain global `ConnectionPool_setAbortHandler`
/// (`original_source/src/db/ConnectionPool.c`): the most recent call wins.
pub fn set_abort_handler<F>(handler: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let mut slot = ABORT_HANDLER.lock().unwrap_or_else(|p| p.into_inner());
    *slot = Some(Box::new(handler));
}

/// Invokes the installed abort handler, or the default behavior if none was installed.
///
/// Called for failures the source considers unrecoverable by design: most notably, `start()`
/// failing to open even the first connection (§7).
pub fn abort(message: &str) {
    let slot = ABORT_HANDLER.lock().unwrap_or_else(|p| p.into_inner());
    match slot.as_ref() {
        Some(handler) => handler(message),
        None => {
            tracing::error!("{message}");
            std::process::abort();
        }
    }
}

/// Enables or disables verbose diagnostic output (the source's `ZBDEBUG` flag).
///
/// In dbpool this just raises the effective `tracing` level for the crate's own debug-level
/// spans; it does not gate anything that would otherwise be silently skipped.
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}
