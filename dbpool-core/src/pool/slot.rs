use std::sync::atomic::{AtomicU64, Ordering};

use crate::driver::ConnectionDriver;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One physical backend connection, plus the bookkeeping the reaper needs (§3's "ordered
/// only to preserve reap-order stability"). Lives either inside the pool's available-set vec
/// or inside the [`crate::connection::Connection`] that currently has it checked out.
pub(crate) struct Slot {
    pub(crate) id: u64,
    pub(crate) delegate: Box<dyn ConnectionDriver>,
    pub(crate) last_accessed_at: u64,
}

impl Slot {
    pub(super) fn new(delegate: Box<dyn ConnectionDriver>) -> Self {
        Slot {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            delegate,
            last_accessed_at: 0,
        }
    }
}
