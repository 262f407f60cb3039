//! The sweeper thread (§4.1 "Sweeper thread contract").
//!
//! One dedicated thread per pool, spawned on `start`, joined on `stop`. It holds the pool
//! mutex while sleeping on the condition variable with an absolute deadline, wakes on either
//! the deadline or `stop`'s broadcast, and runs exactly one reap cycle per wake unless it was
//! woken to shut down. No other call (`getConnection`/`returnConnection`) ever wakes it —
//! the reaper is strictly timer-driven.

use super::Pool;

pub(super) fn spawn(pool: Pool) {
    let worker = pool.clone();
    let handle = std::thread::Builder::new()
        .name("dbpool-reaper".into())
        .spawn(move || run(worker))
        .expect("failed to spawn reaper thread");
    pool.set_sweeper_handle(handle);
}

fn run(pool: Pool) {
    loop {
        let interval = pool.sweep_interval();
        let should_stop = pool.condvar_wait_deadline(interval);
        if should_stop {
            return;
        }
        pool.reap_connections();
    }
}
