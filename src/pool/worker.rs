use crate::{
    pool::Inner,
    sync::{spawn_worker, thread_local, Arc, WorkerHandle},
};
use core::cell::Cell;
use std::io;

thread_local! {
    /// Worker identifier of the current thread: `1..=pool_size` on a pool
    /// worker, `0` everywhere else (including threads that are merely helping
    /// while they wait).
    static WORKER_ID: Cell<u32> = Cell::new(0);
}

pub(crate) fn current_thread_id() -> u32 {
    WORKER_ID.with(Cell::get)
}

/// Spawn the worker with the given zero-based index.
pub(crate) fn spawn(
    inner: Arc<Inner>,
    index: u32,
    name_prefix: &str,
    stack_size: Option<usize>,
) -> io::Result<WorkerHandle> {
    spawn_worker(format!("{name_prefix}-{index}"), stack_size, move || {
        worker_main(&inner, index)
    })
}

/// The worker loop: pop one ready work unit at a time and execute it with the
/// pool unlocked. The thread parks when the queue is empty and exits on pool
/// shutdown or when a resize lowered the worker count below its index.
fn worker_main(inner: &Inner, index: u32) {
    WORKER_ID.with(|id| id.set(index + 1));
    tracing::trace!(worker = index + 1, "pool worker started");

    let mut state = inner.lock_state();
    loop {
        if state.shutdown || index >= state.target_workers {
            break;
        }
        if let Some(unit) = state.queue.pop_front() {
            state = inner.execute_unit(state, unit);
        } else {
            state = inner
                .work_available
                .wait(state)
                .expect("pool mutex poisoned");
        }
    }
    drop(state);

    tracing::trace!(worker = index + 1, "pool worker exiting");
}
