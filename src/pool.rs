mod record;
mod scheduler;
mod worker;

/// Error returned when a task cannot be submitted to a pool.
pub use scheduler::SubmitError;

use crate::{
    config::PoolOptions,
    pool::record::{Record, WorkUnit},
    sync::{Arc, Condvar, Mutex, MutexGuard, WorkerHandle},
    task::{Payload, Task, WorkFn},
};
use derive_more::Debug;
use slab::Slab;
use std::{collections::VecDeque, io};
use thiserror::Error;

/// Error produced while creating or resizing a [`Pool`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// A worker thread could not be spawned.
    #[error("failed to spawn a pool worker thread")]
    Spawn(#[from] io::Error),
}

/// Everything the pool mutex protects: the task allocator, the ready queue
/// and the lifecycle flags workers act on.
pub(crate) struct State {
    /// Task records, indexed by [`TaskKey`](crate::types::TaskKey). The
    /// slab's vacancy list doubles as the record recycler.
    pub(crate) tasks: Slab<Record>,
    /// Runnable work units, drained front-to-back by workers and helpers.
    pub(crate) queue: VecDeque<WorkUnit>,
    /// Number of workers that should currently be running; workers with a
    /// higher index exit after their current work unit.
    pub(crate) target_workers: u32,
    pub(crate) shutdown: bool,
}

/// Shared core of a pool, kept alive by the pool itself and by every
/// outstanding [`Task`] handle.
pub(crate) struct Inner {
    pub(crate) state: Mutex<State>,
    /// Signalled whenever work units enter the ready queue.
    pub(crate) work_available: Condvar,
    /// Broadcast whenever a task completes, so waiters re-evaluate.
    pub(crate) tasks_finished: Condvar,
}

impl Inner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("pool mutex poisoned")
    }
}

/// A thread pool executing tasks that expand into parallel work units and
/// may depend on previously submitted tasks.
///
/// Tasks are submitted through the erased-callback interface of
/// [`submit_dep`](Pool::submit_dep) (or the safe wrappers in
/// [`parallel`](crate::parallel)), form an arbitrary DAG through their parent
/// lists, and hand exactly one captured failure back to whoever waits on
/// them. Dropping the pool discards unstarted work units and joins all
/// workers.
#[must_use]
#[derive(Debug)]
pub struct Pool {
    #[debug(skip)]
    inner: Arc<Inner>,
    #[debug(skip)]
    workers: Mutex<Vec<WorkerHandle>>,
    thread_name: String,
    stack_size: Option<usize>,
}

impl Pool {
    /// Create a pool with default [`PoolOptions`]: one worker per available
    /// CPU core.
    pub fn new() -> Result<Self, PoolError> {
        Self::with_options(PoolOptions::default())
    }

    /// Create a pool from explicit options.
    pub fn with_options(options: PoolOptions) -> Result<Self, PoolError> {
        let size = options.resolved_size();
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                tasks: Slab::new(),
                queue: VecDeque::new(),
                target_workers: size,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            tasks_finished: Condvar::new(),
        });
        let pool = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(size as usize)),
            thread_name: options.thread_name_prefix().to_owned(),
            stack_size: options.resolved_stack_size(),
        };
        {
            let mut workers = pool.workers.lock().expect("pool worker registry poisoned");
            for index in 0..size {
                workers.push(worker::spawn(
                    pool.inner.clone(),
                    index,
                    &pool.thread_name,
                    pool.stack_size,
                )?);
            }
        }
        Ok(pool)
    }

    /// The process-wide pool, created with default options on first use.
    ///
    /// It is never torn down; its workers live until the process exits.
    #[cfg(not(feature = "loom"))]
    pub fn global() -> &'static Pool {
        use std::sync::OnceLock;

        static GLOBAL: OnceLock<Pool> = OnceLock::new();
        GLOBAL.get_or_init(|| Pool::new().expect("failed to spawn the global pool"))
    }

    /// Current number of worker threads.
    pub fn size(&self) -> u32 {
        self.inner.lock_state().target_workers
    }

    /// Resize the pool to `size` worker threads.
    ///
    /// Growing spawns additional workers. Shrinking signals the surplus
    /// workers to exit after their current work unit and waits for them to
    /// do so before returning; work units they leave behind stay in the
    /// ready queue.
    pub fn set_size(&self, size: u32) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().expect("pool worker registry poisoned");
        let current = workers.len() as u32;
        self.inner.lock_state().target_workers = size;

        if size > current {
            for index in current..size {
                workers.push(worker::spawn(
                    self.inner.clone(),
                    index,
                    &self.thread_name,
                    self.stack_size,
                )?);
            }
        } else if size < current {
            self.inner.work_available.notify_all();
            for handle in workers.drain(size as usize..) {
                if handle.join().is_err() {
                    tracing::warn!("pool worker panicked before exiting");
                }
            }
        }
        if size != current {
            tracing::debug!(from = current, to = size, "pool resized");
        }
        Ok(())
    }

    /// Worker identifier of the calling thread: a number in
    /// `1..=pool_size` on a pool worker thread, `0` on any other thread.
    ///
    /// Identifiers of separate pools overlap.
    pub fn thread_id() -> u32 {
        worker::current_thread_id()
    }

    /// Number of live task records.
    ///
    /// Completed tasks whose handle has not been released yet still count;
    /// the value returns to its previous level once every handle from a
    /// batch of submissions has been dropped and every task has completed.
    pub fn allocated_tasks(&self) -> usize {
        self.inner.lock_state().tasks.len()
    }

    /// Submit a task without parents. See [`submit_dep`](Pool::submit_dep).
    ///
    /// # Safety
    /// Same contract as [`submit_dep`](Pool::submit_dep).
    pub unsafe fn submit(
        &self,
        size: u32,
        func: Option<WorkFn>,
        payload: Payload,
    ) -> Result<Option<Task>, SubmitError> {
        // SAFETY: forwarded caller contract.
        unsafe { self.submit_dep(&[], size, func, payload) }
    }

    /// Submit a task of `size` work units that runs after every task in
    /// `parents` has completed.
    ///
    /// `func` is invoked `size` times with indices `0..size`; tasks of size
    /// zero behave like unit-sized tasks except that they always execute
    /// asynchronously. A `func` of `None` invokes nothing and is useful for
    /// barrier tasks that only encode dependencies.
    ///
    /// Returns `Ok(None)` when the task ran inline on the calling thread
    /// (size one, no pending parents, payload not [`Payload::Owned`]);
    /// otherwise a handle that can be waited on and named as a parent.
    /// Parents that already completed are ignored. Completed parents do not
    /// hold the task back, and a task's children always run once it
    /// completes, whether or not one of its work units failed.
    ///
    /// # Safety
    /// The caller must uphold the contract of the given [`Payload`] variant,
    /// and `func` must be sound to invoke from any thread with the payload
    /// pointer the variant produces.
    ///
    /// # Panics
    /// If a task in `parents` belongs to a different pool. On the inline
    /// fast path, a panic raised by `func` propagates directly to the
    /// caller.
    pub unsafe fn submit_dep(
        &self,
        parents: &[&Task],
        size: u32,
        func: Option<WorkFn>,
        payload: Payload,
    ) -> Result<Option<Task>, SubmitError> {
        // SAFETY: forwarded caller contract.
        unsafe { scheduler::submit(&self.inner, parents, size, func, payload) }
    }

    /// Submit a task without parents and block until it completes,
    /// re-raising a captured failure like [`Task::wait`].
    ///
    /// # Safety
    /// Same contract as [`submit_dep`](Pool::submit_dep).
    pub unsafe fn submit_and_wait(
        &self,
        size: u32,
        func: Option<WorkFn>,
        payload: Payload,
    ) -> Result<(), SubmitError> {
        // SAFETY: forwarded caller contract.
        if let Some(task) = unsafe { self.submit(size, func, payload) }? {
            task.join();
        }
        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let mut workers = self.workers.lock().expect("pool worker registry poisoned");
        {
            let mut state = self.inner.lock_state();
            state.shutdown = true;
            let discarded = state.queue.len();
            state.queue.clear();
            if discarded > 0 {
                tracing::warn!(discarded, "pool destroyed with unstarted work units");
            }
        }
        self.inner.work_available.notify_all();
        self.inner.tasks_finished.notify_all();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("pool worker panicked before exiting");
            }
        }
    }
}
