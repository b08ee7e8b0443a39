use crate::{
    pool::{
        record::{PayloadSlot, Record, Rethrow, WorkUnit},
        Inner, State,
    },
    sync::{Arc, MutexGuard, Ordering},
    task::{Payload, Task, WorkFn},
    types::TaskKey,
};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Error returned when a task cannot be submitted.
///
/// Execution failures are not submission errors: a panic inside a work-unit
/// callback is captured into the task and re-raised by
/// [`Task::wait`](crate::task::Task::wait).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubmitError {
    /// The internal copy of a [`Payload::Copied`](crate::task::Payload::Copied)
    /// payload could not be allocated.
    #[error("failed to allocate a {len}-byte payload copy")]
    PayloadAlloc {
        /// Requested copy size in bytes.
        len: usize,
    },
}

/// Submit a task to the pool, linking it below `parents`.
///
/// # Safety
/// Same contract as [`Pool::submit_dep`](crate::pool::Pool::submit_dep).
pub(crate) unsafe fn submit(
    inner: &Arc<Inner>,
    parents: &[&Task],
    size: u32,
    func: Option<WorkFn>,
    payload: Payload,
) -> Result<Option<Task>, SubmitError> {
    for parent in parents {
        assert!(
            Arc::ptr_eq(&parent.inner, inner),
            "parent task belongs to a different pool"
        );
    }

    // Tiny tasks bypass the queue entirely and run on the submitter's thread.
    // `size == 0` enforces asynchronous execution and owned payloads must
    // outlive the submit call, so both disable the fast path.
    let inline_ok = size == 1 && !matches!(payload, Payload::Owned { .. });
    if inline_ok && parents.is_empty() {
        // SAFETY: forwarded caller contract.
        unsafe { run_inline(func, &payload) };
        return Ok(None);
    }

    let mut state = inner.lock_state();

    if inline_ok && parents.iter().all(|p| state.tasks[p.key].completed()) {
        drop(state);
        // SAFETY: forwarded caller contract.
        unsafe { run_inline(func, &payload) };
        return Ok(None);
    }

    let slot = PayloadSlot::capture(payload)?;
    let key = state.tasks.insert(Record::new(size, func, slot));

    // Link below every parent that is still incomplete. Checking and linking
    // under the same lock acquisition closes the race where a parent
    // completes between the check and the link. Each link makes the child
    // keep its parent's record alive until the parent fires it.
    let mut remaining_parents = 0;
    for parent in parents {
        let record = &mut state.tasks[parent.key];
        if !record.completed() {
            record.children.push(key);
            record.refcount.fetch_add(1, Ordering::Relaxed);
            remaining_parents += 1;
        }
    }
    state.tasks[key]
        .remaining_parents
        .store(remaining_parents, Ordering::Relaxed);

    if remaining_parents == 0 {
        inner.make_ready(&mut state, key);
    }

    Ok(Some(Task::new(inner.clone(), key)))
}

/// Inline fast path: execute the callback once on the current thread.
unsafe fn run_inline(func: Option<WorkFn>, payload: &Payload) {
    let Some(func) = func else { return };
    let ptr = match payload {
        Payload::None => core::ptr::null_mut(),
        Payload::Borrowed(ptr) => *ptr,
        // No copy is taken: the callback finishes before submit returns,
        // while the caller's buffer is still valid.
        Payload::Copied { ptr, .. } => ptr.cast_mut(),
        Payload::Owned { .. } => unreachable!("submit: inline fast path with owned payload"),
    };
    // SAFETY: forwarded caller contract.
    unsafe { func(0, ptr) };
}

impl Inner {
    /// Enqueue all work units of an armed task and wake workers.
    pub(crate) fn make_ready(&self, state: &mut State, key: TaskKey) {
        let units = state.tasks[key].units();
        state.queue.reserve(units as usize);
        for index in 0..units {
            state.queue.push_back(WorkUnit { task: key, index });
        }
        if units == 1 {
            self.work_available.notify_one();
        } else {
            self.work_available.notify_all();
        }
    }

    /// Pop-side of the worker discipline: run one work unit with the pool
    /// unlocked, then re-lock and post the completion.
    ///
    /// Returns the re-acquired guard so callers keep their loop shape. The
    /// record cannot be reclaimed while the unit is in flight because its
    /// `remaining_work` has not been decremented yet.
    pub(crate) fn execute_unit<'a>(
        &'a self,
        state: MutexGuard<'a, State>,
        unit: WorkUnit,
    ) -> MutexGuard<'a, State> {
        let record = &state.tasks[unit.task];
        let func = record.func;
        let payload = record.payload.as_ptr();
        drop(state);

        let outcome = func.map(|func| {
            // SAFETY: pointer validity was promised to `submit`.
            catch_unwind(AssertUnwindSafe(|| unsafe { func(unit.index, payload) }))
        });

        let mut state = self.lock_state();
        if let Some(Err(panic)) = outcome {
            state.tasks[unit.task].failure.capture(panic);
        }
        self.finish_unit(&mut state, unit.task);
        state
    }

    fn finish_unit(&self, state: &mut State, key: TaskKey) {
        let last = state.tasks[key].remaining_work.fetch_sub(1, Ordering::AcqRel) == 1;
        if last {
            self.complete(state, key);
        }
    }

    /// Completion handling; runs exactly once per task, under the mutex.
    fn complete(&self, state: &mut State, key: TaskKey) {
        // Payload cleanup must precede waking any waiter.
        state.tasks[key].payload.release();

        // Fire children: each loses one pending parent, and the reference it
        // held on this record is dropped.
        let children = core::mem::take(&mut state.tasks[key].children);
        for &child in &children {
            let armed = state.tasks[child]
                .remaining_parents
                .fetch_sub(1, Ordering::AcqRel)
                == 1;
            if armed {
                self.make_ready(state, child);
            }
        }
        state.tasks[key]
            .refcount
            .fetch_sub(children.len() as u32, Ordering::Relaxed);

        self.tasks_finished.notify_all();
        Self::recycle_if_unreferenced(state, key);
    }

    /// Block until the task completes, executing ready work units meanwhile.
    pub(crate) fn wait(&self, key: TaskKey) {
        let mut state = self.lock_state();
        while !state.tasks[key].completed() {
            if let Some(unit) = state.queue.pop_front() {
                state = self.execute_unit(state, unit);
            } else {
                state = self
                    .tasks_finished
                    .wait(state)
                    .expect("pool mutex poisoned");
            }
        }

        let rethrow = state.tasks[key].failure.take_raised();
        drop(state);
        match rethrow {
            None => {}
            Some(Rethrow::Original(payload)) => resume_unwind(payload),
            Some(Rethrow::Message(message)) => panic!("{message}"),
        }
    }

    /// Drop one external reference; the record is recycled once it is both
    /// unreferenced and completed.
    pub(crate) fn release(&self, key: TaskKey) {
        let mut state = self.lock_state();
        state.tasks[key].refcount.fetch_sub(1, Ordering::Relaxed);
        Self::recycle_if_unreferenced(&mut state, key);
    }

    fn recycle_if_unreferenced(state: &mut State, key: TaskKey) {
        let record = &state.tasks[key];
        // A handle may be dropped while the task still runs; the record must
        // survive until the last work unit has finished.
        if record.refcount.load(Ordering::Relaxed) == 0 && record.completed() {
            state.tasks.remove(key);
        }
    }
}
