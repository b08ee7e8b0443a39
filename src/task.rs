use crate::{
    pool::Inner,
    sync::Arc,
    types::TaskKey,
};
use derive_more::Debug;

/// Work-unit callback of a task.
///
/// Invoked once per work unit with the unit's index in `0..size` and the
/// task's payload pointer (null when the task was submitted with
/// [`Payload::None`]).
///
/// The callback runs on an arbitrary pool worker (or on a thread that is
/// helping while it waits). A panic raised inside the callback is captured
/// into the task's failure slot and re-raised by [`Task::wait`]; it does not
/// stop the task's remaining work units.
pub type WorkFn = unsafe fn(index: u32, payload: *mut ());

/// Cleanup callback for a [`Payload::Owned`] payload, invoked exactly once
/// after the task completes and before any waiter is unblocked.
///
/// The deleter runs while the pool's internal lock is held and therefore must
/// not call back into the pool.
pub type PayloadDeleter = unsafe fn(payload: *mut ());

/// Payload handed to a task at submission.
///
/// This is the erased interface higher-level wrappers build on: captured
/// state goes behind an opaque pointer, and the variant selects who owns it
/// and for how long.
#[derive(Debug)]
pub enum Payload {
    /// No payload. The callback receives a null pointer.
    None,
    /// The caller retains ownership and guarantees the pointee stays valid
    /// (and safe to access from worker threads) until the task completes.
    Borrowed(#[debug(skip)] *mut ()),
    /// The pool takes ownership and invokes `deleter(ptr)` exactly once after
    /// the task completes.
    Owned {
        /// Pointer forwarded to every callback invocation.
        #[debug(skip)]
        ptr: *mut (),
        /// Invoked once after completion to reclaim `ptr`.
        #[debug(skip)]
        deleter: PayloadDeleter,
    },
    /// The pool copies `len` bytes out of `ptr` at submission and frees the
    /// copy after the task completes. The callback receives the copy, so the
    /// caller may free or reuse the original immediately after submitting.
    ///
    /// The copy is aligned to 16 bytes. A `len` of zero stores no payload and
    /// the callback receives a null pointer.
    Copied {
        /// Source region; only read during the submit call itself.
        #[debug(skip)]
        ptr: *const (),
        /// Number of bytes to copy.
        len: usize,
    },
}

/// A shared, counted reference to a submitted task.
///
/// The handle is independent of the task's execution: dropping it neither
/// cancels nor blocks the task, it only releases the caller's reference so
/// the pool can eventually recycle the record. Holding it allows the task to
/// be named as a parent of later submissions and to be waited on.
#[must_use]
#[derive(Debug)]
pub struct Task {
    pub(crate) key: TaskKey,
    #[debug(skip)]
    pub(crate) inner: Arc<Inner>,
}

impl Task {
    pub(crate) fn new(inner: Arc<Inner>, key: TaskKey) -> Self {
        Self { key, inner }
    }

    /// Block until every work unit of this task has finished.
    ///
    /// While blocked, the calling thread participates as an honorary worker
    /// and executes ready work units of the pool, so waiting from inside a
    /// work-unit callback cannot deadlock the pool.
    ///
    /// If a work unit panicked, the captured panic is re-raised here. Waiting
    /// again afterwards re-raises a panic carrying the same message.
    pub fn wait(&self) {
        self.inner.wait(self.key);
    }

    /// Wait for completion, then release the handle.
    ///
    /// The release happens whether or not the wait re-raises a captured
    /// panic: the handle is consumed and dropped even while unwinding.
    pub fn join(self) {
        self.wait();
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.inner.release(self.key);
    }
}
