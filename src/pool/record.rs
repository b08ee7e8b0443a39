use crate::{
    pool::scheduler::SubmitError,
    sync::{AtomicU32, Ordering},
    task::{Payload, PayloadDeleter, WorkFn},
    types::{PanicPayload, TaskKey},
    utils::panic_message,
};
use core::ptr::{self, NonNull};
use derive_more::Debug;
use std::alloc::{alloc, dealloc, Layout};

/// Alignment of internal payload copies. Generous enough for any ordinary
/// `#[repr(C)]` payload struct a callback may reinterpret the bytes as.
const PAYLOAD_ALIGN: usize = 16;

/// One enqueued invocation of a task's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkUnit {
    pub(crate) task: TaskKey,
    pub(crate) index: u32,
}

/// Heap buffer holding an internal payload copy.
struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuf {
    fn copy_from(src: *const (), len: usize) -> Result<Self, SubmitError> {
        let layout = Layout::from_size_align(len, PAYLOAD_ALIGN)
            .map_err(|_| SubmitError::PayloadAlloc { len })?;
        // SAFETY: `layout` has nonzero size, checked by the caller.
        let Some(ptr) = NonNull::new(unsafe { alloc(layout) }) else {
            return Err(SubmitError::PayloadAlloc { len });
        };
        // SAFETY: `src` is readable for `len` bytes per the submit contract,
        // and the fresh allocation cannot overlap it.
        unsafe { ptr::copy_nonoverlapping(src.cast::<u8>(), ptr.as_ptr(), len) };
        Ok(Self { ptr, layout })
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated with `layout` in `copy_from`.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Resolved payload ownership of a live task record.
pub(crate) enum PayloadSlot {
    None,
    Borrowed(*mut ()),
    Owned { ptr: *mut (), deleter: PayloadDeleter },
    Copied(AlignedBuf),
}

// SAFETY: payload pointers cross threads by construction (callbacks run on
// workers). For `Borrowed`/`Owned` the submit contract makes the caller
// guarantee the pointee is safe to access from other threads; `Copied`
// buffers are exclusively owned by the record.
unsafe impl Send for PayloadSlot {}

impl PayloadSlot {
    /// Resolve a submitted [`Payload`] into its stored form, taking the
    /// internal copy for [`Payload::Copied`].
    pub(crate) fn capture(payload: Payload) -> Result<Self, SubmitError> {
        Ok(match payload {
            Payload::None => Self::None,
            Payload::Borrowed(ptr) => Self::Borrowed(ptr),
            Payload::Owned { ptr, deleter } => Self::Owned { ptr, deleter },
            Payload::Copied { len: 0, .. } => Self::None,
            Payload::Copied { ptr, len } => Self::Copied(AlignedBuf::copy_from(ptr, len)?),
        })
    }

    /// Pointer handed to callback invocations.
    pub(crate) fn as_ptr(&self) -> *mut () {
        match self {
            Self::None => ptr::null_mut(),
            Self::Borrowed(ptr) => *ptr,
            Self::Owned { ptr, .. } => *ptr,
            Self::Copied(buf) => buf.ptr.as_ptr().cast(),
        }
    }

    /// Run the completion side of the ownership contract: invoke the deleter
    /// of an owned payload, free an internal copy. Idempotent; the slot is
    /// empty afterwards.
    pub(crate) fn release(&mut self) {
        match core::mem::replace(self, Self::None) {
            Self::None | Self::Borrowed(_) => {}
            Self::Owned { ptr, deleter } => {
                // SAFETY: `deleter` was supplied together with `ptr` at submit
                // time and this is its single invocation.
                unsafe { deleter(ptr) };
            }
            Self::Copied(buf) => drop(buf),
        }
    }
}

/// What a waiter should re-raise for a failed task.
pub(crate) enum Rethrow {
    /// First observation: the original panic payload.
    Original(PanicPayload),
    /// Later observations: the retained message of the original panic.
    Message(String),
}

/// First-writer-wins slot for the one failure a task carries back.
#[derive(Default)]
pub(crate) struct FailureSlot(Option<Failure>);

enum Failure {
    Pending(PanicPayload),
    Raised(String),
}

impl FailureSlot {
    /// Store `panic` if the slot is empty; otherwise drop it. Only the
    /// first failure of a task is retained.
    pub(crate) fn capture(&mut self, panic: PanicPayload) {
        if self.0.is_none() {
            self.0 = Some(Failure::Pending(panic));
        } else {
            tracing::warn!(
                panic = %panic_message(&panic),
                "dropping subsequent work-unit failure"
            );
        }
    }

    /// Take what the current waiter must re-raise, if anything.
    ///
    /// The first caller gets the original panic payload; the slot keeps the
    /// panic's message so that later waiters still observe a failure.
    pub(crate) fn take_raised(&mut self) -> Option<Rethrow> {
        match self.0.take()? {
            Failure::Pending(payload) => {
                let message = panic_message(&payload);
                self.0 = Some(Failure::Raised(message));
                Some(Rethrow::Original(payload))
            }
            Failure::Raised(message) => {
                self.0 = Some(Failure::Raised(message.clone()));
                Some(Rethrow::Message(message))
            }
        }
    }
}

/// A task record owned by the pool.
///
/// Counter protocol:
/// - `remaining_work` starts at `max(size, 1)` and is decremented once per
///   finished work unit; reaching zero completes the task.
/// - `remaining_parents` counts declared parents that have not completed yet;
///   reaching zero arms the task (its work units enter the ready queue).
/// - `refcount` counts the external handle (one) plus one per child that has
///   not yet observed this task completing. The record is recycled once the
///   refcount is zero *and* the task has completed.
///
/// All transitions happen under the pool mutex; the counters are atomics so
/// the decrement-to-zero checks stay explicit single operations.
#[derive(Debug)]
pub(crate) struct Record {
    pub(crate) size: u32,
    #[debug(skip)]
    pub(crate) func: Option<WorkFn>,
    #[debug(skip)]
    pub(crate) payload: PayloadSlot,
    pub(crate) remaining_work: AtomicU32,
    pub(crate) remaining_parents: AtomicU32,
    pub(crate) refcount: AtomicU32,
    pub(crate) children: Vec<TaskKey>,
    #[debug(skip)]
    pub(crate) failure: FailureSlot,
}

impl Record {
    pub(crate) fn new(size: u32, func: Option<WorkFn>, payload: PayloadSlot) -> Self {
        Self {
            size,
            func,
            payload,
            remaining_work: AtomicU32::new(size.max(1)),
            remaining_parents: AtomicU32::new(0),
            refcount: AtomicU32::new(1),
            children: Vec::new(),
            failure: FailureSlot::default(),
        }
    }

    /// Number of ready-queue entries this task expands into.
    pub(crate) fn units(&self) -> u32 {
        self.size.max(1)
    }

    pub(crate) fn completed(&self) -> bool {
        self.remaining_work.load(Ordering::Acquire) == 0
    }
}
