use crate::{
    pool::Pool,
    task::{Payload, PayloadDeleter, Task, WorkFn},
};
use core::ops::Range;

/// An index range decomposed into equally-sized blocks.
///
/// One task work unit is scheduled per block, so the block size controls the
/// scheduling granularity of the `parallel_*` loops: larger blocks amortize
/// queue traffic, smaller blocks balance load better.
#[must_use]
#[derive(Debug, Clone)]
pub struct BlockedRange {
    begin: usize,
    end: usize,
    block_size: usize,
}

impl BlockedRange {
    /// Range `begin..end` with a block size of one.
    pub fn new(begin: usize, end: usize) -> Self {
        Self::with_block_size(begin, end, 1)
    }

    /// Range `begin..end` split into blocks of `block_size` indices; the
    /// last block may be shorter.
    ///
    /// # Panics
    /// If `end < begin` or `block_size` is zero.
    pub fn with_block_size(begin: usize, end: usize, block_size: usize) -> Self {
        assert!(end >= begin, "BlockedRange: end precedes begin");
        assert!(block_size > 0, "BlockedRange: zero block size");
        Self {
            begin,
            end,
            block_size,
        }
    }

    /// Number of blocks, i.e. work units, the range decomposes into.
    pub fn blocks(&self) -> u32 {
        (self.end - self.begin)
            .div_ceil(self.block_size)
            .try_into()
            .expect("BlockedRange: block count exceeds u32")
    }

    /// Configured block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn block(&self, index: u32) -> Range<usize> {
        let start = self.begin + self.block_size * index as usize;
        start..(start + self.block_size).min(self.end)
    }
}

fn resolve(pool: Option<&Pool>) -> &Pool {
    #[cfg(not(feature = "loom"))]
    return pool.unwrap_or_else(|| Pool::global());
    #[cfg(feature = "loom")]
    return pool.expect("an explicit pool is required with the loom feature");
}

/// Invoke `func` once per block of `range`, in parallel, and block until all
/// invocations have finished.
///
/// `None` selects the [global pool](Pool::global). The closure may borrow
/// from the caller's stack: the payload handed to the pool is a borrow that
/// this call outlives. A panic inside any block is re-raised here.
pub fn parallel_for<F>(range: &BlockedRange, func: F, pool: Option<&Pool>)
where
    F: Fn(Range<usize>) + Sync,
{
    struct ForPayload<F> {
        func: F,
        range: BlockedRange,
    }

    unsafe fn call<F: Fn(Range<usize>) + Sync>(index: u32, payload: *mut ()) {
        // SAFETY: `payload` points at the `ForPayload` borrowed below, which
        // outlives the blocking submit call; blocks never alias.
        let ctx = unsafe { &*payload.cast_const().cast::<ForPayload<F>>() };
        (ctx.func)(ctx.range.block(index));
    }

    let ctx = ForPayload {
        func,
        range: range.clone(),
    };
    let payload = Payload::Borrowed((&raw const ctx).cast_mut().cast());
    // SAFETY: the borrowed payload stays valid until the wait returns, and
    // `call::<F>` only reads it through a shared reference.
    unsafe { resolve(pool).submit_and_wait(range.blocks(), Some(call::<F> as WorkFn), payload) }
        .expect("parallel_for: [1]");
}

/// Schedule `func` to run once per block of `range` after every task in
/// `parents` has completed, without waiting.
///
/// The closure is moved onto the heap and dropped after the task completes.
/// A panic inside a block is captured and re-raised by
/// [`Task::wait`]/[`Task::join`] on the returned handle.
pub fn parallel_for_async<F>(
    range: &BlockedRange,
    func: F,
    parents: &[&Task],
    pool: Option<&Pool>,
) -> Task
where
    F: Fn(Range<usize>) + Send + Sync + 'static,
{
    struct ForPayload<F> {
        func: F,
        range: BlockedRange,
    }

    unsafe fn call<F: Fn(Range<usize>) + Send + Sync>(index: u32, payload: *mut ()) {
        // SAFETY: `payload` is the boxed `ForPayload`, alive until the
        // deleter runs after completion.
        let ctx = unsafe { &*payload.cast_const().cast::<ForPayload<F>>() };
        (ctx.func)(ctx.range.block(index));
    }

    unsafe fn delete<F>(payload: *mut ()) {
        // SAFETY: single invocation, after the last use of the payload.
        drop(unsafe { Box::from_raw(payload.cast::<ForPayload<F>>()) });
    }

    let ptr = Box::into_raw(Box::new(ForPayload {
        func,
        range: range.clone(),
    }));
    let payload = Payload::Owned {
        ptr: ptr.cast(),
        deleter: delete::<F> as PayloadDeleter,
    };
    // SAFETY: the payload is heap-owned and reclaimed exactly once by the
    // deleter; `call::<F>` reads it through a shared reference.
    let task = unsafe {
        resolve(pool).submit_dep(parents, range.blocks(), Some(call::<F> as WorkFn), payload)
    }
    .expect("parallel_for_async: [1]");
    task.expect("parallel_for_async: [2]")
}

/// Schedule a closure to run once after every task in `parents` has
/// completed, without waiting.
///
/// The task is always executed asynchronously, even when it could run
/// immediately.
pub fn parallel_do_async<F>(func: F, parents: &[&Task], pool: Option<&Pool>) -> Task
where
    F: FnOnce() + Send + 'static,
{
    struct DoPayload<F> {
        func: Option<F>,
    }

    unsafe fn call<F: FnOnce() + Send>(_index: u32, payload: *mut ()) {
        // SAFETY: the task has a single work unit, so this is the only
        // access to the boxed payload before the deleter.
        let ctx = unsafe { &mut *payload.cast::<DoPayload<F>>() };
        if let Some(func) = ctx.func.take() {
            func();
        }
    }

    unsafe fn delete<F>(payload: *mut ()) {
        // SAFETY: single invocation, after the last use of the payload.
        drop(unsafe { Box::from_raw(payload.cast::<DoPayload<F>>()) });
    }

    let ptr = Box::into_raw(Box::new(DoPayload { func: Some(func) }));
    let payload = Payload::Owned {
        ptr: ptr.cast(),
        deleter: delete::<F> as PayloadDeleter,
    };
    // SAFETY: the payload is heap-owned and reclaimed exactly once by the
    // deleter.
    let task = unsafe { resolve(pool).submit_dep(parents, 0, Some(call::<F> as WorkFn), payload) }
        .expect("parallel_do_async: [1]");
    task.expect("parallel_do_async: [2]")
}
