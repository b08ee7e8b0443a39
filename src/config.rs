use crate::sync::available_parallelism;

/// Configuration for a [`Pool`](crate::pool::Pool).
///
/// The default options ask for one worker per available CPU core and name
/// worker threads `nanopool-worker-{index}`.
#[must_use]
#[derive(Debug, Clone)]
pub struct PoolOptions {
    size: Option<u32>,
    thread_name: String,
    stack_size: Option<usize>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: None,
            thread_name: "nanopool-worker".to_owned(),
            stack_size: None,
        }
    }
}

impl PoolOptions {
    /// Equivalent to [`PoolOptions::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    ///
    /// A pool of size zero is legal: it never executes anything on its own,
    /// and all progress is made by waiting threads that pick up queued work
    /// units while they block.
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the prefix used for worker thread names.
    ///
    /// Workers are named `{prefix}-{index}` with zero-based indices.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Set the stack size, in bytes, of worker threads.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub(crate) fn resolved_size(&self) -> u32 {
        self.size.unwrap_or_else(available_parallelism)
    }

    pub(crate) fn thread_name_prefix(&self) -> &str {
        &self.thread_name
    }

    pub(crate) fn resolved_stack_size(&self) -> Option<usize> {
        self.stack_size
    }
}
