use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter identifying the one live session of a submission dialog.
///
/// Only ever incremented. A session holds the value it was opened with and is
/// live while that value still equals [`SessionCounter::current`].
#[derive(Debug, Default)]
pub(crate) struct SessionCounter {
    current: AtomicU64,
}

impl SessionCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Invalidates every outstanding token and returns the new one.
    pub(crate) fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }
}
