//! One-shot shutdown latch.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Gate that lets exactly one caller run teardown.
///
/// `close_guard` flips the latch atomically; only the caller holding the
/// guard runs teardown. Dropping the guard (normally or while unwinding)
/// marks teardown finished, which wakes every `closed` waiter.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    closed: AtomicBool,
    done: CancellationToken,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard for the single caller that closed the latch.
    pub fn close_guard(&self) -> Option<CloseGuard<'_>> {
        self.try_close().then(|| CloseGuard { latch: self })
    }

    /// `true` for the single caller that closed the latch.
    pub fn try_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark teardown as finished.
    pub fn finish(&self) {
        self.done.cancel();
    }

    /// Resolves once teardown has finished.
    pub async fn closed(&self) {
        self.done.cancelled().await
    }
}

/// Held for the duration of teardown.
#[must_use]
pub struct CloseGuard<'a> {
    latch: &'a ShutdownLatch,
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        self.latch.finish();
    }
}
