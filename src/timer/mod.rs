use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::sleep;

// -----------------------------------------------------------------------------
// ----- RevealTimer -----------------------------------------------------------

/// One-shot deferred action. Cancelled explicitly or when dropped, so a round
/// that goes away takes its pending reveal with it.
#[derive(Debug)]
pub struct RevealTimer {
    handle: AbortHandle,
}

impl RevealTimer {
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(after: Duration, on_elapsed: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            sleep(after).await;
            on_elapsed();
        });

        Self {
            handle: task.abort_handle(),
        }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RevealTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
