use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// CancellationToken is shared between the signal handler (which cancels)
/// and the engine (which checks it after every blocking call). Clones refer
/// to the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
