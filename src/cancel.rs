//! Cooperative cancellation for in-flight attempts.
//!
//! Each attempt chain owns a [`CancellationToken`]. Starting a newer attempt for
//! the same consumer cancels the previous token, and any result that arrives
//! for a cancelled token is dropped before it reaches state.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken as AbortSignal;

type Listener = Box<dyn FnOnce() + Send>;

/// A one-shot cancellation flag with cleanup listeners.
///
/// Cloning yields another handle to the same token.
#[derive(Clone, Default)]
pub struct CancellationToken {
    signal: AbortSignal,
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and runs registered listeners once.
    ///
    /// Calling this again is a no-op.
    pub fn cancel(&self) {
        if self.signal.is_cancelled() {
            return;
        }
        self.signal.cancel();

        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            listener();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Registers a cleanup action to run on cancellation.
    ///
    /// If the token is already cancelled the action runs immediately.
    pub fn on_cancel(&self, listener: impl FnOnce() + Send + 'static) {
        {
            let mut listeners = self.listeners.lock();
            if !self.signal.is_cancelled() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        self.signal.cancelled().await;
    }

    /// The abort signal offered to the transport.
    ///
    /// Transports may observe it to stop work early; the core does not rely on
    /// them doing so.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
