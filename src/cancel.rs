//! Cooperative cancellation shared by the resolver and installer drivers.
//!
//! One handle/token pair governs a whole run. Drivers poll the token at each
//! wake-up (the driver loops sleep at most [`crate::resolver::POLL_INTERVAL`]
//! between checks), so cancellation takes effect within about two poll
//! intervals.

use tokio::sync::watch;

/// Create a linked handle/token pair.
#[must_use]
pub fn token() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// The signalling side; typically wired to Ctrl-C.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// The observing side, cloned into every driver.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
