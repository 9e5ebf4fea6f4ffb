//! Purpose: Cooperative cancellation for composition and the write stage.
//! Exports: `CancelToken`.
//! Role: Threaded through URL fetches so an operator can abort a run early.
//! Invariants: Cancellation is sticky; a cancelled token never resets.
//! Invariants: Checking a token never blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::error::{Error, ErrorKind};

/// Cheap, cloneable cancellation flag. Clones observe the same state, so a
/// signal handler can hold one clone while composition holds another.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns a `Cancelled` error if the token has fired.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::new(ErrorKind::Cancelled).with_message("operation cancelled"))
        } else {
            Ok(())
        }
    }
}
