//! Purpose: Own every closable handle opened while composing a stream.
//! Exports: `ResourceTracker`, `TrackedReader`, `ReleaseHandle`.
//! Role: Single owner of open files and response bodies; prevents leaks and
//! double-close on every exit path.
//! Invariants: Each tracked resource is released at most once.
//! Invariants: Release is idempotent and fires on handle drop as a backstop.
//! Invariants: A released reader reports EOF, never a dangling handle.

use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard};

type Slot = Arc<Mutex<Option<Box<dyn Read + Send>>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Box<dyn Read + Send>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}

/// Accumulates opened resources during composition. Converted into a
/// [`ReleaseHandle`] once composition finishes (or fails partway).
#[derive(Default)]
pub struct ResourceTracker {
    slots: Vec<(String, Slot)>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Takes ownership of an opened resource and hands back the reader view
    /// that goes into the composed stream. The tracker keeps the only close
    /// capability.
    pub fn track(&mut self, label: impl Into<String>, reader: Box<dyn Read + Send>) -> TrackedReader {
        let slot: Slot = Arc::new(Mutex::new(Some(reader)));
        self.slots.push((label.into(), Arc::clone(&slot)));
        TrackedReader { slot }
    }

    /// Seals the tracker into the combined release operation.
    pub fn into_release_handle(self) -> ReleaseHandle {
        ReleaseHandle { slots: self.slots }
    }
}

/// Reader view of a tracked resource. Reads return EOF after release.
pub struct TrackedReader {
    slot: Slot,
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = lock_slot(&self.slot);
        match guard.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

/// Combined release operation for every resource opened during one
/// composition. Releasing twice is a no-op; dropping an unreleased handle
/// releases everything.
pub struct ReleaseHandle {
    slots: Vec<(String, Slot)>,
}

impl ReleaseHandle {
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }

    /// Closes every still-open resource exactly once, in tracking order.
    /// Individual close outcomes are logged, never fatal.
    pub fn release(&self) {
        for (label, slot) in &self.slots {
            let taken = lock_slot(slot).take();
            if taken.is_some() {
                tracing::debug!(resource = %label, "released input source");
            }
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.release();
    }
}
