//! Registry of currently-registered reader threads.
//!
//! The original library threads an intrusive list node through each
//! reader's TLS block. A `Vec<Arc<ReaderSlot>>` behind a mutex gets the same
//! externally-visible behavior (membership scanned by writers, mutated only
//! under the GP mutex) without hand-rolled intrusive linked-list unsafety.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::gp::reader::ReaderSlot;

#[derive(Default)]
pub(crate) struct Registry {
    readers: Mutex<Vec<Arc<ReaderSlot>>>,
}

impl Registry {
    pub(crate) fn add(&self, reader: Arc<ReaderSlot>) {
        self.readers.lock().push(reader);
    }

    pub(crate) fn remove(&self, reader: &Arc<ReaderSlot>) {
        let mut readers = self.readers.lock();
        if let Some(pos) = readers.iter().position(|r| Arc::ptr_eq(r, reader)) {
            readers.swap_remove(pos);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.readers.lock().is_empty()
    }

    /// Snapshot of currently-registered readers, for use outside the GP
    /// mutex (e.g. the signal flavor's broadcast, which may sleep).
    pub(crate) fn snapshot(&self) -> Vec<Arc<ReaderSlot>> {
        self.readers.lock().clone()
    }

    /// Take the full registry out for a grace-period scan. Must be called
    /// with the GP mutex held; the caller splices quiescent readers back
    /// in with [`Registry::restore`].
    pub(crate) fn take_all(&self) -> Vec<Arc<ReaderSlot>> {
        std::mem::take(&mut self.readers.lock())
    }

    /// Splice a (possibly reordered) reader list back into the registry
    /// after a grace-period scan.
    pub(crate) fn restore(&self, mut readers: Vec<Arc<ReaderSlot>>) {
        self.readers.lock().append(&mut readers);
    }
}
