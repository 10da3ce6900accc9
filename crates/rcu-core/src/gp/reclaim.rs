//! Deferred reclamation: free a pointer after, not during, the grace period
//! that made it safe to free.
//!
//! A background reaper thread periodically calls [`synchronize`] and then
//! runs every callback enqueued before that call started. Callbacks queued
//! during the wait are left for the *next* sweep rather than the one in
//! progress, since the grace period already underway may not have started
//! after they were pushed.

use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use super::synchronize;

/// A pending reclamation, type-erased as a boxed closure so the queue can
/// be homogeneous across every `T` that [`defer_free`] is called with.
type Callback = Box<dyn FnOnce() + Send>;

struct Reclaimer {
    pending: Mutex<Vec<Callback>>,
}

static RECLAIMER: OnceLock<Reclaimer> = OnceLock::new();
static REAPER: OnceLock<JoinHandle<()>> = OnceLock::new();

/// Interval between reaper sweeps. The original ships a fixed period for
/// the same reason: there is no cheap way to wake the reaper early without
/// a second synchronization primitive, and deferred frees are not latency
/// sensitive by contract.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

fn reclaimer() -> &'static Reclaimer {
    RECLAIMER.get_or_init(|| Reclaimer {
        pending: Mutex::new(Vec::new()),
    })
}

fn ensure_reaper_running() {
    REAPER.get_or_init(|| {
        std::thread::Builder::new()
            .name("rcu-reaper".into())
            .spawn(reaper_loop)
            .expect("rcu-core: failed to spawn reaper thread")
    });
}

fn reaper_loop() {
    super::register_thread();
    loop {
        std::thread::sleep(REAP_INTERVAL);
        let batch = {
            let mut pending = reclaimer().pending.lock();
            if pending.is_empty() {
                continue;
            }
            std::mem::take(&mut *pending)
        };
        synchronize();
        for callback in batch {
            callback();
        }
    }
}

/// Schedule `ptr` to be freed with `free_fn` after the next grace period
/// elapses, rather than immediately.
///
/// Callers must have already made `ptr` unreachable from new readers (e.g.
/// by unlinking it) before calling this; `defer_free` only delays the
/// actual free, it does not perform the unlink.
///
/// # Safety
///
/// `ptr` must be a valid, uniquely-owned pointer obtained from `Box::into_raw`
/// (or equivalent) of a `T`, and `free_fn` must correctly reclaim it exactly
/// once. The caller must not free `ptr` through any other path.
#[allow(unsafe_code)]
pub unsafe fn defer_free<T: Send + 'static>(ptr: *mut T, free_fn: unsafe fn(*mut T)) {
    ensure_reaper_running();
    // SAFETY: the closure below re-invokes `free_fn` on exactly the `ptr`
    // it was paired with, under the same preconditions documented on this
    // function's own `# Safety` section.
    let ptr = ptr as usize;
    let callback: Callback = Box::new(move || unsafe { free_fn(ptr as *mut T) });
    reclaimer().pending.lock().push(callback);
}
