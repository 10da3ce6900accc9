//! Reader-side state and the reader-side half of the GP API.
//!
//! `read_enter`/`read_exit` issue no atomic read-modify-write and no
//! compare-exchange — only plain loads and stores, plus whatever barrier the
//! selected [`Flavor`](crate::gp::flavor::Flavor) requires. This is the
//! entire reason readers scale independently of writer count.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::gp::flavor::{ActiveFlavor, Flavor};
use crate::gp::{global, RCU_GP_COUNT, RCU_GP_CTR_NEST_MASK, RCU_GP_CTR_PHASE};

/// Per-thread reader record. Lives in the registry for as long as the owning
/// thread is registered; mutated only by its owning thread, read by writers
/// during grace-period scans.
pub(crate) struct ReaderSlot {
    /// Nesting depth in the low bits, observed global phase in
    /// [`RCU_GP_CTR_PHASE`].
    pub(crate) ctr: AtomicUsize,
    /// Signal flavor only: set by the writer before signaling, cleared by
    /// the handler once it has executed a real barrier.
    pub(crate) need_mb: AtomicBool,
    #[cfg(all(target_os = "linux", feature = "flavor-signal"))]
    os_tid: libc::pthread_t,
}

impl ReaderSlot {
    fn new() -> Self {
        Self {
            ctr: AtomicUsize::new(0),
            need_mb: AtomicBool::new(false),
            #[cfg(all(target_os = "linux", feature = "flavor-signal"))]
            os_tid: {
                // SAFETY: pthread_self() has no preconditions.
                #[allow(unsafe_code)]
                unsafe {
                    libc::pthread_self()
                }
            },
        }
    }

    #[cfg(all(target_os = "linux", feature = "flavor-signal"))]
    pub(crate) fn os_thread_id(&self) -> libc::pthread_t {
        self.os_tid
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<ReaderSlot>>> = const { RefCell::new(None) };
    /// Shadow of `CURRENT`'s pointee, readable from a signal handler
    /// without touching the `RefCell` (a handler that interrupted code
    /// already borrowing `CURRENT` would otherwise abort on a panicking
    /// double-borrow).
    static CURRENT_RAW: Cell<*const ReaderSlot> = const { Cell::new(std::ptr::null()) };
}

/// Register the calling thread as an RCU reader. Must be called once before
/// any `read_enter`/`read_exit`, and the thread must not already be in a
/// read section.
pub fn register_thread() {
    CURRENT.with(|cell| {
        let mut cell = cell.borrow_mut();
        assert!(cell.is_none(), "rcu-core: thread already registered");
        let slot = Arc::new(ReaderSlot::new());
        let state = global();
        ActiveFlavor::init();
        state.registry.add(Arc::clone(&slot));
        CURRENT_RAW.with(|raw| raw.set(Arc::as_ptr(&slot)));
        *cell = Some(slot);
    });
}

/// Unregister the calling thread. The thread must not be in a read section.
///
/// Unlike TLS-destructor-based designs, this library requires an explicit
/// call: a reader that exits without unregistering would otherwise be
/// scanned forever by every future `synchronize`.
pub fn unregister_thread() {
    CURRENT.with(|cell| {
        let mut cell = cell.borrow_mut();
        if let Some(slot) = cell.take() {
            assert_eq!(
                slot.ctr.load(Ordering::Relaxed) & RCU_GP_CTR_NEST_MASK,
                0,
                "rcu-core: unregister_thread called while inside a read section"
            );
            CURRENT_RAW.with(|raw| raw.set(std::ptr::null()));
            global().registry.remove(&slot);
        }
    });
}

/// Enter a (possibly nested) RCU read-side critical section.
pub fn read_enter() {
    CURRENT.with(|cell| {
        let cell = cell.borrow();
        let slot = cell
            .as_ref()
            .expect("rcu-core: read_enter called without register_thread");
        let old = slot.ctr.load(Ordering::Relaxed);
        if old & RCU_GP_CTR_NEST_MASK == 0 {
            let phase = global().ctr.load(Ordering::Relaxed) & RCU_GP_CTR_PHASE;
            slot.ctr.store(phase | RCU_GP_COUNT, Ordering::Relaxed);
            ActiveFlavor::read_barrier();
        } else {
            slot.ctr.store(old + RCU_GP_COUNT, Ordering::Relaxed);
        }
    });
}

/// Exit a read-side critical section entered with [`read_enter`].
pub fn read_exit() {
    CURRENT.with(|cell| {
        let cell = cell.borrow();
        let slot = cell
            .as_ref()
            .expect("rcu-core: read_exit called without register_thread");
        ActiveFlavor::read_barrier();
        slot.ctr.fetch_sub(RCU_GP_COUNT, Ordering::Release);
    });
}

/// True iff the calling thread currently has a nonzero read-section depth.
#[must_use]
pub fn read_ongoing() -> bool {
    CURRENT.with(|cell| {
        cell.borrow()
            .as_ref()
            .is_some_and(|slot| slot.ctr.load(Ordering::Relaxed) & RCU_GP_CTR_NEST_MASK != 0)
    })
}

/// Signal-flavor handler callback: clear `need_mb` on the signaled thread.
///
/// # Safety
///
/// Called only from `sigrcu_handler`, on the thread it interrupted. Reads
/// `CURRENT_RAW`'s `Cell` (never panics) instead of `CURRENT`'s `RefCell`,
/// and the pointee is kept alive by `CURRENT` for as long as the thread
/// remains registered, which a signal handler cannot outlive.
#[cfg(feature = "flavor-signal")]
#[allow(unsafe_code)]
pub(crate) fn clear_need_mb_on_current() {
    let ptr = CURRENT_RAW.with(Cell::get);
    if let Some(slot) = unsafe { ptr.as_ref() } {
        slot.need_mb.store(false, Ordering::Release);
    }
}
