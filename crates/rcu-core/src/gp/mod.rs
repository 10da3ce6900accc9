//! Grace-period detection engine.
//!
//! A process-wide singleton tracking a phase-bit global counter, a registry
//! of registered reader threads, and a wait queue of writers requesting a
//! grace period. See the module docs on [`reader`] and [`writer`] for the
//! two halves of the protocol.

mod flavor;
mod futex;
mod reader;
mod reclaim;
mod registry;
mod writer;

use std::sync::atomic::AtomicUsize;
use std::sync::OnceLock;

use parking_lot::Mutex;

use registry::Registry;
use writer::WaitQueue;

pub use reader::{read_enter, read_exit, read_ongoing, register_thread, unregister_thread};
pub use reclaim::defer_free;
pub use writer::synchronize;

/// Nesting-depth increment unit (low bits of a reader's `ctr`).
const RCU_GP_COUNT: usize = 1;
/// Phase bit of the global and per-reader counters. Chosen well above any
/// realistic nesting depth so the two never overlap.
const RCU_GP_CTR_PHASE: usize = 1 << 30;
/// Mask isolating the nesting-depth bits of a counter.
const RCU_GP_CTR_NEST_MASK: usize = RCU_GP_CTR_PHASE - 1;

/// Spin attempts before a waiting writer parks on the futex.
const RCU_QS_ACTIVE_ATTEMPTS: u32 = 100;
/// Iterations between broadcast barriers while waiting, to force readers on
/// platforms with incoherent caches to flush their `ctr` to memory.
const KICK_READER_LOOPS: u32 = 10_000;

/// Classification of a reader relative to the current global phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReaderState {
    /// Not in a read section.
    Inactive,
    /// In a read section, observed the current phase.
    ActiveCurrent,
    /// In a read section, observed the *previous* phase — the only state a
    /// writer must wait out.
    ActiveOld,
}

pub(crate) fn classify(reader_ctr: usize, global_ctr: usize) -> ReaderState {
    if reader_ctr & RCU_GP_CTR_NEST_MASK == 0 {
        ReaderState::Inactive
    } else if (reader_ctr ^ global_ctr) & RCU_GP_CTR_PHASE == 0 {
        ReaderState::ActiveCurrent
    } else {
        ReaderState::ActiveOld
    }
}

/// Process-wide GP singleton. Lazily and idempotently initialized on first
/// use; never torn down.
pub(crate) struct GpState {
    pub(crate) ctr: AtomicUsize,
    /// Serializes writers and guards registry mutation.
    pub(crate) gp_mutex: Mutex<()>,
    pub(crate) registry: Registry,
    pub(crate) wait_queue: WaitQueue,
}

static GP_STATE: OnceLock<GpState> = OnceLock::new();

pub(crate) fn global() -> &'static GpState {
    GP_STATE.get_or_init(|| GpState {
        ctr: AtomicUsize::new(RCU_GP_COUNT),
        gp_mutex: Mutex::new(()),
        registry: Registry::default(),
        wait_queue: WaitQueue::default(),
    })
}
