//! Writer-side half of the GP protocol: [`synchronize`] and the wait-queue
//! batching that lets concurrently-arriving writers share one grace period.
//!
//! The original library threads waiters through an intrusive
//! `urcu-wait.h` queue with a hand-rolled adaptive busy-wait. Here a
//! `Mutex<VecDeque<Arc<Waiter>>>` plays the queue's role and each
//! [`Waiter`] parks on its own futex word, but the externally observable
//! behavior is the same: the first caller to find the queue empty becomes
//! the leader and runs the actual grace period for itself and everyone who
//! enqueued before it finished; everyone else just waits to be woken.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::gp::flavor::{ActiveFlavor, Flavor};
use crate::gp::{classify, futex, global, ReaderState, KICK_READER_LOOPS, RCU_QS_ACTIVE_ATTEMPTS};

struct Waiter {
    /// 0 while pending, bumped (and futex-woken) once the leader has
    /// completed the grace period this waiter was queued for.
    done: AtomicU32,
}

impl Waiter {
    fn new() -> Self {
        Self {
            done: AtomicU32::new(0),
        }
    }

    fn mark_done(&self) {
        futex::bump(&self.done);
    }

    fn park_until_done(&self) {
        loop {
            if self.done.load(Ordering::Acquire) != 0 {
                return;
            }
            futex::wait(&self.done, 0, Duration::from_millis(50));
        }
    }
}

#[derive(Default)]
pub(crate) struct WaitQueue {
    queue: Mutex<VecDeque<Arc<Waiter>>>,
}

impl WaitQueue {
    /// Enqueue a new waiter; returns `true` if the caller must run the
    /// grace period itself (the queue was empty, i.e. no other writer is
    /// currently acting as leader).
    fn enqueue(&self, waiter: &Arc<Waiter>) -> bool {
        let mut queue = self.queue.lock();
        let is_leader = queue.is_empty();
        queue.push_back(Arc::clone(waiter));
        is_leader
    }

    /// Drain the queue for the leader to process as one batch.
    fn drain(&self) -> VecDeque<Arc<Waiter>> {
        std::mem::take(&mut self.queue.lock())
    }
}

/// Block the calling thread until every read-side critical section that was
/// already in progress when this call started has completed.
///
/// Safe to call concurrently from multiple writer threads: concurrent
/// callers are batched onto a single underlying grace period rather than
/// each running their own back-to-back.
pub fn synchronize() {
    let state = global();
    let waiter = Arc::new(Waiter::new());
    if state.wait_queue.enqueue(&waiter) {
        let _gp_guard = state.gp_mutex.lock();
        let batch = state.wait_queue.drain();
        run_grace_period();
        for w in &batch {
            w.mark_done();
        }
    } else {
        waiter.park_until_done();
    }
}

fn run_grace_period() {
    let state = global();
    let old_ctr = state.ctr.load(Ordering::Acquire);
    ActiveFlavor::smp_mb_master(&state.registry);
    // Pass 1, pre-flip phase as reference. Every reader active this
    // early should show it; a reader showing anything else would mean
    // an earlier grace period finished without waiting it out.
    wait_for_readers(old_ctr);
    state.ctr.fetch_xor(crate::gp::RCU_GP_CTR_PHASE, Ordering::AcqRel);
    let new_ctr = old_ctr ^ crate::gp::RCU_GP_CTR_PHASE;
    ActiveFlavor::smp_mb_master(&state.registry);
    // Pass 2, post-flip phase as reference. A reader still carrying the
    // old phase here is exactly who this grace period waits out.
    wait_for_readers(new_ctr);
}

/// Wait until no registered reader is active with a phase other than the
/// one recorded in `target_ctr`. Called twice per grace period, bracketing
/// the phase flip, each time against the phase readers are expected to
/// observe at that point.
fn wait_for_readers(target_ctr: usize) {
    let state = global();
    let mut scanning = state.registry.take_all();
    let mut attempts: u32 = 0;
    loop {
        let mut still_old = Vec::with_capacity(scanning.len());
        let mut cleared = Vec::with_capacity(scanning.len());
        for reader in scanning.drain(..) {
            let ctr = reader.ctr.load(Ordering::Acquire);
            if classify(ctr, target_ctr) == ReaderState::ActiveOld {
                still_old.push(reader);
            } else {
                cleared.push(reader);
            }
        }
        state.registry.restore(cleared);
        if still_old.is_empty() {
            return;
        }
        scanning = still_old;
        attempts = attempts.wrapping_add(1);
        if attempts < RCU_QS_ACTIVE_ATTEMPTS {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(Duration::from_micros(50));
        }
        if attempts % KICK_READER_LOOPS == 0 {
            ActiveFlavor::smp_mb_master(&state.registry);
        }
    }
}
