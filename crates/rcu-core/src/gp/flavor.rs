//! Broadcast-barrier flavors.
//!
//! Three interchangeable strategies for `smp_mb_master`, the writer-side
//! operation that must force every reader's compiler barrier to become a
//! real memory barrier for the duration of a grace period. Exactly one is
//! compiled in, selected by the mutually exclusive `flavor-*` Cargo
//! features (enforced in `build.rs`); callers cannot mix flavors within a
//! process, matching the "at most one flavor is linked" contract of the
//! original library.

use std::sync::atomic::{fence, Ordering};

use crate::gp::registry::Registry;

/// Reader-side barrier cost and writer-side broadcast strategy for one GP
/// flavor.
pub(crate) trait Flavor {
    /// Barrier issued by `read_enter`/`read_exit` around the published
    /// phase. Cheap flavors (signal) use only a compiler fence here and
    /// rely on `smp_mb_master` to retroactively promote it.
    fn read_barrier();

    /// Writer-side broadcast: force every registered reader to have
    /// executed a real memory barrier since this call started.
    fn smp_mb_master(registry: &Registry);

    /// One-time, idempotent setup (installing a signal handler, probing
    /// for `sys_membarrier`, ...).
    fn init() {}
}

pub(crate) struct MembarrierFlavor;
pub(crate) struct MbFlavor;
pub(crate) struct SignalFlavor;

#[cfg(feature = "flavor-membarrier")]
mod membarrier_impl {
    use super::{fence, Flavor, MembarrierFlavor, Ordering, Registry};
    use std::sync::atomic::AtomicBool;
    use std::sync::OnceLock;

    #[cfg(target_os = "linux")]
    const MEMBARRIER_CMD_PRIVATE_EXPEDITED: i32 = 1 << 3;
    #[cfg(target_os = "linux")]
    const MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED: i32 = 1 << 2;

    static HAS_SYS_MEMBARRIER: OnceLock<bool> = OnceLock::new();
    static REGISTERED: AtomicBool = AtomicBool::new(false);

    #[cfg(target_os = "linux")]
    fn probe() -> bool {
        // SAFETY: SYS_membarrier with the QUERY command only reads kernel
        // capability bits; it has no side effects on process state.
        #[allow(unsafe_code)]
        let query = unsafe { libc::syscall(libc::SYS_membarrier, 1 << 16, 0) };
        if query < 0 || query & MEMBARRIER_CMD_PRIVATE_EXPEDITED as i64 == 0 {
            return false;
        }
        if !REGISTERED.swap(true, Ordering::AcqRel) {
            // SAFETY: registering this process for expedited private
            // membarrier is required before the command can be issued.
            #[allow(unsafe_code)]
            unsafe {
                libc::syscall(
                    libc::SYS_membarrier,
                    MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED,
                    0,
                );
            }
        }
        true
    }

    #[cfg(not(target_os = "linux"))]
    fn probe() -> bool {
        false
    }

    impl Flavor for MembarrierFlavor {
        fn read_barrier() {
            fence(Ordering::SeqCst);
        }

        fn smp_mb_master(_registry: &Registry) {
            let has_membarrier = *HAS_SYS_MEMBARRIER.get_or_init(probe);
            if has_membarrier {
                #[cfg(target_os = "linux")]
                {
                    // SAFETY: expedited private membarrier forces every
                    // thread of this process through a full barrier; no
                    // memory is touched directly by the syscall.
                    #[allow(unsafe_code)]
                    unsafe {
                        libc::syscall(libc::SYS_membarrier, MEMBARRIER_CMD_PRIVATE_EXPEDITED, 0);
                    }
                }
            } else {
                fence(Ordering::SeqCst);
            }
        }

        fn init() {
            let _ = HAS_SYS_MEMBARRIER.get_or_init(probe);
        }
    }
}

#[cfg(feature = "flavor-mb")]
impl Flavor for MbFlavor {
    fn read_barrier() {
        fence(Ordering::SeqCst);
    }

    fn smp_mb_master(_registry: &Registry) {
        fence(Ordering::SeqCst);
    }
}

#[cfg(feature = "flavor-signal")]
mod signal_impl {
    use super::{Flavor, Registry, SignalFlavor};
    use crate::gp::reader::ReaderSlot;
    use std::sync::atomic::{fence, Ordering};
    use std::sync::OnceLock;
    use std::time::Duration;

    /// Real-time signal reserved process-wide by the signal flavor.
    #[cfg(target_os = "linux")]
    pub(crate) const SIGRCU: i32 = libc::SIGRTMIN() + 1;

    static INIT: OnceLock<()> = OnceLock::new();

    #[cfg(target_os = "linux")]
    extern "C" fn sigrcu_handler(_signo: i32) {
        // SAFETY: a full barrier is the sole purpose of this handler; no
        // non-async-signal-safe calls are made.
        #[allow(unsafe_code)]
        {
            fence(Ordering::SeqCst);
        }
        crate::gp::reader::clear_need_mb_on_current();
        fence(Ordering::SeqCst);
    }

    #[cfg(target_os = "linux")]
    fn install_handler() {
        // SAFETY: installs a SA_SIGINFO-free, async-signal-safe handler
        // with an empty signal mask, matching the original's
        // `SA_SIGINFO | SA_RESTART` contract minus the siginfo payload we
        // do not use.
        #[allow(unsafe_code)]
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = sigrcu_handler as usize;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(SIGRCU, &action, std::ptr::null_mut()) != 0 {
                // Signal installation failure at init is a platform
                // invariant violation: there is no meaningful recovery.
                panic!("rcu-core: sigaction(SIGRCU) failed");
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn install_handler() {}

    impl Flavor for SignalFlavor {
        fn read_barrier() {
            // Compiler barrier only: the broadcast side promotes this to
            // a real barrier by signaling every registered reader.
            std::sync::atomic::compiler_fence(Ordering::SeqCst);
        }

        fn smp_mb_master(registry: &Registry) {
            let readers = registry.snapshot();
            if readers.is_empty() {
                return;
            }
            for reader in &readers {
                reader.need_mb.store(true, Ordering::Release);
                signal_reader(reader);
            }
            // Defend against lost signals: re-signal every 1ms until every
            // reader has observed and cleared `need_mb`.
            loop {
                let all_clear = readers
                    .iter()
                    .all(|r| !r.need_mb.load(Ordering::Acquire));
                if all_clear {
                    break;
                }
                for reader in &readers {
                    if reader.need_mb.load(Ordering::Acquire) {
                        signal_reader(reader);
                    }
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            fence(Ordering::SeqCst);
        }

        fn init() {
            INIT.get_or_init(install_handler);
        }
    }

    #[cfg(target_os = "linux")]
    fn signal_reader(reader: &ReaderSlot) {
        // SAFETY: pthread_kill with a handled real-time signal and a
        // valid, still-registered thread id.
        #[allow(unsafe_code)]
        unsafe {
            libc::pthread_kill(reader.os_thread_id(), SIGRCU);
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn signal_reader(_reader: &ReaderSlot) {}
}

#[cfg(feature = "flavor-membarrier")]
pub(crate) type ActiveFlavor = MembarrierFlavor;
#[cfg(feature = "flavor-mb")]
pub(crate) type ActiveFlavor = MbFlavor;
#[cfg(feature = "flavor-signal")]
pub(crate) type ActiveFlavor = SignalFlavor;
