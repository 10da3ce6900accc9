//! Futex-backed park/wake, with a portable spin-sleep fallback.
//!
//! Only ever used on the writer side, to park a waiter that has exhausted
//! its spin budget in [`super::RCU_QS_ACTIVE_ATTEMPTS`] attempts. Readers
//! never touch this module.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[cfg(target_os = "linux")]
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: i64::from(timeout.subsec_nanos()),
    };
    // SAFETY: FUTEX_WAIT reads `word` and compares it against `expected`
    // atomically with going to sleep; `word` outlives the call and the
    // timespec is stack-local and valid for the syscall's duration.
    #[allow(unsafe_code)]
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            &ts as *const libc::timespec,
        );
    }
}

#[cfg(target_os = "linux")]
pub(crate) fn wake_all(word: &AtomicU32) {
    // SAFETY: FUTEX_WAKE only reads `word`'s address to find waiters; no
    // aliasing or lifetime requirement beyond the reference itself.
    #[allow(unsafe_code)]
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, i32::MAX);
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wait(_word: &AtomicU32, _expected: u32, timeout: Duration) {
    std::thread::sleep(timeout.min(Duration::from_millis(1)));
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wake_all(_word: &AtomicU32) {}

pub(crate) fn bump(word: &AtomicU32) {
    word.fetch_add(1, Ordering::AcqRel);
    wake_all(word);
}
