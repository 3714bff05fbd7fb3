//! Cross-process wakeup on the `write_index` word.
//!
//! On Linux the consumer parks on the shared `write_index` with a
//! non-private futex and the producer wakes it after every index store and
//! after setting the shutdown flag. The wait always carries a timeout, so
//! a missed wake (or a producer that never issues one) costs at most one
//! poll interval. Other platforms sleep for the poll interval instead.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Blocks until `word` may differ from `observed`, a wake arrives, or
/// `timeout` elapses. Spurious returns are allowed; callers re-read state.
#[inline]
pub fn wait_for_change(word: &AtomicU32, observed: u32, timeout: Duration) {
    imp::wait(word, observed, timeout);
}

/// Wakes every process parked on `word`.
#[inline]
pub fn wake_all(word: &AtomicU32) {
    imp::wake(word);
}

#[cfg(target_os = "linux")]
mod imp {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    pub fn wait(word: &AtomicU32, observed: u32, timeout: Duration) {
        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as libc::c_long,
        };
        // SAFETY: `word` is a live, 4-byte aligned u32 for the duration of
        // the call. FUTEX_WAIT (without the PRIVATE flag) keys on the
        // physical page, so it pairs with wakes from other processes that
        // map the same segment. EAGAIN / ETIMEDOUT / EINTR are all treated
        // as "go re-read the header".
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAIT,
                observed,
                &ts as *const libc::timespec,
            );
        }
    }

    pub fn wake(word: &AtomicU32) {
        // SAFETY: same address requirements as `wait`; waking with no
        // waiters is a no-op.
        unsafe {
            libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, i32::MAX);
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    pub fn wait(word: &AtomicU32, observed: u32, timeout: Duration) {
        if word.load(Ordering::Acquire) == observed {
            std::thread::sleep(timeout);
        }
    }

    pub fn wake(_word: &AtomicU32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    #[test]
    fn wait_times_out_when_nothing_changes() {
        let word = AtomicU32::new(3);
        let start = Instant::now();
        wait_for_change(&word, 3, Duration::from_millis(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_returns_immediately_on_stale_observation() {
        let word = AtomicU32::new(4);
        let start = Instant::now();
        wait_for_change(&word, 3, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wake_releases_a_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let waiter = {
            let word = Arc::clone(&word);
            std::thread::spawn(move || {
                let start = Instant::now();
                while word.load(Ordering::Acquire) == 0 {
                    wait_for_change(&word, 0, Duration::from_millis(50));
                }
                start.elapsed()
            })
        };
        std::thread::sleep(Duration::from_millis(2));
        word.store(1, Ordering::Release);
        wake_all(&word);
        let waited = waiter.join().expect("waiter panicked");
        assert!(waited < Duration::from_secs(2));
    }
}
