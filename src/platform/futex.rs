//! Futex-based cross-process wakeup on a shared atomic word
//!
//! On Linux the word is handed to `FUTEX_WAIT`/`FUTEX_WAKE` directly (no
//! `FUTEX_PRIVATE_FLAG`, the word lives in memory mapped by several
//! processes). Other platforms fall back to bounded polling.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Block until `word` changes away from `expected`, a wakeup arrives, or the
/// timeout elapses. Spurious returns are allowed; callers re-check their
/// predicate in a loop.
#[cfg(target_os = "linux")]
pub fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let ts = timeout.map(|t| libc::timespec {
        tv_sec: t.as_secs() as libc::time_t,
        tv_nsec: t.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map(|t| t as *const libc::timespec)
        .unwrap_or(std::ptr::null());

    // EAGAIN (word already changed), EINTR and ETIMEDOUT are all handled by
    // the caller's re-check loop.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Wake up to `count` waiters blocked on `word`.
#[cfg(target_os = "linux")]
pub fn wake(word: &AtomicU32, count: u32) {
    // The kernel takes a signed wake count.
    let count = count.min(i32::MAX as u32) as i32;
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE,
            count,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    use std::sync::atomic::Ordering;

    const POLL_INTERVAL: Duration = Duration::from_millis(1);
    let slice = match timeout {
        Some(t) if t < POLL_INTERVAL => t,
        _ => POLL_INTERVAL,
    };
    if word.load(Ordering::Acquire) == expected {
        std::thread::sleep(slice);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wake(_word: &AtomicU32, _count: u32) {
    // Waiters poll; nothing to do.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_wait_returns_when_value_differs() {
        let word = AtomicU32::new(1);
        let start = Instant::now();
        // Expected value does not match; the kernel returns immediately.
        wait(&word, 0, Some(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wake_unblocks_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let word2 = Arc::clone(&word);

        let waiter = std::thread::spawn(move || {
            while word2.load(Ordering::Acquire) == 0 {
                wait(&word2, 0, Some(Duration::from_millis(100)));
            }
        });

        std::thread::sleep(Duration::from_millis(20));
        word.store(1, Ordering::Release);
        wake(&word, u32::MAX);

        waiter.join().unwrap();
    }
}
