//! Named cross-process notification events
//!
//! An event is a tiny named shared region holding a single futex word. Any
//! process that knows the name can signal it or block on it, which is what
//! the channel layer needs to wake a consumer sleeping on an empty ring.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::{
    error::{AttuneError, Result},
    platform::{futex, NamedSharedRegion},
};

/// Size of the backing segment for one event. A futex word needs four bytes;
/// the rest is padding so the layout can grow without a name-format change.
pub const EVENT_REGION_SIZE: usize = 64;

/// Shared state at the start of the event region. Zero bytes are a valid
/// (unsignaled) state, which is what a fresh segment contains.
#[repr(C)]
struct EventState {
    signal: AtomicU32,
}

/// An OS-backed binary signal identified by a global name.
///
/// Signaling is sticky: the event stays set until some waiter consumes it.
/// Waits take a bounded timeout so a process never hangs on a peer that
/// crashed before signaling.
#[derive(Debug)]
pub struct NamedSyncEvent {
    region: NamedSharedRegion,
}

impl NamedSyncEvent {
    /// Create the event, or open it if another process got there first
    pub fn create_or_open(name: &str) -> Result<(Self, bool)> {
        let (region, created) = NamedSharedRegion::create_or_open(name, EVENT_REGION_SIZE)?;
        Ok((Self { region }, created))
    }

    fn state(&self) -> &EventState {
        unsafe { &*self.region.as_ptr::<EventState>() }
    }

    /// Set the event and wake every blocked waiter
    pub fn signal(&self) -> Result<()> {
        let state = self.state();
        state.signal.store(1, Ordering::Release);
        futex::wake(&state.signal, u32::MAX);
        Ok(())
    }

    /// Block until the event is signaled, consuming the signal.
    ///
    /// Returns `WaitTimeout` if `timeout` elapses first.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if state.signal.swap(0, Ordering::AcqRel) == 1 {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AttuneError::WaitTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            futex::wait(&state.signal, 0, Some(deadline - now));
        }
    }

    /// Check the signal without consuming it
    pub fn is_signaled(&self) -> bool {
        self.state().signal.load(Ordering::Acquire) == 1
    }

    /// Get the OS-global name of the event
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Whether this instance created the event (vs. opened an existing one)
    pub fn created(&self) -> bool {
        self.region.created()
    }

    /// Whether closing will also delete the OS-global name
    pub fn cleanup_on_close(&self) -> bool {
        self.region.cleanup_on_close()
    }

    /// Request deletion of the OS-global name when this event is closed
    pub fn mark_cleanup(&mut self) {
        self.region.mark_cleanup();
    }

    /// Release the event; delete the OS-global name if marked for cleanup
    pub fn close(&mut self) {
        self.region.close();
    }
}
