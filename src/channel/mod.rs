//! Communication channels: shared ring plus notification event
//!
//! A channel pairs a named shared region (the ring bytes) with a named
//! event used to wake a consumer blocked on an empty ring. The ring
//! positions live in the global region, so a channel is pure composition
//! over resources the initializer already opened.

pub mod message;
pub mod ring;

pub use message::ControlMessage;
pub use ring::SharedByteRing;

use std::ptr::NonNull;
use std::time::{Duration, Instant};

use crate::{
    error::{AttuneError, Result},
    platform::{NamedSharedRegion, NamedSyncEvent},
    region::ChannelSync,
};

/// One communication path: ring storage plus its notification event
pub struct CommChannel {
    ring: SharedByteRing,
    region: NamedSharedRegion,
    event: NamedSyncEvent,
}

impl CommChannel {
    /// Compose a channel from an already-open backing region, its event, and
    /// the sync state in the global region. No OS calls happen here.
    ///
    /// # Safety
    /// `sync` must point into the mapped global region and stay valid for
    /// the channel's lifetime.
    pub(crate) unsafe fn new(
        sync: NonNull<ChannelSync>,
        region: NamedSharedRegion,
        event: NamedSyncEvent,
    ) -> Result<Self> {
        let buf = NonNull::new_unchecked(region.as_mut_ptr_unchecked::<u8>());
        let ring = SharedByteRing::new(sync, buf, region.size())?;
        Ok(Self {
            ring,
            region,
            event,
        })
    }

    /// Enqueue one frame and wake the consumer.
    ///
    /// Spins (yielding) while the ring is full, up to `timeout`.
    pub fn send(&mut self, frame: &[u8], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.ring.try_push(frame)? {
                self.event.signal()?;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AttuneError::WaitTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            std::thread::yield_now();
        }
    }

    /// Dequeue one frame, blocking on the notification event while the ring
    /// is empty, up to `timeout`.
    pub fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.ring.try_pop()? {
                return Ok(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AttuneError::WaitTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            // A signal between try_pop and wait is not lost: the event is
            // sticky, so the wait returns immediately and we re-poll.
            match self.event.wait(deadline - now) {
                Ok(()) => {}
                Err(AttuneError::WaitTimeout { .. }) => {
                    return Err(AttuneError::WaitTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Dequeue one frame without blocking
    pub fn try_recv(&mut self) -> Result<Option<Vec<u8>>> {
        self.ring.try_pop()
    }

    /// Encode and send a control message
    pub fn send_message(&mut self, msg: &ControlMessage, timeout: Duration) -> Result<()> {
        self.send(&msg.encode()?, timeout)
    }

    /// Receive and decode a control message
    pub fn recv_message(&mut self, timeout: Duration) -> Result<ControlMessage> {
        let frame = self.recv(timeout)?;
        ControlMessage::decode(&frame)
    }

    /// OS-global name of the backing region
    pub fn region_name(&self) -> &str {
        self.region.name()
    }

    /// OS-global name of the notification event
    pub fn event_name(&self) -> &str {
        self.event.name()
    }

    /// Whether this channel created its backing region
    pub fn created(&self) -> bool {
        self.region.created()
    }

    pub(crate) fn mark_cleanup(&mut self) {
        self.region.mark_cleanup();
        self.event.mark_cleanup();
    }

    pub(crate) fn close(&mut self) {
        self.region.close();
        self.event.close();
    }
}
