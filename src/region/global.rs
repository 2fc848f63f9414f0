//! Global context region layout
//!
//! The root of all shared state: the attached-process counter, the sync
//! state for both channels, and the shared-config directory. Exactly one
//! such region exists per logical context; it is initialized by whichever
//! process's create-or-open actually created the backing segment.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::{ConfigDirectory, RegionHeader, CACHE_LINE_SIZE};

/// Ring positions for one channel.
///
/// The positions live here, in the global region, rather than in the channel
/// backing region, so a channel region holds nothing but payload bytes.
#[repr(C)]
pub struct ChannelSync {
    /// Total bytes written by the producer
    pub write_pos: AtomicU64,
    /// Total bytes consumed by the consumer
    pub read_pos: AtomicU64,
    /// Padding to cache line boundary
    _padding: [u8; CACHE_LINE_SIZE - 16],
}

/// Payload of the global context region.
///
/// All-zero bytes are the valid initial state: no attached processes, empty
/// directory, both channels empty.
#[repr(C)]
pub struct GlobalPayload {
    /// Number of processes currently attached to the context
    pub attached_processes: AtomicU32,
    _pad: [u8; CACHE_LINE_SIZE - 4],
    /// Control channel ring positions
    pub control_sync: ChannelSync,
    /// Feedback channel ring positions
    pub feedback_sync: ChannelSync,
    /// Shared-config directory
    pub directory: ConfigDirectory,
}

const _: () = assert!(
    size_of::<RegionHeader>() + size_of::<GlobalPayload>() <= crate::config::CONTEXT_REGION_SIZE
);

impl GlobalPayload {
    /// Record this process as attached; returns the new attach count
    pub fn attach(&self) -> u32 {
        self.attached_processes.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record this process as detached.
    ///
    /// Returns the pre-decrement count: a return value of 1 means the caller
    /// was the last attached process and owns cleanup of every OS-global
    /// name.
    pub fn detach(&self) -> u32 {
        self.attached_processes.fetch_sub(1, Ordering::AcqRel)
    }

    /// Current attach count
    pub fn attached(&self) -> u32 {
        self.attached_processes.load(Ordering::Acquire)
    }
}
