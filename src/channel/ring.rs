//! Interprocess byte ring over a shared buffer
//!
//! Frames are a little-endian `u32` length prefix followed by the payload,
//! wrapping at the buffer boundary. The ring positions are monotonically
//! increasing byte counts living in the global region's [`ChannelSync`];
//! the buffer itself is the channel's backing region. Single producer,
//! single consumer.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::{
    error::{AttuneError, Result},
    region::ChannelSync,
};

/// Bytes of the length prefix in front of every frame
pub const FRAME_HEADER_SIZE: usize = 4;

/// SPSC byte ring whose positions live outside the buffer
pub struct SharedByteRing {
    sync: NonNull<ChannelSync>,
    buf: NonNull<u8>,
    capacity: usize,
    mask: usize,
}

// The ring only touches shared bytes through the position protocol below.
unsafe impl Send for SharedByteRing {}

impl SharedByteRing {
    /// Create a ring over `capacity` bytes at `buf` with positions in `sync`.
    ///
    /// # Safety
    /// `sync` and `buf` must stay valid for the lifetime of the ring, and the
    /// caller must uphold the single-producer/single-consumer discipline per
    /// position pair.
    pub unsafe fn new(
        sync: NonNull<ChannelSync>,
        buf: NonNull<u8>,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(AttuneError::invalid_parameter(
                "capacity",
                "ring capacity must be a power of two and greater than 0",
            ));
        }
        Ok(Self {
            sync,
            buf,
            capacity,
            mask: capacity - 1,
        })
    }

    fn sync(&self) -> &ChannelSync {
        unsafe { self.sync.as_ref() }
    }

    /// Ring capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest frame payload the ring can carry
    pub fn max_frame(&self) -> usize {
        self.capacity - FRAME_HEADER_SIZE
    }

    /// Bytes currently enqueued
    pub fn len(&self) -> usize {
        let sync = self.sync();
        let write = sync.write_pos.load(Ordering::Acquire);
        let read = sync.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) as usize
    }

    /// Whether the ring holds no frames
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to enqueue one frame; returns false when there is no space
    pub fn try_push(&self, frame: &[u8]) -> Result<bool> {
        if frame.len() > self.max_frame() {
            return Err(AttuneError::invalid_parameter(
                "frame",
                format!(
                    "frame of {} bytes exceeds ring capacity of {}",
                    frame.len(),
                    self.max_frame()
                ),
            ));
        }

        let sync = self.sync();
        let total = (FRAME_HEADER_SIZE + frame.len()) as u64;
        // write_pos is producer-owned; only read_pos needs an acquire load.
        let write = sync.write_pos.load(Ordering::Relaxed);
        let read = sync.read_pos.load(Ordering::Acquire);
        if (self.capacity as u64) - write.wrapping_sub(read) < total {
            return Ok(false);
        }

        self.copy_in(write, &(frame.len() as u32).to_le_bytes());
        self.copy_in(write + FRAME_HEADER_SIZE as u64, frame);
        sync.write_pos.store(write + total, Ordering::Release);
        Ok(true)
    }

    /// Try to dequeue one frame; returns `None` when the ring is empty
    pub fn try_pop(&self) -> Result<Option<Vec<u8>>> {
        let sync = self.sync();
        // read_pos is consumer-owned; only write_pos needs an acquire load.
        let read = sync.read_pos.load(Ordering::Relaxed);
        let write = sync.write_pos.load(Ordering::Acquire);
        if write == read {
            return Ok(None);
        }

        let mut len_bytes = [0u8; FRAME_HEADER_SIZE];
        self.copy_out(read, &mut len_bytes);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let total = (FRAME_HEADER_SIZE + len) as u64;
        if len > self.max_frame() || write.wrapping_sub(read) < total {
            return Err(AttuneError::resource(format!(
                "corrupted channel frame: length {} at position {}",
                len, read
            )));
        }

        let mut frame = vec![0u8; len];
        self.copy_out(read + FRAME_HEADER_SIZE as u64, &mut frame);
        sync.read_pos.store(read + total, Ordering::Release);
        Ok(Some(frame))
    }

    fn copy_in(&self, pos: u64, bytes: &[u8]) {
        let offset = (pos as usize) & self.mask;
        let first = bytes.len().min(self.capacity - offset);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.buf.as_ptr().add(offset), first);
            if first < bytes.len() {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr().add(first),
                    self.buf.as_ptr(),
                    bytes.len() - first,
                );
            }
        }
    }

    fn copy_out(&self, pos: u64, out: &mut [u8]) {
        let offset = (pos as usize) & self.mask;
        let first = out.len().min(self.capacity - offset);
        unsafe {
            std::ptr::copy_nonoverlapping(self.buf.as_ptr().add(offset), out.as_mut_ptr(), first);
            if first < out.len() {
                std::ptr::copy_nonoverlapping(
                    self.buf.as_ptr(),
                    out.as_mut_ptr().add(first),
                    out.len() - first,
                );
            }
        }
    }
}
