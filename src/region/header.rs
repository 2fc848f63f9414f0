//! Region header written by the first creator and validated by later openers

use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::error::{AttuneError, Result};

use super::{ATTUNE_MAGIC, CACHE_LINE_SIZE, SCHEMA_VERSION};

/// Semantic role of a shared region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RegionKind {
    /// The singleton global context region
    Global = 1,
    /// Backing storage for the control channel
    ControlChannel = 2,
    /// Backing storage for the feedback channel
    FeedbackChannel = 3,
    /// A dynamically published shared config region
    SharedConfig = 4,
}

impl RegionKind {
    /// Decode a kind from its shared-memory representation
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Global),
            2 => Some(Self::ControlChannel),
            3 => Some(Self::FeedbackChannel),
            4 => Some(Self::SharedConfig),
            _ => None,
        }
    }

    /// Encode this kind for shared memory
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

/// Fixed binary header at the start of every attune region.
///
/// Written exactly once by whichever process actually created the backing
/// segment; every later opener validates it against its own expectation,
/// which guards against stale or foreign segments reusing the same OS name.
#[repr(C)]
pub struct RegionHeader {
    /// Magic number for validation
    pub magic: u64,
    /// Region role, as [`RegionKind::as_raw`]
    pub region_kind: u32,
    /// Index distinguishing regions of the same kind
    pub region_index: u32,
    /// Payload layout version
    pub payload_version: u32,
    /// Padding to cache line boundary
    _padding: [u8; CACHE_LINE_SIZE - 20],
}

const _: () = assert!(size_of::<RegionHeader>() == CACHE_LINE_SIZE);

impl RegionHeader {
    /// Create a header for a freshly created region
    pub fn new(kind: RegionKind, index: u32) -> Self {
        Self {
            magic: ATTUNE_MAGIC,
            region_kind: kind.as_raw(),
            region_index: index,
            payload_version: SCHEMA_VERSION,
            _padding: [0; CACHE_LINE_SIZE - 20],
        }
    }

    /// Validate an existing header against the caller's expectation
    pub fn validate(&self, name: &str, kind: RegionKind, index: u32) -> Result<()> {
        if self.magic != ATTUNE_MAGIC {
            return Err(AttuneError::incompatible(name, "invalid magic number"));
        }
        if self.region_kind != kind.as_raw() {
            return Err(AttuneError::incompatible(
                name,
                format!(
                    "region kind mismatch: expected {:?}, found raw {}",
                    kind, self.region_kind
                ),
            ));
        }
        if self.region_index != index {
            return Err(AttuneError::incompatible(
                name,
                format!(
                    "region index mismatch: expected {}, found {}",
                    index, self.region_index
                ),
            ));
        }
        if self.payload_version != SCHEMA_VERSION {
            return Err(AttuneError::incompatible(
                name,
                format!(
                    "unsupported payload version {} (supported: {})",
                    self.payload_version, SCHEMA_VERSION
                ),
            ));
        }
        Ok(())
    }
}
