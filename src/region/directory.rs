//! Append-only shared-config directory
//!
//! The directory lives inside the global region, so no process owns
//! exclusive write access to it. Entries are append-only and never rewritten:
//! a slot is reserved with an atomic counter, filled in privately, then
//! published with a release store on its commit flag. Repeated registration
//! with identical metadata is idempotent; the same identifier with differing
//! metadata is a conflict.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{AttuneError, Result};

use super::{RegionKind, CACHE_LINE_SIZE, MAX_CONFIG_REGIONS, MAX_REGION_NAME_LEN};

/// Uniquely names one region's semantic role; stable across processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionIdentifier {
    pub kind: RegionKind,
    pub index: u32,
}

impl RegionIdentifier {
    pub fn new(kind: RegionKind, index: u32) -> Self {
        Self { kind, index }
    }
}

/// Describes how to re-open a region that some process already created.
///
/// Written once by the creator, read-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRegistration {
    pub id: RegionIdentifier,
    pub name: String,
    pub size: u64,
}

const SLOT_COMMITTED: u32 = 1;

/// One fixed-layout directory entry in shared memory
#[repr(C)]
struct DirectorySlot {
    /// Commit flag; the slot's other fields are valid only after a release
    /// store of `SLOT_COMMITTED` here
    state: AtomicU32,
    kind: u32,
    index: u32,
    name_len: u32,
    size: u64,
    name: [u8; MAX_REGION_NAME_LEN],
    _padding: [u8; 8],
}

const _: () = assert!(size_of::<DirectorySlot>() == 96);

impl DirectorySlot {
    fn matches(&self, id: RegionIdentifier) -> bool {
        self.kind == id.kind.as_raw() && self.index == id.index
    }

    fn registration(&self) -> Option<RegionRegistration> {
        let kind = RegionKind::from_raw(self.kind)?;
        let name_len = (self.name_len as usize).min(MAX_REGION_NAME_LEN);
        let name = String::from_utf8_lossy(&self.name[..name_len]).into_owned();
        Some(RegionRegistration {
            id: RegionIdentifier::new(kind, self.index),
            name,
            size: self.size,
        })
    }
}

/// In-shared-memory mapping from [`RegionIdentifier`] to
/// [`RegionRegistration`]. Fixed capacity, append-only, never shrinks at
/// runtime.
#[repr(C)]
pub struct ConfigDirectory {
    /// Number of slots handed out (committed or in-flight)
    reserved: AtomicU32,
    _pad: [u8; CACHE_LINE_SIZE - 4],
    slots: [DirectorySlot; MAX_CONFIG_REGIONS],
}

impl ConfigDirectory {
    /// Directory capacity
    pub fn capacity() -> usize {
        MAX_CONFIG_REGIONS
    }

    /// Register a region, or verify an existing registration.
    ///
    /// If `registration.id` is already present, the stored name and size must
    /// match exactly (`DirectoryConflict` otherwise). Absent identifiers are
    /// appended; exceeding capacity is `DirectoryFull`. Safe to call from
    /// multiple processes as long as each identifier has a single writer,
    /// which the registration protocol guarantees.
    pub fn create_or_update(&self, registration: &RegionRegistration) -> Result<()> {
        let name_bytes = registration.name.as_bytes();
        if name_bytes.len() > MAX_REGION_NAME_LEN {
            return Err(AttuneError::invalid_parameter(
                "name",
                format!(
                    "region name exceeds {} bytes: {}",
                    MAX_REGION_NAME_LEN, registration.name
                ),
            ));
        }

        if let Some(slot) = self.find_slot(registration.id) {
            let existing = slot.registration();
            let compatible = existing
                .as_ref()
                .map(|e| e.name == registration.name && e.size == registration.size)
                .unwrap_or(false);
            return if compatible {
                Ok(())
            } else {
                Err(AttuneError::DirectoryConflict {
                    kind: registration.id.kind,
                    index: registration.id.index,
                })
            };
        }

        let slot_index = self.reserved.fetch_add(1, Ordering::AcqRel) as usize;
        if slot_index >= MAX_CONFIG_REGIONS {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
            return Err(AttuneError::DirectoryFull {
                capacity: MAX_CONFIG_REGIONS,
            });
        }

        // The reserved slot is exclusively ours until the commit flag is
        // published, so the plain writes below do not race.
        let slot = &self.slots[slot_index] as *const DirectorySlot as *mut DirectorySlot;
        unsafe {
            (*slot).kind = registration.id.kind.as_raw();
            (*slot).index = registration.id.index;
            (*slot).size = registration.size;
            (*slot).name_len = name_bytes.len() as u32;
            (&mut (*slot).name)[..name_bytes.len()].copy_from_slice(name_bytes);
            (&mut (*slot).name)[name_bytes.len()..].fill(0);
        }
        self.slots[slot_index]
            .state
            .store(SLOT_COMMITTED, Ordering::Release);

        Ok(())
    }

    /// Look up a registration by identifier
    pub fn find(&self, id: RegionIdentifier) -> Option<RegionRegistration> {
        self.find_slot(id).and_then(|slot| slot.registration())
    }

    /// Number of committed registrations
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) == SLOT_COMMITTED)
            .count()
    }

    /// Whether the directory holds no registrations
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every committed registration
    pub fn registrations(&self) -> Vec<RegionRegistration> {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) == SLOT_COMMITTED)
            .filter_map(|s| s.registration())
            .collect()
    }

    fn find_slot(&self, id: RegionIdentifier) -> Option<&DirectorySlot> {
        self.slots
            .iter()
            .find(|s| s.state.load(Ordering::Acquire) == SLOT_COMMITTED && s.matches(id))
    }
}
