//! Dynamic shared-config region registration
//!
//! A process that needs an additional typed configuration block creates a
//! brand-new named region, registers its identity in the global directory
//! and announces it over the control channel so the counterpart can open it
//! by index. The registry also tracks regions opened from other processes'
//! registrations, so that last-detach cleanup covers every dynamically
//! created name.

use std::time::Duration;

use crate::{
    channel::{CommChannel, ControlMessage},
    error::{AttuneError, Result},
    region::{GlobalPayload, RegionIdentifier, RegionKind, RegionRegistration, TypedRegionView},
};

/// View over one shared config region: a validated header followed by the
/// caller-defined config block, exposed as raw payload bytes
pub type SharedConfigRegion = TypedRegionView<()>;

/// Owns every shared config region this process created or opened
pub struct ConfigRegistry {
    regions: Vec<SharedConfigRegion>,
    cleanup_on_close: bool,
}

impl ConfigRegistry {
    pub(crate) fn new() -> Self {
        Self {
            regions: Vec::new(),
            cleanup_on_close: false,
        }
    }

    /// Create, register and announce a brand-new shared config region.
    ///
    /// Region creation failing aborts before any directory mutation. A
    /// failed directory update (conflict, capacity) closes and deletes the
    /// just-created region before the error returns, so no orphaned name is
    /// left behind. A failed announcement leaves the region registered and
    /// owned; the directory entry and the region stay consistent.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn publish(
        &mut self,
        global: &GlobalPayload,
        control: &mut CommChannel,
        name: &str,
        kind: RegionKind,
        index: u32,
        size: usize,
        timeout: Duration,
    ) -> Result<()> {
        let mut view = SharedConfigRegion::create_new(name, size, kind, index)?;

        let registration = RegionRegistration {
            id: RegionIdentifier::new(kind, index),
            name: name.to_string(),
            size: size as u64,
        };
        if let Err(err) = global.directory.create_or_update(&registration) {
            view.mark_cleanup();
            view.close();
            return Err(err);
        }

        tracing::debug!(name, index, size, "published shared config region");
        self.regions.push(view);

        control.send_message(&ControlMessage::RegisterRegion { index }, timeout)
    }

    /// Open a config region some process registered in the directory
    pub(crate) fn open(
        &mut self,
        global: &GlobalPayload,
        kind: RegionKind,
        index: u32,
    ) -> Result<&mut SharedConfigRegion> {
        let registration = global
            .directory
            .find(RegionIdentifier::new(kind, index))
            .ok_or_else(|| {
                AttuneError::resource(format!(
                    "no registered config region {:?}/{}",
                    kind, index
                ))
            })?;

        let view = SharedConfigRegion::open_existing(&registration.name, kind, index)?;
        self.regions.push(view);
        let last = self.regions.len() - 1;
        Ok(&mut self.regions[last])
    }

    /// Get an owned region by identity
    pub(crate) fn get_mut(
        &mut self,
        kind: RegionKind,
        index: u32,
    ) -> Option<&mut SharedConfigRegion> {
        self.regions.iter_mut().find(|r| {
            r.header().region_kind == kind.as_raw() && r.header().region_index == index
        })
    }

    /// Take ownership of directory-registered regions this process never
    /// opened, so that last-detach cleanup covers every dynamically created
    /// name. Regions whose creator already deleted them are skipped.
    pub(crate) fn adopt_for_cleanup(&mut self, registrations: Vec<RegionRegistration>) {
        for registration in registrations {
            if self.regions.iter().any(|r| r.name() == registration.name) {
                continue;
            }
            match SharedConfigRegion::open_existing(
                &registration.name,
                registration.id.kind,
                registration.id.index,
            ) {
                Ok(view) => self.regions.push(view),
                Err(err) => {
                    tracing::warn!(name = %registration.name, error = %err,
                        "could not adopt registered region for cleanup");
                }
            }
        }
    }

    /// Number of regions this registry owns
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Inherit the owning context's last-holder cleanup decision
    pub(crate) fn mark_cleanup(&mut self) {
        self.cleanup_on_close = true;
    }

    /// Close every owned region, deleting the OS-global names if the owning
    /// context escalated cleanup
    pub(crate) fn close(&mut self) {
        for region in &mut self.regions {
            if self.cleanup_on_close {
                region.mark_cleanup();
            }
            region.close();
        }
    }
}
