//! Typed view over a named shared region

use std::marker::PhantomData;
use std::mem::size_of;

use crate::{
    error::{AttuneError, Result},
    platform::NamedSharedRegion,
};

use super::{RegionHeader, RegionKind};

/// Interprets a [`NamedSharedRegion`] as a [`RegionHeader`] followed by a
/// typed payload.
///
/// When the backing segment was created by this process, the buffer is
/// zeroed and the header written (first-writer initialization); when it was
/// opened, the header is validated instead. `T` must be `#[repr(C)]` with
/// all-zeroes a valid bit pattern, since that is the state a freshly created
/// segment presents to the first writer.
pub struct TypedRegionView<T> {
    region: NamedSharedRegion,
    header: *mut RegionHeader,
    payload: *mut T,
    _marker: PhantomData<T>,
}

// The view only hands out shared references to payload state whose
// cross-process mutation goes through atomics.
unsafe impl<T: Send> Send for TypedRegionView<T> {}

impl<T> std::fmt::Debug for TypedRegionView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedRegionView")
            .field("region", &self.region)
            .field("header", &self.header)
            .field("payload", &self.payload)
            .finish()
    }
}

impl<T> TypedRegionView<T> {
    /// Minimum backing-region size for this payload type
    pub fn required_size() -> usize {
        size_of::<RegionHeader>() + size_of::<T>()
    }

    /// Create the region, or open and validate it if it already exists.
    ///
    /// Returns whether this process performed first-writer initialization.
    pub fn create_or_open(
        name: &str,
        size: usize,
        kind: RegionKind,
        index: u32,
    ) -> Result<(Self, bool)> {
        let (region, created) = NamedSharedRegion::create_or_open(name, size)?;
        let view = Self::wrap(region, kind, index)?;
        Ok((view, created))
    }

    /// Create the region, failing if the name already exists
    pub fn create_new(name: &str, size: usize, kind: RegionKind, index: u32) -> Result<Self> {
        let region = NamedSharedRegion::create_new(name, size)?;
        Self::wrap(region, kind, index)
    }

    /// Open and validate a region some other process already created
    pub fn open_existing(name: &str, kind: RegionKind, index: u32) -> Result<Self> {
        let region = NamedSharedRegion::open_existing(name)?;
        Self::wrap(region, kind, index)
    }

    fn wrap(mut region: NamedSharedRegion, kind: RegionKind, index: u32) -> Result<Self> {
        match Self::init_or_validate(&mut region, kind, index) {
            Ok((header, payload)) => Ok(Self {
                region,
                header,
                payload,
                _marker: PhantomData,
            }),
            Err(err) => {
                // A segment we created but failed to initialize is useless to
                // everyone; delete it. A pre-existing segment that failed
                // validation belongs to someone else and is left alone.
                if region.created() {
                    region.mark_cleanup();
                }
                region.close();
                Err(err)
            }
        }
    }

    fn init_or_validate(
        region: &mut NamedSharedRegion,
        kind: RegionKind,
        index: u32,
    ) -> Result<(*mut RegionHeader, *mut T)> {
        if region.size() < Self::required_size() {
            return Err(AttuneError::incompatible(
                region.name(),
                format!(
                    "region too small: {} bytes, need at least {}",
                    region.size(),
                    Self::required_size()
                ),
            ));
        }

        let base = unsafe { region.as_mut_ptr_unchecked::<u8>() };
        let header = base as *mut RegionHeader;
        let payload = unsafe { base.add(size_of::<RegionHeader>()) as *mut T };

        if region.created() {
            region.as_mut_slice().fill(0);
            unsafe {
                std::ptr::write(header, RegionHeader::new(kind, index));
            }
        } else {
            unsafe {
                (*header).validate(region.name(), kind, index)?;
            }
        }

        Ok((header, payload))
    }

    /// Get the region header
    pub fn header(&self) -> &RegionHeader {
        unsafe { &*self.header }
    }

    /// Get the typed payload
    pub fn payload(&self) -> &T {
        unsafe { &*self.payload }
    }

    /// Payload area as raw bytes (everything after the header)
    pub fn payload_bytes(&self) -> &[u8] {
        &self.region.as_slice()[size_of::<RegionHeader>()..]
    }

    /// Payload area as mutable raw bytes
    pub fn payload_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.region.as_mut_slice()[size_of::<RegionHeader>()..]
    }

    /// Get the OS-global name of the backing region
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Whether this view performed first-writer initialization
    pub fn created(&self) -> bool {
        self.region.created()
    }

    /// Whether closing will also delete the OS-global name
    pub fn cleanup_on_close(&self) -> bool {
        self.region.cleanup_on_close()
    }

    /// Request deletion of the OS-global name when this view is closed
    pub fn mark_cleanup(&mut self) {
        self.region.mark_cleanup();
    }

    /// Close the backing region; delete the OS-global name if marked
    pub fn close(&mut self) {
        self.region.close();
    }
}
