//! OS-backed named resources: shared memory regions and notification events

pub mod event;
pub mod futex;
pub mod shm;

pub use event::NamedSyncEvent;
pub use shm::NamedSharedRegion;
