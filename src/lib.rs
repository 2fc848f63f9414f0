//! # Attune - Shared-Memory Inter-Process Context
//!
//! Attune lets multiple independent OS processes share a set of named,
//! OS-backed memory regions and synchronization objects, forming a single
//! logical communication context: a control channel, a feedback channel and
//! a dynamically growable registry of additional typed config regions.
//!
//! ## Features
//!
//! - **Named shared memory regions**: POSIX shm with exclusive-create and
//!   create-or-open semantics
//! - **Named notification events**: futex-backed cross-process signals with
//!   bounded waits
//! - **Crash-tolerant lifecycle**: resources are created-or-opened
//!   idempotently by whichever process gets there first and deleted exactly
//!   once by whichever process is last to detach
//! - **Full rollback**: a failed initialization closes every partially
//!   acquired resource in reverse order and restores the attach counter
//! - **Dynamic config regions**: append-only shared directory plus control
//!   channel announcements let counterpart processes discover new regions
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 SharedContext                    │
//! ├─────────────────────────────────────────────────┤
//! │  Global Region           │  Channel Regions      │
//! │  - attach counter        │  - control ring       │
//! │  - channel sync states   │  - feedback ring      │
//! │  - config directory      │  + notification events│
//! └─────────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌─────────────────┐    ┌─────────────────────────┐
//! │ ConfigRegistry  │    │  ContextInitializer      │
//! │ (publish/open)  │    │  (ordered acquire +      │
//! │                 │    │   reverse rollback)      │
//! └─────────────────┘    └─────────────────────────┘
//! ```

// Core modules
pub mod channel;
pub mod context;
pub mod error;
pub mod platform;
pub mod region;
pub mod registry;

// Main API re-exports
pub use channel::{CommChannel, ControlMessage};
pub use context::{ContextConfig, ContextInitializer, SharedContext};
pub use error::{AttuneError, Result};
pub use platform::{NamedSharedRegion, NamedSyncEvent};
pub use region::{
    ConfigDirectory, GlobalPayload, RegionHeader, RegionIdentifier, RegionKind,
    RegionRegistration, TypedRegionView,
};
pub use registry::{ConfigRegistry, SharedConfigRegion};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod config {
    /// Default context name prefix
    pub const DEFAULT_CONTEXT_NAME: &str = "attune";

    /// Size of each primary shared region (64KB)
    pub const CONTEXT_REGION_SIZE: usize = 64 * 1024;

    /// Default bound for event waits and channel operations
    pub const DEFAULT_IO_TIMEOUT_MS: u64 = 5000;
}
