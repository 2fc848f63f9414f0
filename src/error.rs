//! Error types and handling for attune

use crate::region::RegionKind;

/// Result type alias for attune operations
pub type Result<T> = std::result::Result<T, AttuneError>;

/// Error types for the shared context subsystem
#[derive(Debug, thiserror::Error)]
pub enum AttuneError {
    /// OS-level resource failure (create/open/map/signal/wait)
    #[error("resource error: {message}")]
    Resource {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Header or version mismatch when opening an existing region
    #[error("incompatible region {name}: {reason}")]
    IncompatibleRegion { name: String, reason: String },

    /// Registration id collision with differing metadata
    #[error("directory conflict for region {kind:?}/{index}")]
    DirectoryConflict { kind: RegionKind, index: u32 },

    /// Shared config directory capacity exceeded
    #[error("shared config directory full: capacity {capacity}")]
    DirectoryFull { capacity: usize },

    /// A step of the ordered acquire sequence failed; partial state was rolled back
    #[error("context initialization failed at {step}")]
    Initialization {
        step: &'static str,
        #[source]
        source: Box<AttuneError>,
    },

    /// Bounded wait on a notification event elapsed
    #[error("timed out after {timeout_ms} ms")]
    WaitTimeout { timeout_ms: u64 },

    /// Invalid parameters or configuration
    #[error("invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Message encode/decode failure
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl AttuneError {
    /// Create a resource error without an underlying source
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
            source: None,
        }
    }

    /// Create a resource error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Resource {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a resource error from a nix errno
    pub fn from_errno(errno: nix::Error, context: &str) -> Self {
        Self::from_io(std::io::Error::from_raw_os_error(errno as i32), context)
    }

    /// Create an incompatible-region error
    pub fn incompatible(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IncompatibleRegion {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Wrap a step failure from the acquire sequence
    pub fn initialization(step: &'static str, source: AttuneError) -> Self {
        Self::Initialization {
            step,
            source: Box::new(source),
        }
    }
}

impl From<std::io::Error> for AttuneError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<bincode::Error> for AttuneError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("bincode error: {}", err))
    }
}
