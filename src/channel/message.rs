//! Control channel message codec

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Messages carried over the control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// A new shared config region was registered in the directory; the
    /// counterpart derives the region name from the index and opens it
    RegisterRegion { index: u32 },
    /// Ask the counterpart's reader loop to stop
    Terminate,
}

impl ControlMessage {
    /// Encode for transmission over the channel
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a frame received from the channel
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
