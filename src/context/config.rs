//! Context configuration and OS-global name derivation
//!
//! Every cooperating process must construct its context with the same
//! prefix; all six fixed names plus the per-index config region names are
//! derived from it.

use std::time::Duration;

use crate::{
    error::{AttuneError, Result},
    region::{GlobalPayload, TypedRegionView},
};

/// Configuration for establishing a shared context
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Prefix for every OS-global name in this context
    pub prefix: String,
    /// Size in bytes of each of the three primary regions
    pub region_size: usize,
    /// Bound applied to event waits and channel operations
    pub io_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            prefix: crate::config::DEFAULT_CONTEXT_NAME.to_string(),
            region_size: crate::config::CONTEXT_REGION_SIZE,
            io_timeout: Duration::from_millis(crate::config::DEFAULT_IO_TIMEOUT_MS),
        }
    }
}

impl ContextConfig {
    /// Create a configuration with a custom name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Set the primary region size
    pub fn with_region_size(mut self, size: usize) -> Self {
        self.region_size = size;
        self
    }

    /// Set the bound for event waits and channel operations
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() || self.prefix.contains('/') {
            return Err(AttuneError::invalid_parameter(
                "prefix",
                "context prefix must be non-empty and contain no '/'",
            ));
        }
        if !self.region_size.is_power_of_two() {
            return Err(AttuneError::invalid_parameter(
                "region_size",
                "region size must be a power of two",
            ));
        }
        if self.region_size < TypedRegionView::<GlobalPayload>::required_size() {
            return Err(AttuneError::invalid_parameter(
                "region_size",
                format!(
                    "region size {} too small for global payload (need {})",
                    self.region_size,
                    TypedRegionView::<GlobalPayload>::required_size()
                ),
            ));
        }
        Ok(())
    }

    /// Name of the global context region
    pub fn global_region_name(&self) -> String {
        format!("/{}.global", self.prefix)
    }

    /// Name of the control channel backing region
    pub fn control_region_name(&self) -> String {
        format!("/{}.control", self.prefix)
    }

    /// Name of the feedback channel backing region
    pub fn feedback_region_name(&self) -> String {
        format!("/{}.feedback", self.prefix)
    }

    /// Name of the control channel notification event
    pub fn control_event_name(&self) -> String {
        format!("/{}.control.event", self.prefix)
    }

    /// Name of the feedback channel notification event
    pub fn feedback_event_name(&self) -> String {
        format!("/{}.feedback.event", self.prefix)
    }

    /// Name of the target-process-ready event
    pub fn ready_event_name(&self) -> String {
        format!("/{}.ready", self.prefix)
    }

    /// Name synthesized for a published config region
    pub fn config_region_name(&self, index: u32) -> String {
        format!("/{}.config.{}", self.prefix, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = ContextConfig::default();
        assert_eq!(config.global_region_name(), "/attune.global");
        assert_eq!(config.control_event_name(), "/attune.control.event");
        assert_eq!(config.config_region_name(7), "/attune.config.7");
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(ContextConfig::new("").validate().is_err());
        assert!(ContextConfig::new("a/b").validate().is_err());
        assert!(ContextConfig::new("ok")
            .with_region_size(65537)
            .validate()
            .is_err());
        assert!(ContextConfig::new("ok")
            .with_region_size(1024)
            .validate()
            .is_err());
    }
}
