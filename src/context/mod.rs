//! The live inter-process context
//!
//! A [`SharedContext`] is built by consuming a successfully initialized
//! [`ContextInitializer`]. It owns the global region view, both channels,
//! the target-ready event and the config registry. Its teardown is the
//! linchpin of crash-safety: decrement the attach counter, and only if the
//! pre-decrement value was 1 escalate cleanup to every owned resource. The
//! rule only ever reasons about "was I the last", never "am I special".

pub mod config;
pub mod initializer;

pub use config::ContextConfig;
pub use initializer::ContextInitializer;

use std::ptr::NonNull;
use std::time::Duration;

use crate::{
    channel::{CommChannel, ControlMessage},
    error::Result,
    platform::NamedSyncEvent,
    region::{ConfigDirectory, GlobalPayload, RegionKind, TypedRegionView},
    registry::{ConfigRegistry, SharedConfigRegion},
};

/// The live, attached communication context
pub struct SharedContext {
    config: ContextConfig,
    global: TypedRegionView<GlobalPayload>,
    control: CommChannel,
    feedback: CommChannel,
    ready_event: NamedSyncEvent,
    registry: ConfigRegistry,
}

impl SharedContext {
    /// Consume a successful initializer into a live context.
    ///
    /// Pure ownership transfer and channel composition; no OS calls occur.
    pub fn new(initializer: ContextInitializer) -> Result<Self> {
        let (config, resources) = initializer.consume();
        let resources = match resources {
            Some(resources) => resources,
            None => unreachable!("initializer resources already consumed"),
        };
        let initializer::ContextResources {
            global,
            control_region,
            feedback_region,
            control_event,
            feedback_event,
            ready_event,
        } = resources;

        // The sync states live inside the global mapping, which stays at a
        // stable address for as long as the view is open.
        let control_sync = NonNull::from(&global.payload().control_sync);
        let feedback_sync = NonNull::from(&global.payload().feedback_sync);

        // Channel composition cannot fail with a validated config
        // (power-of-two region sizes); if it ever does, stay honest about
        // the attach count. The remaining resources release locally on drop.
        let control =
            match unsafe { CommChannel::new(control_sync, control_region, control_event) } {
                Ok(channel) => channel,
                Err(err) => {
                    global.payload().detach();
                    return Err(err);
                }
            };
        let feedback =
            match unsafe { CommChannel::new(feedback_sync, feedback_region, feedback_event) } {
                Ok(channel) => channel,
                Err(err) => {
                    global.payload().detach();
                    return Err(err);
                }
            };

        Ok(Self {
            config,
            global,
            control,
            feedback,
            ready_event,
            registry: ConfigRegistry::new(),
        })
    }

    /// Initialize and attach under the default configuration
    pub fn attach() -> Result<Self> {
        Self::new(ContextInitializer::initialize()?)
    }

    /// Initialize and attach under `config`
    pub fn attach_with_config(config: ContextConfig) -> Result<Self> {
        Self::new(ContextInitializer::with_config(config)?)
    }

    /// The configuration this context was built with
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Number of processes currently attached to the context
    pub fn attached_processes(&self) -> u32 {
        self.global.payload().attached()
    }

    /// The shared-config directory in the global region
    pub fn directory(&self) -> &ConfigDirectory {
        &self.global.payload().directory
    }

    /// Send a message over the control channel
    pub fn send_control_message(&mut self, msg: &ControlMessage) -> Result<()> {
        self.control.send_message(msg, self.config.io_timeout)
    }

    /// Receive the next control message, waiting up to `timeout`
    pub fn recv_control_message(&mut self, timeout: Duration) -> Result<ControlMessage> {
        self.control.recv_message(timeout)
    }

    /// Receive a control message if one is already queued
    pub fn try_recv_control_message(&mut self) -> Result<Option<ControlMessage>> {
        match self.control.try_recv()? {
            Some(frame) => Ok(Some(ControlMessage::decode(&frame)?)),
            None => Ok(None),
        }
    }

    /// Send an opaque frame over the feedback channel
    pub fn send_feedback(&mut self, frame: &[u8]) -> Result<()> {
        self.feedback.send(frame, self.config.io_timeout)
    }

    /// Receive the next feedback frame, waiting up to `timeout`
    pub fn recv_feedback(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.feedback.recv(timeout)
    }

    /// Wait until some process has signaled the target-ready event
    pub fn wait_for_peer(&self, timeout: Duration) -> Result<()> {
        self.ready_event.wait(timeout)
    }

    /// Create a brand-new shared config region, register it in the directory
    /// and announce it over the control channel
    pub fn publish_region(&mut self, kind: RegionKind, index: u32, size: usize) -> Result<()> {
        let name = self.config.config_region_name(index);
        self.registry.publish(
            self.global.payload(),
            &mut self.control,
            &name,
            kind,
            index,
            size,
            self.config.io_timeout,
        )
    }

    /// Open a config region that some process registered in the directory
    pub fn open_registered_region(
        &mut self,
        kind: RegionKind,
        index: u32,
    ) -> Result<&mut SharedConfigRegion> {
        self.registry.open(self.global.payload(), kind, index)
    }

    /// Get a config region this context already published or opened
    pub fn config_region_mut(
        &mut self,
        kind: RegionKind,
        index: u32,
    ) -> Option<&mut SharedConfigRegion> {
        self.registry.get_mut(kind, index)
    }
}

impl Drop for SharedContext {
    fn drop(&mut self) {
        let prev = self.global.payload().detach();
        if prev == 1 {
            // Last attached process: every OS-global name this context knows
            // about gets deleted exactly once, here. Config regions other
            // processes published are adopted first so they are covered too.
            tracing::debug!(prefix = %self.config.prefix, "last detach; deleting context resources");
            self.registry
                .adopt_for_cleanup(self.global.payload().directory.registrations());
            self.global.mark_cleanup();
            self.control.mark_cleanup();
            self.feedback.mark_cleanup();
            self.ready_event.mark_cleanup();
            self.registry.mark_cleanup();
        }

        self.registry.close();
        self.ready_event.close();
        self.control.close();
        self.feedback.close();
        // The channels hold pointers into the global mapping; it goes last.
        self.global.close();
    }
}
