//! Ordered acquisition of the context's OS resources with full rollback
//!
//! The acquire sequence runs strictly in order; the first failure aborts it
//! and every resource acquired so far is closed in reverse order. If this
//! process turned out to be the only attached one, everything it acquired is
//! also deleted, since no other process can be relying on it. A failed
//! initialization leaves the system exactly as if it had never been
//! attempted, modulo the honest counter decrement.

use crate::{
    error::{AttuneError, Result},
    platform::{NamedSharedRegion, NamedSyncEvent},
    region::{GlobalPayload, RegionKind, TypedRegionView},
};

use super::ContextConfig;

/// The six open resources of an initialized context. Moved as a unit into
/// the live context; detached and closed as a unit otherwise.
#[derive(Debug)]
pub(crate) struct ContextResources {
    pub(crate) global: TypedRegionView<GlobalPayload>,
    pub(crate) control_region: NamedSharedRegion,
    pub(crate) feedback_region: NamedSharedRegion,
    pub(crate) control_event: NamedSyncEvent,
    pub(crate) feedback_event: NamedSyncEvent,
    pub(crate) ready_event: NamedSyncEvent,
}

impl ContextResources {
    /// Detach and close everything, applying the last-holder deletion rule
    fn teardown(mut self) {
        let prev = self.global.payload().detach();
        if prev == 1 {
            tracing::debug!("last detach during teardown; deleting context resources");
            self.global.mark_cleanup();
            self.control_region.mark_cleanup();
            self.feedback_region.mark_cleanup();
            self.control_event.mark_cleanup();
            self.feedback_event.mark_cleanup();
            self.ready_event.mark_cleanup();
        }

        self.ready_event.close();
        self.feedback_event.close();
        self.control_event.close();
        self.feedback_region.close();
        self.control_region.close();
        self.global.close();
    }
}

/// A fully acquired bundle of the context's OS resources, ready to be
/// consumed into a [`SharedContext`](super::SharedContext) by move.
///
/// Dropping an unconsumed initializer detaches honestly: the counter is
/// decremented and the resources closed under the same last-holder rule the
/// live context applies.
#[derive(Debug)]
pub struct ContextInitializer {
    config: ContextConfig,
    resources: Option<ContextResources>,
}

impl ContextInitializer {
    /// Acquire the context resources under the default configuration
    pub fn initialize() -> Result<Self> {
        Self::with_config(ContextConfig::default())
    }

    /// Acquire the context resources under `config`.
    ///
    /// On success this process is counted in the global attach counter and
    /// the target-ready event has been signaled. On failure every partially
    /// acquired resource has been rolled back and the counter decremented.
    pub fn with_config(config: ContextConfig) -> Result<Self> {
        config.validate()?;

        let mut partial = PartialContext::new();
        if let Err(err) = partial.acquire(&config) {
            let step = partial.step;
            partial.rollback();
            return Err(AttuneError::initialization(step, err));
        }
        Ok(Self {
            config,
            resources: Some(partial.into_resources()),
        })
    }

    /// Hand the resources to the live context; the initializer is left
    /// empty and performs no teardown when dropped.
    pub(crate) fn consume(mut self) -> (ContextConfig, Option<ContextResources>) {
        let resources = self.resources.take();
        (self.config.clone(), resources)
    }

    fn resources(&self) -> &ContextResources {
        match &self.resources {
            Some(resources) => resources,
            None => unreachable!("initializer resources already consumed"),
        }
    }

    /// Current attach count, including this process
    pub fn attached_processes(&self) -> u32 {
        self.resources().global.payload().attached()
    }

    /// Whether this process performed first-writer initialization of the
    /// global region
    pub fn global_created(&self) -> bool {
        self.resources().global.created()
    }

    /// Whether this process created the control channel backing region
    pub fn control_region_created(&self) -> bool {
        self.resources().control_region.created()
    }

    /// Whether this process created the feedback channel backing region
    pub fn feedback_region_created(&self) -> bool {
        self.resources().feedback_region.created()
    }

    /// Whether this process created the control channel event
    pub fn control_event_created(&self) -> bool {
        self.resources().control_event.created()
    }

    /// Whether this process created the feedback channel event
    pub fn feedback_event_created(&self) -> bool {
        self.resources().feedback_event.created()
    }

    /// Whether this process created the target-ready event
    pub fn ready_event_created(&self) -> bool {
        self.resources().ready_event.created()
    }
}

impl Drop for ContextInitializer {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            tracing::debug!("context initializer dropped unconsumed; detaching");
            resources.teardown();
        }
    }
}

/// Tracks which resources the acquire sequence has reached, so rollback can
/// close exactly those and nothing else.
struct PartialContext {
    step: &'static str,
    global: Option<TypedRegionView<GlobalPayload>>,
    control_region: Option<NamedSharedRegion>,
    feedback_region: Option<NamedSharedRegion>,
    control_event: Option<NamedSyncEvent>,
    feedback_event: Option<NamedSyncEvent>,
    ready_event: Option<NamedSyncEvent>,
}

impl PartialContext {
    fn new() -> Self {
        Self {
            step: "configuration",
            global: None,
            control_region: None,
            feedback_region: None,
            control_event: None,
            feedback_event: None,
            ready_event: None,
        }
    }

    fn acquire(&mut self, config: &ContextConfig) -> Result<()> {
        self.step = "global region";
        let (global, _created) = TypedRegionView::<GlobalPayload>::create_or_open(
            &config.global_region_name(),
            config.region_size,
            RegionKind::Global,
            0,
        )?;
        // Count this process from the moment the global region is open; the
        // matching decrement runs in rollback or context teardown.
        let attached = global.payload().attach();
        tracing::debug!(attached, "attached to global region");
        self.global = Some(global);

        self.step = "control channel region";
        let (region, _) =
            NamedSharedRegion::create_or_open(&config.control_region_name(), config.region_size)?;
        self.control_region = Some(region);

        self.step = "feedback channel region";
        let (region, _) =
            NamedSharedRegion::create_or_open(&config.feedback_region_name(), config.region_size)?;
        self.feedback_region = Some(region);

        self.step = "control channel event";
        let (event, _) = NamedSyncEvent::create_or_open(&config.control_event_name())?;
        self.control_event = Some(event);

        self.step = "feedback channel event";
        let (event, _) = NamedSyncEvent::create_or_open(&config.feedback_event_name())?;
        self.feedback_event = Some(event);

        self.step = "ready event";
        let (event, _) = NamedSyncEvent::create_or_open(&config.ready_event_name())?;
        self.ready_event = Some(event);

        self.step = "ready signal";
        if let Some(event) = &self.ready_event {
            event.signal()?;
        }

        Ok(())
    }

    fn rollback(mut self) {
        let mut cleanup = false;
        if let Some(global) = &self.global {
            // Pre-decrement value of 1 means no other process is attached,
            // so every name acquired so far can be deleted.
            let prev = global.payload().detach();
            if prev == 1 {
                cleanup = true;
            }
        }
        tracing::debug!(
            step = self.step,
            cleanup,
            "rolling back context initialization"
        );

        // Reverse acquisition order; resources never reached are None.
        if let Some(mut event) = self.ready_event.take() {
            if cleanup {
                event.mark_cleanup();
            }
            event.close();
        }
        if let Some(mut event) = self.feedback_event.take() {
            if cleanup {
                event.mark_cleanup();
            }
            event.close();
        }
        if let Some(mut event) = self.control_event.take() {
            if cleanup {
                event.mark_cleanup();
            }
            event.close();
        }
        if let Some(mut region) = self.feedback_region.take() {
            if cleanup {
                region.mark_cleanup();
            }
            region.close();
        }
        if let Some(mut region) = self.control_region.take() {
            if cleanup {
                region.mark_cleanup();
            }
            region.close();
        }
        if let Some(mut global) = self.global.take() {
            if cleanup {
                global.mark_cleanup();
            }
            global.close();
        }
    }

    fn into_resources(self) -> ContextResources {
        match (
            self.global,
            self.control_region,
            self.feedback_region,
            self.control_event,
            self.feedback_event,
            self.ready_event,
        ) {
            (
                Some(global),
                Some(control_region),
                Some(feedback_region),
                Some(control_event),
                Some(feedback_event),
                Some(ready_event),
            ) => ContextResources {
                global,
                control_region,
                feedback_region,
                control_event,
                feedback_event,
                ready_event,
            },
            _ => unreachable!("into_resources called before acquire completed"),
        }
    }
}
