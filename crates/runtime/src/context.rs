//! Shared services handed to every driver

use std::sync::Arc;

use hal_platform::HalConfig;

use crate::{CallbackDispatcher, ResourceRegistry};

/// Composition root: the registry, the dispatcher and the configuration.
///
/// Built once by the application and cloned into each driver. Tests build a
/// fresh context per case for isolation.
#[derive(Debug, Clone, Default)]
pub struct HalContext {
    /// Resource catalog
    pub registry: Arc<ResourceRegistry>,
    /// GPIO and timer handler tables
    pub dispatcher: Arc<CallbackDispatcher>,
    /// Kernel roots and timing
    pub config: Arc<HalConfig>,
}

impl HalContext {
    /// Fresh registry and dispatcher around `config`.
    pub fn new(config: HalConfig) -> Self {
        Self {
            registry: Arc::new(ResourceRegistry::new()),
            dispatcher: Arc::new(CallbackDispatcher::new()),
            config: Arc::new(config),
        }
    }

    /// Same services with a different configuration.
    pub fn with_config(&self, config: HalConfig) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            config: Arc::new(config),
        }
    }
}
