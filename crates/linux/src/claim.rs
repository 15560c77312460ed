//! Registry membership of one driver-owned handle

use std::sync::Arc;

use hal_runtime::{ResourceId, ResourceKind, ResourceRegistry};

/// A resource registered by a driver on successful init.
///
/// Registration marks the resource in use. Dropping the claim clears the
/// flag, releases the driver's reference and unregisters the resource.
pub(crate) struct ResourceClaim {
    registry: Arc<ResourceRegistry>,
    id: ResourceId,
}

impl ResourceClaim {
    pub(crate) fn register(
        registry: &Arc<ResourceRegistry>,
        kind: ResourceKind,
        name: impl Into<String>,
        handle: u64,
    ) -> Self {
        let id = registry.register_resource(kind, name, handle);
        registry.set_in_use(id, true);
        Self { registry: Arc::clone(registry), id }
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }
}

impl Drop for ResourceClaim {
    fn drop(&mut self) {
        self.registry.set_in_use(self.id, false);
        self.registry.release(self.id);
        if !self.registry.unregister_resource(self.id) {
            // Someone else still holds a reference (e.g. a ResourceGuard)
            tracing::debug!(resource_id = self.id, "resource still referenced at teardown");
        }
    }
}
