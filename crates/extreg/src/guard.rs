//! Device guard registry: one polymorphic device/stream/event lifecycle
//! implementation per slot, plus the RAII scope guard the host runtime uses
//! to switch devices and restore them on scope exit.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::RegistryError;
use crate::slot::{DeviceIndex, EventId, Slot, StreamId};

/// Device, stream, and event lifecycle operations for one slot's backend.
///
/// The implementation is stateless from the registry's point of view and
/// operates on caller-supplied device/stream/event values. Every operation is
/// synchronous; backend-side asynchrony hides behind the blocking semantics
/// of [`DeviceGuardImpl::synchronize_event`].
pub trait DeviceGuardImpl: Send + Sync {
    fn device_count(&self) -> DeviceIndex;

    fn current_device(&self) -> DeviceIndex;

    /// Makes `device` active and returns the previously active device so the
    /// caller can restore it. Save/restore, not a one-way set.
    fn exchange_device(&self, device: DeviceIndex) -> DeviceIndex;

    fn current_stream(&self, device: DeviceIndex) -> StreamId;

    /// Makes `stream` current on its device, returning the previous one.
    fn exchange_stream(&self, device: DeviceIndex, stream: StreamId) -> StreamId;

    fn create_event(&self) -> EventId;

    fn record_event(&self, event: EventId, stream: StreamId);

    /// Whether all work captured by the event has completed.
    fn query_event(&self, event: EventId) -> bool;

    /// Blocks until the event's captured work completes.
    fn synchronize_event(&self, event: EventId);

    fn destroy_event(&self, event: EventId);
}

pub struct GuardRegistry {
    guards: RwLock<HashMap<Slot, Arc<dyn DeviceGuardImpl>>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self {
            guards: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        slot: Slot,
        guard: Arc<dyn DeviceGuardImpl>,
    ) -> Result<(), RegistryError> {
        let mut guards = self.guards.write().unwrap();
        if guards.contains_key(&slot) {
            return Err(RegistryError::duplicate("device guard", format!("'{slot}'")));
        }
        guards.insert(slot, guard);
        Ok(())
    }

    pub fn is_registered(&self, slot: Slot) -> bool {
        self.guards.read().unwrap().contains_key(&slot)
    }

    pub fn guard_for(&self, slot: Slot) -> Result<Arc<dyn DeviceGuardImpl>, RegistryError> {
        self.guards
            .read()
            .unwrap()
            .get(&slot)
            .cloned()
            .ok_or_else(|| RegistryError::unbound("device guard", slot))
    }

    /// Switches the slot's active device for the current scope.
    pub fn scoped_device(
        &self,
        slot: Slot,
        device: DeviceIndex,
    ) -> Result<DeviceGuard, RegistryError> {
        let guard = self.guard_for(slot)?;
        let previous = guard.exchange_device(device);
        Ok(DeviceGuard {
            inner: guard,
            previous,
        })
    }
}

impl Default for GuardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII scope object: exchanges the active device on construction and
/// restores the previous one on drop.
pub struct DeviceGuard {
    inner: Arc<dyn DeviceGuardImpl>,
    previous: DeviceIndex,
}

impl DeviceGuard {
    pub fn previous_device(&self) -> DeviceIndex {
        self.previous
    }

    pub fn current_device(&self) -> DeviceIndex {
        self.inner.current_device()
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.inner.exchange_device(self.previous);
    }
}

static GLOBAL: OnceLock<GuardRegistry> = OnceLock::new();

/// Process-wide device guard table.
pub fn global() -> &'static GuardRegistry {
    GLOBAL.get_or_init(GuardRegistry::new)
}

pub fn register_guard(slot: Slot, guard: Arc<dyn DeviceGuardImpl>) -> Result<(), RegistryError> {
    global().register(slot, guard)
}

pub fn guard_for(slot: Slot) -> Result<Arc<dyn DeviceGuardImpl>, RegistryError> {
    global().guard_for(slot)
}

pub fn scoped_device(slot: Slot, device: DeviceIndex) -> Result<DeviceGuard, RegistryError> {
    global().scoped_device(slot, device)
}
