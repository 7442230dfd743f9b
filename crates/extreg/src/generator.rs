//! Generator factory registry: one random-number-generator factory per slot.
//!
//! The factory is a singleton per slot. Every `create` call invokes it
//! exactly once and hands the caller exclusive ownership of fresh generator
//! state. Mutation goes through `&mut self`, so the single-writer discipline
//! is enforced by the type system; `current_seed` takes `&self` and stays
//! safe to read from several threads at once.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::RegistryError;
use crate::slot::{DeviceIndex, Slot};

/// Backend-specific random number generator state.
///
/// `Sync` so a shared handle supports concurrent seed reads; every mutating
/// operation still requires `&mut self`.
pub trait Generator: Send + Sync {
    fn device_index(&self) -> DeviceIndex;

    /// Seed currently driving the stream. Shared read access.
    fn current_seed(&self) -> u64;

    /// Reseeds and restarts the stream.
    fn set_seed(&mut self, seed: u64);

    fn next_u64(&mut self) -> u64;

    /// Captures the full generator state as an opaque byte blob.
    fn state(&self) -> Vec<u8>;

    /// Restores a blob previously produced by [`Generator::state`].
    fn set_state(&mut self, state: &[u8]) -> Result<(), RegistryError>;
}

pub type GeneratorHandle = Box<dyn Generator>;

/// Produces a fresh generator for one device ordinal.
pub type GeneratorFactory = Arc<dyn Fn(DeviceIndex) -> GeneratorHandle + Send + Sync>;

pub struct GeneratorRegistry {
    factories: RwLock<HashMap<Slot, GeneratorFactory>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, slot: Slot, factory: GeneratorFactory) -> Result<(), RegistryError> {
        let mut factories = self.factories.write().unwrap();
        if factories.contains_key(&slot) {
            return Err(RegistryError::duplicate(
                "generator factory",
                format!("'{slot}'"),
            ));
        }
        factories.insert(slot, factory);
        Ok(())
    }

    pub fn is_registered(&self, slot: Slot) -> bool {
        self.factories.read().unwrap().contains_key(&slot)
    }

    /// Invokes the slot's factory exactly once, returning fresh exclusive
    /// generator state.
    pub fn create(
        &self,
        slot: Slot,
        device_index: DeviceIndex,
    ) -> Result<GeneratorHandle, RegistryError> {
        let factory = {
            let factories = self.factories.read().unwrap();
            factories
                .get(&slot)
                .cloned()
                .ok_or_else(|| RegistryError::unbound("generator factory", slot))?
        };
        Ok(factory(device_index))
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<GeneratorRegistry> = OnceLock::new();

/// Process-wide generator factory table.
pub fn global() -> &'static GeneratorRegistry {
    GLOBAL.get_or_init(GeneratorRegistry::new)
}

pub fn register_factory(slot: Slot, factory: GeneratorFactory) -> Result<(), RegistryError> {
    global().register(slot, factory)
}

pub fn create(slot: Slot, device_index: DeviceIndex) -> Result<GeneratorHandle, RegistryError> {
    global().create(slot, device_index)
}
