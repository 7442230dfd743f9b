//! Autograd override registry: backend-supplied forward/backward pairs that
//! the host autograd engine consults before generic differentiation.
//!
//! This table lives in a separate namespace from the dispatch registry even
//! though it is keyed by the same signatures: the host's autograd layer
//! resolves here first, and an entry means "trust this pair wholesale, do not
//! auto-differentiate the dispatch forward." There is no fallback concept;
//! absence simply hands the operator back to the generic engine.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::dispatch::KernelFn;
use crate::error::RegistryError;
use crate::signature::OpSignature;
use crate::slot::Slot;

/// Backend-supplied forward and backward implementations for one operator.
#[derive(Clone)]
pub struct AutogradPair {
    pub forward: KernelFn,
    pub backward: KernelFn,
}

pub struct AutogradRegistry {
    overrides: RwLock<HashMap<(Slot, OpSignature), AutogradPair>>,
}

impl AutogradRegistry {
    pub fn new() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        slot: Slot,
        signature: OpSignature,
        pair: AutogradPair,
    ) -> Result<(), RegistryError> {
        let mut overrides = self.overrides.write().unwrap();
        let key = (slot, signature);
        if overrides.contains_key(&key) {
            return Err(RegistryError::duplicate(
                "autograd",
                format!("{} on '{}'", key.1, slot),
            ));
        }
        overrides.insert(key, pair);
        Ok(())
    }

    /// `None` means the generic autograd engine should differentiate the
    /// dispatch-registered forward itself.
    pub fn resolve(&self, slot: Slot, signature: &OpSignature) -> Option<AutogradPair> {
        self.overrides
            .read()
            .unwrap()
            .get(&(slot, signature.clone()))
            .cloned()
    }

    pub fn has_override(&self, slot: Slot, signature: &OpSignature) -> bool {
        self.overrides
            .read()
            .unwrap()
            .contains_key(&(slot, signature.clone()))
    }
}

impl Default for AutogradRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<AutogradRegistry> = OnceLock::new();

/// Process-wide autograd override table.
pub fn global() -> &'static AutogradRegistry {
    GLOBAL.get_or_init(AutogradRegistry::new)
}

pub fn register_autograd(
    slot: Slot,
    signature: impl Into<OpSignature>,
    forward: KernelFn,
    backward: KernelFn,
) -> Result<(), RegistryError> {
    global().register(slot, signature.into(), AutogradPair { forward, backward })
}

pub fn resolve(slot: Slot, signature: &OpSignature) -> Option<AutogradPair> {
    global().resolve(slot, signature)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dispatch::KernelCall;

    fn noop_kernel() -> KernelFn {
        Arc::new(|_call: &KernelCall<'_>| Ok(Vec::new()))
    }

    #[test]
    fn duplicate_override_is_rejected() {
        let registry = AutogradRegistry::new();
        let pair = AutogradPair {
            forward: noop_kernel(),
            backward: noop_kernel(),
        };
        registry
            .register(Slot::PrivateUse1, "mul.Tensor".into(), pair.clone())
            .unwrap();
        let err = registry
            .register(Slot::PrivateUse1, "mul.Tensor".into(), pair)
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn absence_defers_to_generic_engine() {
        let registry = AutogradRegistry::new();
        assert!(registry
            .resolve(Slot::PrivateUse1, &"div.Tensor".into())
            .is_none());
    }
}
