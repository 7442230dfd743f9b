//! Operator dispatch registry: routes `(slot, signature)` to a backend
//! kernel, with one optional catch-all fallback per slot.
//!
//! Backends populate the table during initialization; the host runtime
//! resolves on the hot path of every tensor operation, so lookups take only a
//! read lock. Registration is write-once per key: a duplicate is rejected and
//! the first registration stays intact.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::env::strict_dispatch_enabled;
use crate::error::RegistryError;
use crate::signature::OpSignature;
use crate::slot::Slot;
use crate::tensor::ExtTensor;

/// One dispatched operator invocation as seen by a backend kernel.
pub struct KernelCall<'a> {
    pub slot: Slot,
    pub signature: &'a OpSignature,
    pub inputs: &'a [ExtTensor],
}

/// A callable bound to one operator signature within one slot.
pub type KernelFn =
    Arc<dyn Fn(&KernelCall<'_>) -> Result<Vec<ExtTensor>, RegistryError> + Send + Sync>;

/// How a resolved kernel was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// An explicit registration for the requested signature.
    Exact,
    /// The slot's catch-all handler. Conventionally marshals tensor data to a
    /// reference device, executes there, and transfers results back; the
    /// caller pays that round-trip.
    Fallback,
}

/// Result of a successful dispatch lookup.
#[derive(Clone)]
pub struct Resolved {
    pub kernel: KernelFn,
    pub provenance: Provenance,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

impl Resolved {
    pub fn invoke(&self, call: &KernelCall<'_>) -> Result<Vec<ExtTensor>, RegistryError> {
        (self.kernel)(call)
    }
}

/// Table of operator kernels plus per-slot fallbacks.
pub struct DispatchRegistry {
    kernels: RwLock<HashMap<(Slot, OpSignature), KernelFn>>,
    fallbacks: RwLock<HashMap<Slot, KernelFn>>,
    strict: bool,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::with_strict(strict_dispatch_enabled())
    }

    /// A registry whose fallback behavior is pinned rather than read from the
    /// environment.
    pub fn with_strict(strict: bool) -> Self {
        Self {
            kernels: RwLock::new(HashMap::new()),
            fallbacks: RwLock::new(HashMap::new()),
            strict,
        }
    }

    /// Binds `kernel` to `(slot, signature)`.
    pub fn register_kernel(
        &self,
        slot: Slot,
        signature: OpSignature,
        kernel: KernelFn,
    ) -> Result<(), RegistryError> {
        let mut kernels = self.kernels.write().unwrap();
        let key = (slot, signature);
        if kernels.contains_key(&key) {
            return Err(RegistryError::duplicate(
                "dispatch",
                format!("{} on '{}'", key.1, slot),
            ));
        }
        kernels.insert(key, kernel);
        Ok(())
    }

    /// Installs the slot's catch-all handler, invoked when no kernel matches.
    pub fn register_fallback(&self, slot: Slot, handler: KernelFn) -> Result<(), RegistryError> {
        let mut fallbacks = self.fallbacks.write().unwrap();
        if fallbacks.contains_key(&slot) {
            return Err(RegistryError::duplicate(
                "dispatch",
                format!("fallback on '{slot}'"),
            ));
        }
        fallbacks.insert(slot, handler);
        Ok(())
    }

    pub fn has_kernel(&self, slot: Slot, signature: &OpSignature) -> bool {
        self.kernels
            .read()
            .unwrap()
            .contains_key(&(slot, signature.clone()))
    }

    pub fn has_fallback(&self, slot: Slot) -> bool {
        self.fallbacks
            .read()
            .unwrap()
            .contains_key(&slot)
    }

    /// Resolves the kernel for `(slot, signature)`: explicit entry first,
    /// then the slot fallback, else [`RegistryError::UnsupportedOperator`].
    pub fn resolve(&self, slot: Slot, signature: &OpSignature) -> Result<Resolved, RegistryError> {
        if let Some(kernel) = self
            .kernels
            .read()
            .unwrap()
            .get(&(slot, signature.clone()))
        {
            return Ok(Resolved {
                kernel: Arc::clone(kernel),
                provenance: Provenance::Exact,
            });
        }
        if !self.strict {
            if let Some(handler) = self
                .fallbacks
                .read()
                .unwrap()
                .get(&slot)
            {
                return Ok(Resolved {
                    kernel: Arc::clone(handler),
                    provenance: Provenance::Fallback,
                });
            }
        }
        Err(RegistryError::unsupported_operator(slot, signature.clone()))
    }

    /// Resolves and invokes in one step; the host runtime's entry point.
    pub fn call(
        &self,
        slot: Slot,
        signature: &OpSignature,
        inputs: &[ExtTensor],
    ) -> Result<Vec<ExtTensor>, RegistryError> {
        let resolved = self.resolve(slot, signature)?;
        resolved.invoke(&KernelCall {
            slot,
            signature,
            inputs,
        })
    }

    /// Signatures explicitly registered for `slot`, for diagnostics.
    pub fn registered_signatures(&self, slot: Slot) -> Vec<OpSignature> {
        let kernels = self.kernels.read().unwrap();
        let mut out: Vec<OpSignature> = kernels
            .keys()
            .filter(|(s, _)| *s == slot)
            .map(|(_, sig)| sig.clone())
            .collect();
        out.sort();
        out
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<DispatchRegistry> = OnceLock::new();

/// Process-wide dispatch registry consulted by the host runtime.
pub fn global() -> &'static DispatchRegistry {
    GLOBAL.get_or_init(DispatchRegistry::new)
}

pub fn register_kernel(
    slot: Slot,
    signature: impl Into<OpSignature>,
    kernel: KernelFn,
) -> Result<(), RegistryError> {
    global().register_kernel(slot, signature.into(), kernel)
}

pub fn register_fallback(slot: Slot, handler: KernelFn) -> Result<(), RegistryError> {
    global().register_fallback(slot, handler)
}

pub fn resolve(slot: Slot, signature: &OpSignature) -> Result<Resolved, RegistryError> {
    global().resolve(slot, signature)
}

pub fn call(
    slot: Slot,
    signature: &OpSignature,
    inputs: &[ExtTensor],
) -> Result<Vec<ExtTensor>, RegistryError> {
    global().call(slot, signature, inputs)
}
