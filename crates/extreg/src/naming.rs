//! Backend naming service: the one-shot slot-to-name binding and the accessor
//! surface synthesized from it.
//!
//! A vendor claims a reserved slot, then binds one human-friendly name to it
//! for the life of the process ("npu", "dpu", ...). User-facing surfaces are
//! generated from that binding as a data-driven table of
//! `(target surface, operation kind)` entries, built once and cached; they
//! are never regenerated per call.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use crate::dtype::DType;
use crate::error::RegistryError;
use crate::slot::{Device, DeviceIndex, Slot};
use crate::tensor::SurfaceValue;

/// Host-side surface an accessor set attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurfaceTarget {
    TensorLike,
    ModuleLike,
    StorageLike,
}

impl SurfaceTarget {
    pub const ALL: [SurfaceTarget; 3] = [
        SurfaceTarget::TensorLike,
        SurfaceTarget::ModuleLike,
        SurfaceTarget::StorageLike,
    ];
}

impl fmt::Display for SurfaceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceTarget::TensorLike => "tensor",
            SurfaceTarget::ModuleLike => "module",
            SurfaceTarget::StorageLike => "storage",
        };
        f.write_str(name)
    }
}

/// Operation kind within one target surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    /// `is_<name>`: is this value on that backend?
    Predicate,
    /// `<name>()`: move this value to that backend.
    Transfer,
}

/// "Is this value on the named backend" check.
pub type PredicateFn = Arc<dyn Fn(&dyn SurfaceValue) -> bool + Send + Sync>;

/// "Move this value to the named backend" operation.
pub type TransferFn = Arc<
    dyn Fn(&dyn SurfaceValue, DeviceIndex) -> Result<Box<dyn SurfaceValue>, RegistryError>
        + Send
        + Sync,
>;

enum AccessorFn {
    Predicate(PredicateFn),
    Transfer(TransferFn),
}

/// One synthesized method/attribute entry.
pub struct Accessor {
    name: String,
    target: SurfaceTarget,
    kind: AccessorKind,
    func: AccessorFn,
}

impl Accessor {
    /// The surfaced method name: `is_<backend>` or `<backend>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> SurfaceTarget {
        self.target
    }

    pub fn kind(&self) -> AccessorKind {
        self.kind
    }

    pub fn as_predicate(&self) -> Option<&PredicateFn> {
        match &self.func {
            AccessorFn::Predicate(f) => Some(f),
            AccessorFn::Transfer(_) => None,
        }
    }

    pub fn as_transfer(&self) -> Option<&TransferFn> {
        match &self.func {
            AccessorFn::Transfer(f) => Some(f),
            AccessorFn::Predicate(_) => None,
        }
    }
}

/// Accessor table synthesized from one name binding.
pub struct AccessorSet {
    backend_name: String,
    slot: Slot,
    accessors: Vec<Accessor>,
}

impl std::fmt::Debug for AccessorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorSet")
            .field("backend_name", &self.backend_name)
            .field("slot", &self.slot)
            .field("accessor_count", &self.accessors.len())
            .finish_non_exhaustive()
    }
}

impl AccessorSet {
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    pub fn get(&self, target: SurfaceTarget, kind: AccessorKind) -> Option<&Accessor> {
        self.accessors
            .iter()
            .find(|a| a.target == target && a.kind == kind)
    }

    pub fn predicate(&self, target: SurfaceTarget) -> Option<&PredicateFn> {
        self.get(target, AccessorKind::Predicate)?.as_predicate()
    }

    pub fn transfer(&self, target: SurfaceTarget) -> Option<&TransferFn> {
        self.get(target, AccessorKind::Transfer)?.as_transfer()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AccessorRequest {
    targets: BTreeSet<SurfaceTarget>,
    unsupported: BTreeSet<DType>,
}

struct CachedAccessors {
    request: AccessorRequest,
    set: Arc<AccessorSet>,
}

#[derive(Default)]
struct NameTable {
    by_slot: HashMap<Slot, String>,
    by_name: HashMap<String, Slot>,
}

pub struct NamingRegistry {
    names: RwLock<NameTable>,
    accessors: RwLock<HashMap<String, CachedAccessors>>,
}

impl NamingRegistry {
    pub fn new() -> Self {
        Self {
            names: RwLock::new(NameTable::default()),
            accessors: RwLock::new(HashMap::new()),
        }
    }

    /// Binds `name` to `slot` for the life of the process.
    pub fn bind(&self, slot: Slot, name: impl Into<String>) -> Result<(), RegistryError> {
        let name = name.into();
        let mut table = self.names.write().unwrap();
        if let Some(existing) = table.by_slot.get(&slot) {
            return Err(RegistryError::AlreadyBound {
                slot,
                name: existing.clone(),
            });
        }
        if let Some(owner) = table.by_name.get(&name) {
            return Err(RegistryError::NameInUse {
                name,
                owner: *owner,
            });
        }
        table.by_slot.insert(slot, name.clone());
        table.by_name.insert(name, slot);
        Ok(())
    }

    pub fn backend_name(&self, slot: Slot) -> Result<String, RegistryError> {
        self.names
            .read()
            .unwrap()
            .by_slot
            .get(&slot)
            .cloned()
            .ok_or_else(|| RegistryError::unbound("backend name", slot))
    }

    pub fn slot_for_name(&self, name: &str) -> Result<Slot, RegistryError> {
        self.names
            .read()
            .unwrap()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::unknown_name(name))
    }

    /// Synthesizes the accessor table for a bound backend name.
    ///
    /// Idempotent for identical arguments: the cached set is returned.
    /// Re-generating with different targets or a different unsupported set
    /// would produce a conflicting surface and is rejected.
    pub fn generate_accessors(
        &self,
        name: &str,
        targets: &[SurfaceTarget],
        unsupported: &[DType],
    ) -> Result<Arc<AccessorSet>, RegistryError> {
        let slot = self.slot_for_name(name)?;
        let request = AccessorRequest {
            targets: targets.iter().copied().collect(),
            unsupported: unsupported.iter().copied().collect(),
        };

        let mut cache = self.accessors.write().unwrap();
        if let Some(cached) = cache.get(name) {
            if cached.request == request {
                return Ok(Arc::clone(&cached.set));
            }
            return Err(RegistryError::duplicate(
                "accessor",
                format!("surface for '{name}'"),
            ));
        }

        let mut accessors = Vec::with_capacity(request.targets.len() * 2);
        for &target in &request.targets {
            accessors.push(Accessor {
                name: format!("is_{name}"),
                target,
                kind: AccessorKind::Predicate,
                func: AccessorFn::Predicate(Arc::new(move |value: &dyn SurfaceValue| {
                    value.device().slot == slot
                })),
            });

            let excluded = request.unsupported.clone();
            let backend = name.to_string();
            accessors.push(Accessor {
                name: name.to_string(),
                target,
                kind: AccessorKind::Transfer,
                func: AccessorFn::Transfer(Arc::new(
                    move |value: &dyn SurfaceValue, index: DeviceIndex| {
                        for dtype in value.dtypes() {
                            if excluded.contains(&dtype) {
                                return Err(RegistryError::unsupported_dtype(backend.as_str(), dtype));
                            }
                        }
                        value.transfer_to(Device::new(slot, index))
                    },
                )),
            });
        }

        let set = Arc::new(AccessorSet {
            backend_name: name.to_string(),
            slot,
            accessors,
        });
        cache.insert(
            name.to_string(),
            CachedAccessors {
                request,
                set: Arc::clone(&set),
            },
        );
        Ok(set)
    }
}

impl Default for NamingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<NamingRegistry> = OnceLock::new();

/// Process-wide naming service.
pub fn global() -> &'static NamingRegistry {
    GLOBAL.get_or_init(NamingRegistry::new)
}

pub fn bind_name(slot: Slot, name: impl Into<String>) -> Result<(), RegistryError> {
    global().bind(slot, name)
}

pub fn backend_name(slot: Slot) -> Result<String, RegistryError> {
    global().backend_name(slot)
}

pub fn slot_for_name(name: &str) -> Result<Slot, RegistryError> {
    global().slot_for_name(name)
}

pub fn generate_accessors(
    name: &str,
    targets: &[SurfaceTarget],
    unsupported: &[DType],
) -> Result<Arc<AccessorSet>, RegistryError> {
    global().generate_accessors(name, targets, unsupported)
}
