//! Runs in its own test binary: the strict-dispatch flag is read from the
//! environment once per process, so it must be set before any registry is
//! constructed.

use std::sync::Arc;

use extreg::dispatch::{DispatchRegistry, KernelCall};
use extreg::{OpSignature, RegistryError, Slot};

#[test]
fn strict_dispatch_env_flag_disables_fallbacks() {
    std::env::set_var("EXTREG_STRICT_DISPATCH", "1");

    let registry = DispatchRegistry::new();
    registry
        .register_fallback(
            Slot::PrivateUse1,
            Arc::new(|_call: &KernelCall<'_>| Ok(Vec::new())),
        )
        .unwrap();

    assert!(matches!(
        registry.resolve(Slot::PrivateUse1, &OpSignature::parse("sub.Tensor")),
        Err(RegistryError::UnsupportedOperator { .. })
    ));
}
