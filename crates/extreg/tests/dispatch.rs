use std::sync::Arc;
use std::thread;

use extreg::dispatch::DispatchRegistry;
use extreg::{OpSignature, Provenance, RegistryError, Slot};
use extreg_backend_tests::{call_log, failing_kernel, recording_kernel, slot_tensor};

const SLOT: Slot = Slot::PrivateUse1;

#[test]
fn duplicate_kernel_registration_keeps_first() {
    let registry = DispatchRegistry::with_strict(false);
    let log = call_log();
    let sig = OpSignature::parse("add.Tensor");

    registry
        .register_kernel(SLOT, sig.clone(), recording_kernel("first", &log))
        .unwrap();
    let err = registry
        .register_kernel(SLOT, sig.clone(), recording_kernel("second", &log))
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateRegistration { .. }));

    // First registration survives the rejected rebind.
    let inputs = [slot_tensor(SLOT, 0, vec![1.0])];
    registry.call(SLOT, &sig, &inputs).unwrap();
    assert_eq!(log.lock().unwrap().as_slice(), ["first:add.Tensor"]);
}

#[test]
fn resolution_prefers_kernel_then_fallback_then_fails() {
    let registry = DispatchRegistry::with_strict(false);
    let log = call_log();
    let add = OpSignature::parse("add.Tensor");
    let sub = OpSignature::parse("sub.Tensor");

    registry
        .register_kernel(SLOT, add.clone(), recording_kernel("kernel", &log))
        .unwrap();

    // No fallback yet: unknown signature is a hard failure naming both parts.
    let err = registry.resolve(SLOT, &sub).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("sub.Tensor"), "message was: {message}");
    assert!(message.contains("privateuse1"), "message was: {message}");

    registry
        .register_fallback(SLOT, recording_kernel("fallback", &log))
        .unwrap();

    assert_eq!(
        registry.resolve(SLOT, &add).unwrap().provenance,
        Provenance::Exact
    );
    assert_eq!(
        registry.resolve(SLOT, &sub).unwrap().provenance,
        Provenance::Fallback
    );

    // An unbound slot has neither kernels nor a fallback.
    assert!(matches!(
        registry.resolve(Slot::PrivateUse2, &add),
        Err(RegistryError::UnsupportedOperator { .. })
    ));
}

#[test]
fn duplicate_fallback_is_rejected() {
    let registry = DispatchRegistry::with_strict(false);
    let log = call_log();
    registry
        .register_fallback(SLOT, recording_kernel("first", &log))
        .unwrap();
    let err = registry
        .register_fallback(SLOT, recording_kernel("second", &log))
        .unwrap_err();
    assert!(err.is_duplicate());
}

#[test]
fn call_propagates_kernel_failure() {
    let registry = DispatchRegistry::with_strict(false);
    let sig = OpSignature::parse("matmul");
    registry
        .register_kernel(SLOT, sig.clone(), failing_kernel("device lost"))
        .unwrap();
    let err = registry.call(SLOT, &sig, &[]).unwrap_err();
    assert!(err.to_string().contains("device lost"));
}

#[test]
fn strict_registry_never_falls_back() {
    let registry = DispatchRegistry::with_strict(true);
    let log = call_log();
    registry
        .register_fallback(SLOT, recording_kernel("fallback", &log))
        .unwrap();
    assert!(matches!(
        registry.resolve(SLOT, &OpSignature::parse("sub.Tensor")),
        Err(RegistryError::UnsupportedOperator { .. })
    ));
}

#[test]
fn concurrent_duplicate_registration_has_one_winner() {
    let registry = Arc::new(DispatchRegistry::with_strict(false));
    let log = call_log();
    let mut handles = Vec::new();
    for worker in 0..8 {
        let registry = Arc::clone(&registry);
        let kernel = recording_kernel(&format!("worker-{worker}"), &log);
        handles.push(thread::spawn(move || {
            registry.register_kernel(SLOT, OpSignature::parse("add.Tensor"), kernel)
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent writer may win");
    for lost in results.iter().filter(|r| r.is_err()) {
        assert!(lost.as_ref().unwrap_err().is_duplicate());
    }
}

#[test]
fn registered_signatures_are_sorted_per_slot() {
    let registry = DispatchRegistry::with_strict(false);
    let log = call_log();
    for sig in ["mul.Tensor", "add.Tensor"] {
        registry
            .register_kernel(SLOT, OpSignature::parse(sig), recording_kernel(sig, &log))
            .unwrap();
    }
    registry
        .register_kernel(
            Slot::PrivateUse2,
            OpSignature::parse("other"),
            recording_kernel("other", &log),
        )
        .unwrap();
    let names: Vec<String> = registry
        .registered_signatures(SLOT)
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(names, ["add.Tensor", "mul.Tensor"]);
}
