//! Reference "npu" backend: a host-memory mock that registers into every
//! extension-slot registry, for tests and as a template for real vendors.

pub mod npu;

pub use npu::{
    NpuBuffer, NpuGenerator, NpuGuard, NpuMeta, NPU_DEVICE_COUNT, NPU_SLOT,
};

use std::sync::OnceLock;

use extreg::RegistryError;

static REGISTER: OnceLock<Result<(), RegistryError>> = OnceLock::new();

fn latched_register(
    cell: &OnceLock<Result<(), RegistryError>>,
    sweep: impl FnOnce() -> Result<(), RegistryError>,
) -> Result<(), RegistryError> {
    cell.get_or_init(sweep).clone()
}

/// Registers the npu backend into the process-wide registries.
///
/// Runs the full sweep at most once per process: kernels, fallback, autograd
/// override, autocast policies, generator factory, device guard, metadata
/// codec, and the "npu" name binding. Called automatically on library load,
/// but safe to call again manually; repeat calls report the first sweep's
/// outcome.
pub fn register_npu_backend() -> Result<(), RegistryError> {
    latched_register(&REGISTER, npu::register_all)
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_NPU_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        if let Err(err) = register_npu_backend() {
            eprintln!("npu backend registration failed: {err}");
        }
    }
    register
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_sweep_outcome_is_latched() {
        let cell = OnceLock::new();
        let mut sweeps = 0;

        let first = latched_register(&cell, || {
            sweeps += 1;
            Err(RegistryError::duplicate("backend name", "'privateuse1'"))
        });
        assert!(first.unwrap_err().is_duplicate());

        // The sweep never re-runs; later callers see the original failure.
        let again = latched_register(&cell, || {
            sweeps += 1;
            Ok(())
        });
        assert!(again.unwrap_err().is_duplicate());
        assert_eq!(sweeps, 1);
    }

    #[test]
    fn successful_sweep_outcome_is_latched() {
        let cell = OnceLock::new();
        assert!(latched_register(&cell, || Ok(())).is_ok());
        assert!(latched_register(&cell, || {
            Err(RegistryError::execution("must not re-run"))
        })
        .is_ok());
    }
}
