//! Shared fixtures for registry tests: recording kernels, tensor builders,
//! and module-like/storage-like surface values.

use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use extreg::dispatch::{KernelCall, KernelFn};
use extreg::{Device, DeviceIndex, DType, ExtTensor, RegistryError, Slot, SurfaceValue};

/// Invocation log shared between a test and its recording kernels.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Kernel that appends `label` to the log on every invocation and echoes its
/// inputs back unchanged.
pub fn recording_kernel(label: &str, log: &CallLog) -> KernelFn {
    let label = label.to_string();
    let log = Arc::clone(log);
    Arc::new(move |call: &KernelCall<'_>| {
        log.lock()
            .expect("call log mutex poisoned")
            .push(format!("{label}:{}", call.signature));
        Ok(call.inputs.to_vec())
    })
}

/// Kernel that fails with an execution error, for exercising propagation.
pub fn failing_kernel(message: &str) -> KernelFn {
    let message = message.to_string();
    Arc::new(move |_call: &KernelCall<'_>| Err(RegistryError::execution(message.clone())))
}

/// A tensor on the given slot carrying an `f32` host buffer payload.
pub fn slot_tensor(slot: Slot, index: DeviceIndex, data: Vec<f32>) -> ExtTensor {
    let len = data.len();
    ExtTensor::new(
        Device::new(slot, index),
        DType::F32,
        [len],
        Arc::new(data),
    )
}

/// A tensor on the given slot with an arbitrary dtype and empty payload,
/// for accessor exclusion tests.
pub fn typed_tensor(slot: Slot, dtype: DType) -> ExtTensor {
    ExtTensor::new(Device::new(slot, 0), dtype, [0usize; 0], Arc::new(()))
}

/// Module-like surface value: a bag of parameters with assorted dtypes.
pub struct FixtureModule {
    pub device: Device,
    pub parameter_dtypes: Vec<DType>,
}

impl SurfaceValue for FixtureModule {
    fn device(&self) -> Device {
        self.device
    }

    fn dtypes(&self) -> SmallVec<[DType; 4]> {
        self.parameter_dtypes.iter().copied().collect()
    }

    fn transfer_to(&self, device: Device) -> Result<Box<dyn SurfaceValue>, RegistryError> {
        Ok(Box::new(FixtureModule {
            device,
            parameter_dtypes: self.parameter_dtypes.clone(),
        }))
    }
}

/// Storage-like surface value: one dtype, no shape.
pub struct FixtureStorage {
    pub device: Device,
    pub dtype: DType,
}

impl SurfaceValue for FixtureStorage {
    fn device(&self) -> Device {
        self.device
    }

    fn dtypes(&self) -> SmallVec<[DType; 4]> {
        let mut out = SmallVec::new();
        out.push(self.dtype);
        out
    }

    fn transfer_to(&self, device: Device) -> Result<Box<dyn SurfaceValue>, RegistryError> {
        Ok(Box::new(FixtureStorage {
            device,
            dtype: self.dtype,
        }))
    }
}
