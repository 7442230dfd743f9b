//! Minimal tensor-shaped values that dispatch and accessor surfaces operate
//! on.
//!
//! The host runtime owns the real tensor representation; this layer only sees
//! a device tag, an element type, a shape, and a type-erased payload handle
//! that kernels downcast to their backend's concrete buffer type.

use std::any::Any;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::dtype::DType;
use crate::error::RegistryError;
use crate::slot::Device;

/// Type-erased payload handle shared between the host and a backend kernel.
pub type PayloadHandle = Arc<dyn Any + Send + Sync>;

/// Tensor-shaped value routed through the extension registries.
#[derive(Clone)]
pub struct ExtTensor {
    device: Device,
    dtype: DType,
    shape: SmallVec<[usize; 4]>,
    payload: PayloadHandle,
    metadata: Option<PayloadHandle>,
}

impl std::fmt::Debug for ExtTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtTensor")
            .field("device", &self.device)
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("has_metadata", &self.metadata.is_some())
            .finish_non_exhaustive()
    }
}

impl ExtTensor {
    pub fn new(
        device: Device,
        dtype: DType,
        shape: impl IntoIterator<Item = usize>,
        payload: PayloadHandle,
    ) -> Self {
        Self {
            device,
            dtype,
            shape: shape.into_iter().collect(),
            payload,
            metadata: None,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Downcasts the payload to the backend's concrete buffer type.
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Result<&T, RegistryError> {
        self.payload.downcast_ref::<T>().ok_or_else(|| {
            RegistryError::type_mismatch(format!("payload of tensor on {}", self.device))
        })
    }

    pub fn payload(&self) -> &PayloadHandle {
        &self.payload
    }

    /// Opaque backend-defined extension metadata, if the tensor carries any.
    pub fn metadata(&self) -> Option<&PayloadHandle> {
        self.metadata.as_ref()
    }

    pub fn metadata_as<T: Any + Send + Sync>(&self) -> Result<Option<&T>, RegistryError> {
        match &self.metadata {
            None => Ok(None),
            Some(value) => value
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| {
                    RegistryError::type_mismatch(format!(
                        "extension metadata of tensor on {}",
                        self.device
                    ))
                }),
        }
    }

    pub fn set_metadata(&mut self, metadata: PayloadHandle) {
        self.metadata = Some(metadata);
    }

    pub fn with_metadata(mut self, metadata: PayloadHandle) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Retags the tensor onto another device, reusing the payload handle.
    /// Backends that need a real copy do it inside their transfer hook.
    pub fn retagged(&self, device: Device) -> Self {
        let mut out = self.clone();
        out.device = device;
        out
    }
}

/// A value that lives on a device and can be asked to move.
///
/// Implemented by [`ExtTensor`] directly and by host-side module-like and
/// storage-like wrappers; generated accessors ([`crate::naming`]) work
/// against this trait so one table serves every target surface.
pub trait SurfaceValue: Send + Sync {
    fn device(&self) -> Device;

    /// Every element type the value involves. Modules report the types of
    /// all their parameters; tensors and storages report one.
    fn dtypes(&self) -> SmallVec<[DType; 4]>;

    fn transfer_to(&self, device: Device) -> Result<Box<dyn SurfaceValue>, RegistryError>;
}

impl std::fmt::Debug for dyn SurfaceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceValue")
            .field("device", &self.device())
            .field("dtypes", &self.dtypes())
            .finish_non_exhaustive()
    }
}

impl SurfaceValue for ExtTensor {
    fn device(&self) -> Device {
        self.device
    }

    fn dtypes(&self) -> SmallVec<[DType; 4]> {
        let mut out = SmallVec::new();
        out.push(self.dtype);
        out
    }

    fn transfer_to(&self, device: Device) -> Result<Box<dyn SurfaceValue>, RegistryError> {
        Ok(Box::new(self.retagged(device)))
    }
}
