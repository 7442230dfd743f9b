//! Registries that let an out-of-tree hardware backend plug a complete set of
//! behaviors into a host tensor runtime through a single reserved extension
//! slot.
//!
//! The host runtime enumerates its extension points by a small closed set of
//! reserved identifiers ([`Slot`]). This crate lets an unbounded number of
//! logically distinct backends share those identifiers: each backend claims a
//! slot at startup, registers kernels, autograd overrides, autocast policies,
//! a generator factory, a device guard, a metadata codec, and a friendly name,
//! and the host resolves everything through the slot afterwards.
//!
//! All registration happens during process or library initialization and is
//! write-once per key; resolution paths are read-mostly locked and safe to hit
//! from many compute threads.

pub mod autocast;
pub mod autograd;
pub mod dispatch;
pub mod dtype;
mod env;
pub mod error;
pub mod generator;
pub mod guard;
pub mod meta;
pub mod naming;
pub mod signature;
pub mod slot;
pub mod tensor;

pub use autocast::{AutocastOverrides, AutocastRegistry, CastPolicy};
pub use autograd::{AutogradPair, AutogradRegistry};
pub use dispatch::{DispatchRegistry, KernelCall, KernelFn, Provenance, Resolved};
pub use error::RegistryError;
pub use generator::{Generator, GeneratorFactory, GeneratorHandle, GeneratorRegistry};
pub use guard::{DeviceGuard, DeviceGuardImpl, GuardRegistry};
pub use meta::{CodecRegistry, MetaMap, MetaValue};
pub use naming::{Accessor, AccessorKind, AccessorSet, NamingRegistry, SurfaceTarget};
pub use dtype::DType;
pub use signature::OpSignature;
pub use slot::{Device, DeviceIndex, EventId, Slot, StreamId};
pub use tensor::{ExtTensor, PayloadHandle, SurfaceValue};
