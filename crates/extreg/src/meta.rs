//! Tensor metadata codec registry: per-slot serialize/deserialize hooks for
//! the opaque extension metadata a backend attaches to tensors.
//!
//! The codec is consulted only when a tensor actually carries metadata. A
//! missing codec with metadata present is a configuration error surfaced at
//! serialization time, never at registration time, and the registry performs
//! no schema validation of its own.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::slot::Slot;
use crate::tensor::{ExtTensor, PayloadHandle};

/// Primitive value embeddable in a tensor's persisted representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// The externally visible metadata format: string keys to primitive values.
pub type MetaMap = BTreeMap<String, MetaValue>;

/// Turns a tensor's opaque metadata into the persistable mapping.
pub type SerializeFn = Arc<dyn Fn(&ExtTensor) -> Result<MetaMap, RegistryError> + Send + Sync>;

/// Rebuilds the opaque metadata value during tensor reconstruction.
pub type DeserializeFn = Arc<dyn Fn(&MetaMap) -> Result<PayloadHandle, RegistryError> + Send + Sync>;

#[derive(Clone)]
struct Codec {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

pub struct CodecRegistry {
    codecs: RwLock<HashMap<Slot, Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        slot: Slot,
        serialize: SerializeFn,
        deserialize: DeserializeFn,
    ) -> Result<(), RegistryError> {
        let mut codecs = self.codecs.write().unwrap();
        if codecs.contains_key(&slot) {
            return Err(RegistryError::duplicate(
                "metadata codec",
                format!("'{slot}'"),
            ));
        }
        codecs.insert(
            slot,
            Codec {
                serialize,
                deserialize,
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, slot: Slot) -> bool {
        self.codecs.read().unwrap().contains_key(&slot)
    }

    /// Serializes the tensor's extension metadata, if any.
    ///
    /// Returns `Ok(None)` for tensors without metadata. Metadata present
    /// while no codec is registered for the tensor's slot is reported as
    /// [`RegistryError::UnboundSlot`].
    pub fn serialize_metadata(&self, tensor: &ExtTensor) -> Result<Option<MetaMap>, RegistryError> {
        if tensor.metadata().is_none() {
            return Ok(None);
        }
        let slot = tensor.device().slot;
        let codec = self
            .codecs
            .read()
            .unwrap()
            .get(&slot)
            .cloned()
            .ok_or_else(|| RegistryError::unbound("metadata codec", slot))?;
        (codec.serialize)(tensor).map(Some)
    }

    /// Rebuilds the opaque metadata value from a persisted mapping.
    pub fn deserialize_metadata(
        &self,
        slot: Slot,
        map: &MetaMap,
    ) -> Result<PayloadHandle, RegistryError> {
        let codec = self
            .codecs
            .read()
            .unwrap()
            .get(&slot)
            .cloned()
            .ok_or_else(|| RegistryError::unbound("metadata codec", slot))?;
        (codec.deserialize)(map)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<CodecRegistry> = OnceLock::new();

/// Process-wide metadata codec table.
pub fn global() -> &'static CodecRegistry {
    GLOBAL.get_or_init(CodecRegistry::new)
}

pub fn register_codec(
    slot: Slot,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
) -> Result<(), RegistryError> {
    global().register(slot, serialize, deserialize)
}

pub fn serialize_metadata(tensor: &ExtTensor) -> Result<Option<MetaMap>, RegistryError> {
    global().serialize_metadata(tensor)
}

pub fn deserialize_metadata(slot: Slot, map: &MetaMap) -> Result<PayloadHandle, RegistryError> {
    global().deserialize_metadata(slot, map)
}
