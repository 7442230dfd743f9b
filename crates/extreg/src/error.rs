//! Error taxonomy surfaced by every registry in this crate.

use thiserror::Error;

use crate::dtype::DType;
use crate::signature::OpSignature;
use crate::slot::Slot;

/// Registry failure surfaced synchronously to registration or dispatch code.
///
/// Registration-time variants (`DuplicateRegistration`, `NameInUse`,
/// `AlreadyBound`) are fatal to backend initialization and are never retried;
/// lookup-time variants signal misconfiguration or an unsupported call to the
/// host runtime.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("duplicate registration in the {registry} registry for {key}")]
    DuplicateRegistration { registry: &'static str, key: String },

    #[error("no {registry} registered for slot '{slot}'")]
    UnboundSlot { registry: &'static str, slot: Slot },

    #[error("unknown backend name '{name}'")]
    UnknownName { name: String },

    #[error("operator '{signature}' is not supported on slot '{slot}' and no fallback is installed")]
    UnsupportedOperator { slot: Slot, signature: OpSignature },

    #[error("data type {dtype} is not supported by backend '{name}'")]
    UnsupportedDataType { name: String, dtype: DType },

    #[error("backend name '{name}' is already in use by slot '{owner}'")]
    NameInUse { name: String, owner: Slot },

    #[error("slot '{slot}' is already bound to backend name '{name}'")]
    AlreadyBound { slot: Slot, name: String },

    #[error("payload type mismatch in {context}")]
    HandleTypeMismatch { context: String },

    #[error("invalid generator state: {message}")]
    InvalidState { message: String },

    #[error("backend execution failure: {message}")]
    Execution { message: String },
}

impl RegistryError {
    pub fn duplicate(registry: &'static str, key: impl Into<String>) -> Self {
        RegistryError::DuplicateRegistration {
            registry,
            key: key.into(),
        }
    }

    pub fn unbound(registry: &'static str, slot: Slot) -> Self {
        RegistryError::UnboundSlot { registry, slot }
    }

    pub fn unknown_name(name: impl Into<String>) -> Self {
        RegistryError::UnknownName { name: name.into() }
    }

    pub fn unsupported_operator(slot: Slot, signature: OpSignature) -> Self {
        RegistryError::UnsupportedOperator { slot, signature }
    }

    pub fn unsupported_dtype(name: impl Into<String>, dtype: DType) -> Self {
        RegistryError::UnsupportedDataType {
            name: name.into(),
            dtype,
        }
    }

    pub fn type_mismatch(context: impl Into<String>) -> Self {
        RegistryError::HandleTypeMismatch {
            context: context.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        RegistryError::InvalidState {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        RegistryError::Execution {
            message: message.into(),
        }
    }

    /// Whether this error rejects a write against an already-populated key.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            RegistryError::DuplicateRegistration { .. }
                | RegistryError::NameInUse { .. }
                | RegistryError::AlreadyBound { .. }
        )
    }
}
