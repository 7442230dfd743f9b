//! Autocast policy registry and per-slot mixed-precision flags.
//!
//! Each operator signature maps to one member of a small closed policy set;
//! a per-slot fallthrough lets unregistered operators run at their natural
//! precision instead of failing. The process-wide enable flag and autocast
//! dtype are explicit per-slot state with accessor functions, never ambient
//! globals, so the contract stays testable in isolation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::RegistryError;
use crate::signature::OpSignature;
use crate::slot::Slot;

/// Casting policy applied to one operator under autocast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastPolicy {
    /// Cast floating inputs to the slot's configured autocast dtype.
    CastToAutocast,
    /// Keep (or restore) full precision regardless of the autocast dtype.
    KeepFullPrecision,
    /// Cast every input to the widest participating input type.
    PromoteToWidest,
    /// Run at natural precision; no casting at all.
    Fallthrough,
}

impl CastPolicy {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lower" => Ok(CastPolicy::CastToAutocast),
            "keep" => Ok(CastPolicy::KeepFullPrecision),
            "widest" => Ok(CastPolicy::PromoteToWidest),
            "fallthrough" => Ok(CastPolicy::Fallthrough),
            other => Err(format!("unknown autocast policy '{other}'")),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            CastPolicy::CastToAutocast => "lower",
            CastPolicy::KeepFullPrecision => "keep",
            CastPolicy::PromoteToWidest => "widest",
            CastPolicy::Fallthrough => "fallthrough",
        }
    }

    /// The dtype inputs should be cast to under this policy, or `None` for
    /// "leave inputs alone."
    pub fn effective_dtype(self, autocast_dtype: DType, input_dtypes: &[DType]) -> Option<DType> {
        match self {
            CastPolicy::CastToAutocast => Some(autocast_dtype),
            CastPolicy::KeepFullPrecision => Some(DType::F32),
            CastPolicy::PromoteToWidest => input_dtypes
                .iter()
                .copied()
                .reduce(|acc, dtype| acc.promote(dtype)),
            CastPolicy::Fallthrough => None,
        }
    }
}

impl<'de> Deserialize<'de> for CastPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        CastPolicy::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for CastPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Signature-to-policy overrides parsed from configuration.
///
/// Keys are operator signatures in textual form, values are policy strings
/// (`lower`, `keep`, `widest`, `fallthrough`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutocastOverrides {
    #[serde(flatten)]
    policies: HashMap<String, CastPolicy>,
}

impl AutocastOverrides {
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OpSignature, CastPolicy)> + '_ {
        self.policies
            .iter()
            .map(|(key, policy)| (OpSignature::parse(key), *policy))
    }
}

const DEFAULT_AUTOCAST_DTYPE: DType = DType::F16;

struct SlotFlags {
    enabled: AtomicBool,
    dtype: AtomicU8,
}

impl SlotFlags {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            dtype: AtomicU8::new(DEFAULT_AUTOCAST_DTYPE.to_bits()),
        }
    }
}

/// Policy table plus per-slot autocast enable/dtype flags.
pub struct AutocastRegistry {
    policies: RwLock<HashMap<(Slot, OpSignature), CastPolicy>>,
    fallthrough: RwLock<HashSet<Slot>>,
    flags: [SlotFlags; 3],
}

impl AutocastRegistry {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            fallthrough: RwLock::new(HashSet::new()),
            flags: [SlotFlags::new(), SlotFlags::new(), SlotFlags::new()],
        }
    }

    pub fn register_policy(
        &self,
        slot: Slot,
        signature: OpSignature,
        policy: CastPolicy,
    ) -> Result<(), RegistryError> {
        let mut policies = self.policies.write().unwrap();
        let key = (slot, signature);
        if policies.contains_key(&key) {
            return Err(RegistryError::duplicate(
                "autocast",
                format!("{} on '{}'", key.1, slot),
            ));
        }
        policies.insert(key, policy);
        Ok(())
    }

    /// Applies a parsed override map in one sweep.
    pub fn register_policies(
        &self,
        slot: Slot,
        overrides: &AutocastOverrides,
    ) -> Result<(), RegistryError> {
        for (signature, policy) in overrides.iter() {
            self.register_policy(slot, signature, policy)?;
        }
        Ok(())
    }

    /// Installs the pass-through default for unregistered operators.
    pub fn register_fallthrough(&self, slot: Slot) -> Result<(), RegistryError> {
        let mut fallthrough = self.fallthrough.write().unwrap();
        if fallthrough.contains(&slot) {
            return Err(RegistryError::duplicate(
                "autocast",
                format!("fallthrough on '{slot}'"),
            ));
        }
        fallthrough.insert(slot);
        Ok(())
    }

    /// Explicit entry first, then fallthrough, else unsupported.
    pub fn resolve(
        &self,
        slot: Slot,
        signature: &OpSignature,
    ) -> Result<CastPolicy, RegistryError> {
        if let Some(policy) = self
            .policies
            .read()
            .unwrap()
            .get(&(slot, signature.clone()))
        {
            return Ok(*policy);
        }
        if self.fallthrough.read().unwrap().contains(&slot) {
            return Ok(CastPolicy::Fallthrough);
        }
        Err(RegistryError::unsupported_operator(slot, signature.clone()))
    }

    pub fn is_enabled(&self, slot: Slot) -> bool {
        self.flags[slot.index()].enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, slot: Slot, enabled: bool) {
        self.flags[slot.index()]
            .enabled
            .store(enabled, Ordering::Release);
    }

    pub fn get_dtype(&self, slot: Slot) -> DType {
        let bits = self.flags[slot.index()].dtype.load(Ordering::Acquire);
        // Only set_dtype writes here, and it stores valid bits.
        DType::from_bits(bits).unwrap_or(DEFAULT_AUTOCAST_DTYPE)
    }

    pub fn set_dtype(&self, slot: Slot, dtype: DType) {
        self.flags[slot.index()]
            .dtype
            .store(dtype.to_bits(), Ordering::Release);
    }

    /// Resolves the policy and computes the dtype inputs should carry for
    /// this call. `None` when autocast is disabled for the slot or the
    /// policy falls through.
    pub fn effective_dtype(
        &self,
        slot: Slot,
        signature: &OpSignature,
        input_dtypes: &[DType],
    ) -> Result<Option<DType>, RegistryError> {
        if !self.is_enabled(slot) {
            return Ok(None);
        }
        let policy = self.resolve(slot, signature)?;
        Ok(policy.effective_dtype(self.get_dtype(slot), input_dtypes))
    }
}

impl Default for AutocastRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<AutocastRegistry> = OnceLock::new();

/// Process-wide autocast registry.
pub fn global() -> &'static AutocastRegistry {
    GLOBAL.get_or_init(AutocastRegistry::new)
}

pub fn register_policy(
    slot: Slot,
    signature: impl Into<OpSignature>,
    policy: CastPolicy,
) -> Result<(), RegistryError> {
    global().register_policy(slot, signature.into(), policy)
}

pub fn register_fallthrough(slot: Slot) -> Result<(), RegistryError> {
    global().register_fallthrough(slot)
}

pub fn resolve(slot: Slot, signature: &OpSignature) -> Result<CastPolicy, RegistryError> {
    global().resolve(slot, signature)
}

pub fn is_enabled(slot: Slot) -> bool {
    global().is_enabled(slot)
}

pub fn set_enabled(slot: Slot, enabled: bool) {
    global().set_enabled(slot, enabled)
}

pub fn get_dtype(slot: Slot) -> DType {
    global().get_dtype(slot)
}

pub fn set_dtype(slot: Slot, dtype: DType) {
    global().set_dtype(slot, dtype)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_strings_round_trip() {
        for policy in [
            CastPolicy::CastToAutocast,
            CastPolicy::KeepFullPrecision,
            CastPolicy::PromoteToWidest,
            CastPolicy::Fallthrough,
        ] {
            assert_eq!(CastPolicy::parse(policy.as_str()), Ok(policy));
        }
        assert!(CastPolicy::parse("benchmark").is_err());
    }

    #[test]
    fn overrides_parse_from_json() {
        let overrides: AutocastOverrides =
            serde_json::from_str(r#"{"matmul": "lower", "softmax.int": "keep"}"#).unwrap();
        let parsed: HashMap<String, CastPolicy> = overrides
            .iter()
            .map(|(sig, policy)| (sig.to_string(), policy))
            .collect();
        assert_eq!(parsed["matmul"], CastPolicy::CastToAutocast);
        assert_eq!(parsed["softmax.int"], CastPolicy::KeepFullPrecision);
    }

    #[test]
    fn widest_input_wins_under_promote() {
        let policy = CastPolicy::PromoteToWidest;
        assert_eq!(
            policy.effective_dtype(DType::F16, &[DType::F16, DType::F32]),
            Some(DType::F32)
        );
        assert_eq!(policy.effective_dtype(DType::F16, &[]), None);
    }
}
