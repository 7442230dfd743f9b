//! Scalar element types visible to the registry layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Enumerates the scalar element types the registry layer reasons about.
///
/// This is deliberately the short list needed for autocast decisions and
/// accessor exclusion sets, not a full numerics taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    I8,
    I32,
    I64,
    F16,
    Bf16,
    F32,
    F64,
}

impl DType {
    pub fn is_floating_point(self) -> bool {
        matches!(self, DType::F16 | DType::Bf16 | DType::F32 | DType::F64)
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool | DType::I8 => 1,
            DType::F16 | DType::Bf16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    /// Promotion rank used when autocast picks the widest input type.
    /// Integral types rank below every float so mixed calls stay floating.
    fn promotion_rank(self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::I8 => 1,
            DType::I32 => 2,
            DType::I64 => 3,
            DType::F16 => 4,
            DType::Bf16 => 5,
            DType::F32 => 6,
            DType::F64 => 7,
        }
    }

    /// Returns the wider of two types under the promotion ordering.
    pub fn promote(self, other: DType) -> DType {
        if other.promotion_rank() > self.promotion_rank() {
            other
        } else {
            self
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        self.promotion_rank()
    }

    pub(crate) fn from_bits(bits: u8) -> Option<DType> {
        match bits {
            0 => Some(DType::Bool),
            1 => Some(DType::I8),
            2 => Some(DType::I32),
            3 => Some(DType::I64),
            4 => Some(DType::F16),
            5 => Some(DType::Bf16),
            6 => Some(DType::F32),
            7 => Some(DType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::I8 => "i8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F16 => "f16",
            DType::Bf16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_prefers_floats_over_ints() {
        assert_eq!(DType::I64.promote(DType::F16), DType::F16);
        assert_eq!(DType::F32.promote(DType::Bf16), DType::F32);
        assert_eq!(DType::F64.promote(DType::F32), DType::F64);
    }

    #[test]
    fn bits_round_trip() {
        for dtype in [
            DType::Bool,
            DType::I8,
            DType::I32,
            DType::I64,
            DType::F16,
            DType::Bf16,
            DType::F32,
            DType::F64,
        ] {
            assert_eq!(DType::from_bits(dtype.to_bits()), Some(dtype));
        }
        assert_eq!(DType::from_bits(42), None);
    }
}
