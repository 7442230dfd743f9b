//! Stable operator keys used by the dispatch, autograd, and autocast tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque stable key identifying one operator overload.
///
/// The textual form is `name` or `name.Overload` (`"add.Tensor"`); the
/// registries never interpret the schema beyond equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpSignature {
    name: String,
    overload: Option<String>,
}

impl OpSignature {
    /// Parses a signature from its `name` or `name.Overload` textual form.
    pub fn parse(text: &str) -> Self {
        match text.split_once('.') {
            Some((name, overload)) if !overload.is_empty() => Self {
                name: name.to_string(),
                overload: Some(overload.to_string()),
            },
            _ => Self {
                name: text.trim_end_matches('.').to_string(),
                overload: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overload(&self) -> Option<&str> {
        self.overload.as_deref()
    }
}

impl fmt::Display for OpSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.overload {
            Some(overload) => write!(f, "{}.{}", self.name, overload),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for OpSignature {
    fn from(text: &str) -> Self {
        OpSignature::parse(text)
    }
}

impl Serialize for OpSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OpSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(OpSignature::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overloads() {
        let sig = OpSignature::parse("add.Tensor");
        assert_eq!(sig.name(), "add");
        assert_eq!(sig.overload(), Some("Tensor"));
        assert_eq!(sig.to_string(), "add.Tensor");
    }

    #[test]
    fn parses_bare_names() {
        let sig = OpSignature::parse("relu");
        assert_eq!(sig.name(), "relu");
        assert_eq!(sig.overload(), None);
        assert_eq!(OpSignature::parse("relu."), sig);
    }
}
