use std::env;
use std::sync::OnceLock;

static STRICT_DISPATCH: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// When set, operator resolution never falls back to the catch-all handler,
/// so every unimplemented operator fails loudly. Debugging aid for backend
/// authors chasing silent host round-trips.
pub(crate) fn strict_dispatch_enabled() -> bool {
    *STRICT_DISPATCH.get_or_init(|| match env::var("EXTREG_STRICT_DISPATCH") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("1"));
        assert!(parse_bool(" TRUE "));
        assert!(parse_bool("on"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool(""));
    }
}
