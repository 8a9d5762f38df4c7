use std::env;

pub(crate) const PROFILE_ENV: &str = "NDSCOPE_PROFILE";
pub(crate) const STRICT_SCOPES_ENV: &str = "NDSCOPE_STRICT_SCOPES";
pub(crate) const CHECK_NUMERICS_ENV: &str = "NDSCOPE_CHECK_NUMERICS";

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Reads a boolean flag; unset or blank variables yield `None`.
pub(crate) fn flag(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(parse_bool(&value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn truthy_values() {
        for value in ["1", "true", "YES", " on "] {
            assert!(parse_bool(value), "{value} should parse as true");
        }
        for value in ["0", "false", "off", "maybe"] {
            assert!(!parse_bool(value), "{value} should parse as false");
        }
    }
}
