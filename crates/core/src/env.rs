//! Environment variable helpers.

/// Parse an environment variable with a default fallback.
///
/// Unset variables return `default` silently (the expected case); set but
/// unparseable values log a warning instead of being swallowed.
pub fn env_parse_with_default<T: std::str::FromStr + std::fmt::Display>(
    var: &str,
    default: T,
) -> T {
    match std::env::var(var) {
        Ok(raw) => match raw.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(var, value = %raw, default = %default, "invalid env var value, using default");
                default
            },
        },
        Err(_) => default,
    }
}

/// Read a string environment variable, falling back to `default` when unset
/// or empty.
pub fn env_string_with_default(var: &str, default: &str) -> String {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_value() {
        std::env::set_var("TOOLSCRIBE_TEST_PARSE_OK", "42");
        let parsed: u32 = env_parse_with_default("TOOLSCRIBE_TEST_PARSE_OK", 7);
        assert_eq!(parsed, 42);
        std::env::remove_var("TOOLSCRIBE_TEST_PARSE_OK");
    }

    #[test]
    fn parse_garbage_falls_back() {
        std::env::set_var("TOOLSCRIBE_TEST_PARSE_BAD", "not-a-number");
        let parsed: u32 = env_parse_with_default("TOOLSCRIBE_TEST_PARSE_BAD", 7);
        assert_eq!(parsed, 7);
        std::env::remove_var("TOOLSCRIBE_TEST_PARSE_BAD");
    }

    #[test]
    fn missing_string_uses_default() {
        std::env::remove_var("TOOLSCRIBE_TEST_STRING_MISSING");
        assert_eq!(env_string_with_default("TOOLSCRIBE_TEST_STRING_MISSING", "fallback"), "fallback");
    }
}
