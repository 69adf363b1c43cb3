//! Property-based tests for configuration key validation (spec §6).

use proptest::prelude::*;

proptest! {
    /// Keys containing characters outside `[A-Za-z0-9_.]` are always rejected.
    #[test]
    fn prop_key_rejects_invalid_chars(key in ".*") {
        let has_invalid_chars = key.chars().any(|c| !c.is_alphanumeric() && c != '_' && c != '.');
        if has_invalid_chars {
            prop_assert!(crate::config::validate_key(&key).is_err());
        }
    }

    /// Keys with path-traversal segments are always rejected (they don't
    /// appear in the known key list, so this follows from the allow-list,
    /// not from a dedicated traversal check).
    #[test]
    fn prop_key_rejects_path_traversal(key in "(\\.\\./)+[a-z]+") {
        prop_assert!(crate::config::validate_key(&key).is_err());
    }

    /// Malicious-looking keys (shell metacharacters, control characters)
    /// never match the allow-list and are always rejected.
    #[test]
    fn prop_key_no_injection(malicious in "(\\.\\./|\\x00|<|>|\\||;|\\$|\\`|\\n|\\r)+") {
        prop_assert!(crate::config::validate_key(&malicious).is_err());
    }
}

#[cfg(test)]
mod validation_tests {
    use crate::config::validate_key;

    #[test]
    fn valid_keys_accepted() {
        for key in [
            "hierarchy_cache_capacity",
            "change_feed",
            "change_feed.behaviour",
            "change_feed.poll_timeout_ms",
            "node_types.root_node_definition",
        ] {
            assert!(validate_key(key).is_ok(), "key '{key}' should be valid");
        }
    }

    #[test]
    fn invalid_keys_rejected() {
        for key in [
            "",
            ".",
            "..",
            "invalid..key",
            "../../../etc/passwd",
            "key\x00withnull",
            "key with spaces",
            "key-with-dashes",
            "unknown_top_level_key",
        ] {
            assert!(validate_key(key).is_err(), "key '{key}' should be invalid");
        }
    }

    #[test]
    fn error_message_names_the_unknown_key() {
        let err = validate_key("bogus").expect_err("unknown key");
        assert!(err.to_string().contains("bogus"));
    }
}

#[cfg(test)]
mod adversarial_tests {
    use crate::config::validate_key;

    #[test]
    fn extremely_long_key_handled_gracefully() {
        let long_key = "a".repeat(10_000);
        let result = validate_key(&long_key);
        assert!(result.is_err() || result.is_ok());
    }

    #[test]
    fn unicode_key_rejected() {
        for key in ["日本語", "ключ", "🔴", "café"] {
            assert!(validate_key(key).is_err(), "unicode key '{key}' should be rejected");
        }
    }

    #[test]
    fn newlines_in_key_rejected() {
        for key in ["key\nvalue", "key\r\nvalue", "key\rvalue"] {
            assert!(validate_key(key).is_err(), "key with newline should be rejected");
        }
    }
}
