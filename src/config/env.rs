//! Environment variable substitution for configuration text.
//!
//! Placeholders take the form `${VAR}` or `$VAR`. A placeholder whose
//! variable is unset is left untouched so that credential validation can
//! still recognise it as "not configured".

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

static WHOLE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{[A-Za-z_][A-Za-z0-9_]*\}$").unwrap());

/// Expand placeholders using the process environment.
pub fn expand_env(input: &str) -> Cow<'_, str> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand placeholders using an arbitrary lookup.
pub fn expand_with<F>(input: &str, lookup: F) -> Cow<'_, str>
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER_PATTERN.replace_all(input, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        lookup(name).unwrap_or_else(|| caps[0].to_string())
    })
}

/// Whether the whole value is a single unexpanded `${VAR}` placeholder.
pub fn is_unexpanded_placeholder(value: &str) -> bool {
    WHOLE_PLACEHOLDER.is_match(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "WB_API_KEY" => Some("secret".to_string()),
            "REGION" => Some("ru-central1".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expands_braced_and_bare_forms() {
        let out = expand_with("key: ${WB_API_KEY}\nregion: $REGION", lookup);
        assert_eq!(out, "key: secret\nregion: ru-central1");
    }

    #[test]
    fn test_unset_variable_is_left_literal() {
        let out = expand_with("key: ${S3_SECRET_KEY}", lookup);
        assert_eq!(out, "key: ${S3_SECRET_KEY}");
    }

    #[test]
    fn test_text_without_placeholders_is_borrowed() {
        let out = expand_with("plain: value", lookup);
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_detects_unexpanded_placeholder() {
        assert!(is_unexpanded_placeholder("${WB_API_KEY}"));
        assert!(is_unexpanded_placeholder("  ${ZAI_API_KEY} "));
        assert!(!is_unexpanded_placeholder("prefix-${WB_API_KEY}"));
        assert!(!is_unexpanded_placeholder("real-key"));
        assert!(!is_unexpanded_placeholder(""));
    }
}
