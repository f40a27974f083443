//! Utility functions and helpers
//!
//! URL redaction for diagnostics and `$env:` expansion for configuration values.

use crate::constants::{REDACTED, SECRET_QUERY_PARAMS};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Matches `name=value` pairs for secret-bearing parameters in unparseable strings
static SECRET_PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    let names = SECRET_QUERY_PARAMS.join("|");
    Regex::new(&format!(r"(?i)(^|[?&;])({})=([^&#\s]*)", names))
        .expect("secret parameter pattern is valid")
});

/// Returns true if `name` is a query parameter whose value must never be logged
pub fn is_secret_param(name: &str) -> bool {
    SECRET_QUERY_PARAMS
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(name))
}

/// Replace the values of secret-bearing query parameters with a redaction marker
///
/// Any URL placed in a log line or error message must pass through here first.
/// Strings that do not parse as absolute URLs (relative paths, fragments of
/// messages) are scrubbed with a pattern match instead.
///
/// ```
/// use weather_gateway::utils::redact_url;
///
/// let redacted = redact_url("https://api.example.com/v1/current.json?q=Denver&key=abc123");
/// assert!(!redacted.contains("abc123"));
/// assert!(redacted.contains("q=Denver"));
/// ```
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.query().is_none() {
                return url.to_string();
            }

            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| {
                    let value = if is_secret_param(&k) {
                        REDACTED.to_string()
                    } else {
                        v.into_owned()
                    };
                    (k.into_owned(), value)
                })
                .collect();

            url.query_pairs_mut().clear().extend_pairs(pairs);
            url.to_string()
        }
        Err(_) => redact_text(raw),
    }
}

/// Scrub `secret=value` pairs from arbitrary text
pub fn redact_text(raw: &str) -> String {
    SECRET_PAIR_RE
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            format!("{}{}={}", &caps[1], &caps[2], REDACTED)
        })
        .into_owned()
}

/// Expand environment variable references (`$env:VAR_NAME`)
pub fn expand_env_value(value: &str) -> String {
    match value.strip_prefix("$env:") {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_all_secret_params() {
        let raw = concat!(
            "https://h.example/v1/x?key=k1&api_key=k2&apikey=k3",
            "&token=k4&access_token=k5&client_secret=k6&q=Paris"
        );
        let redacted = redact_url(raw);

        for secret in ["k1", "k2", "k3", "k4", "k5", "k6"] {
            assert!(
                !redacted.contains(&format!("={}", secret)),
                "{} leaked in {}",
                secret,
                redacted
            );
        }
        assert!(redacted.contains("q=Paris"));
        assert_eq!(redacted.matches("%5BREDACTED%5D").count(), 6);
    }

    #[test]
    fn test_redact_url_without_query_is_unchanged() {
        assert_eq!(
            redact_url("https://h.example/v1/current.json"),
            "https://h.example/v1/current.json"
        );
    }

    #[test]
    fn test_redact_relative_path() {
        let redacted = redact_url("/v1/current.json?q=Oslo&KEY=topsecret");
        assert_eq!(redacted, "/v1/current.json?q=Oslo&KEY=[REDACTED]");
    }

    #[test]
    fn test_redact_text_leaves_similar_names() {
        let redacted = redact_text("monkey=banana&key=s3cr3t");
        assert_eq!(redacted, "monkey=banana&key=[REDACTED]");
    }

    #[test]
    fn test_expand_env_value() {
        unsafe {
            std::env::set_var("GATEWAY_UTILS_TEST_VAR", "test_value");
        }

        assert_eq!(expand_env_value("$env:GATEWAY_UTILS_TEST_VAR"), "test_value");
        assert_eq!(expand_env_value("literal_value"), "literal_value");
        assert_eq!(expand_env_value("$env:GATEWAY_UTILS_NONEXISTENT"), "");

        unsafe {
            std::env::remove_var("GATEWAY_UTILS_TEST_VAR");
        }
    }
}
