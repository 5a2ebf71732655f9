//! Validation of unseal key material.
//!
//! Validators are pure: they never perform I/O and never panic, whatever the input. A call reports only the
//! first violated rule. Decoded key bytes live in [`Zeroizing`] buffers and are wiped when the check returns.
//!
//! Error values that would embed key content matching a sensitive-term heuristic are replaced with
//! [`REDACTED`]. Once a key decodes it is treated as real key material: later rejections only report its
//! length, never its text.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use zeroize::Zeroizing;

use crate::errors::ValidationError;

pub mod strict;

pub use strict::StrictKeyValidator;

pub const DEFAULT_MIN_KEY_LENGTH: usize = 1;
pub const DEFAULT_MAX_KEY_LENGTH: usize = 1024;

pub const REDACTED: &str = "[REDACTED]";

/// Values shown in errors are cut to this many characters.
const MAX_DISPLAY_CHARS: usize = 32;

pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "key",
    "token",
    "credential",
    "admin",
    "root",
    "auth",
    "login",
    "session",
    "/etc/passwd",
    "/proc/",
    "c:\\windows\\",
    "127.0.0.1",
    "localhost",
    "192.168.",
    "10.0.0.",
];

pub trait KeyValidator: Send + Sync {
    /// Validates a whole key list against `threshold`.
    fn validate_keys(&self, keys: &[String], threshold: usize) -> Result<(), ValidationError>;

    /// Validates one base64 encoded key.
    fn validate_base64_key(&self, key: &str) -> Result<(), ValidationError>;
}

/// Case-insensitive heuristic deciding which values must not appear in error messages.
#[derive(Debug, Clone)]
pub struct SensitivePatterns {
    patterns: Vec<String>,
}

impl Default for SensitivePatterns {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_PATTERNS.iter().copied())
    }
}

impl SensitivePatterns {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { patterns: patterns.into_iter().map(|p| p.as_ref().to_lowercase()).filter(|p| !p.is_empty()).collect() }
    }

    pub fn matches(&self, value: &str) -> bool {
        let lower = Zeroizing::new(value.to_lowercase());
        self.patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    /// Renders `value` for an error message: redacted when sensitive, otherwise escaped and shortened.
    pub fn display(&self, value: &str) -> String {
        if self.matches(value) {
            return REDACTED.to_string();
        }

        let count = value.chars().count();
        let shown: String = value.chars().take(MAX_DISPLAY_CHARS).flat_map(char::escape_debug).collect();
        if count > MAX_DISPLAY_CHARS {
            format!("{}...({} chars)", shown, count)
        } else {
            shown
        }
    }
}

/// Error value for a key that decoded successfully: its length only.
pub(crate) fn masked(key: &str) -> String {
    format!("[{} chars]", key.chars().count())
}

/// The validator used when no other is configured.
#[derive(Debug, Clone)]
pub struct DefaultKeyValidator {
    min_key_length: usize,
    max_key_length: usize,
    sensitive: SensitivePatterns,
}

impl Default for DefaultKeyValidator {
    fn default() -> Self {
        Self {
            min_key_length: DEFAULT_MIN_KEY_LENGTH,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            sensitive: SensitivePatterns::default(),
        }
    }
}

impl DefaultKeyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_length(mut self, min: usize, max: usize) -> Self {
        self.min_key_length = min.max(1);
        self.max_key_length = max.max(self.min_key_length);
        self
    }

    pub fn with_sensitive_patterns(mut self, sensitive: SensitivePatterns) -> Self {
        self.sensitive = sensitive;
        self
    }

    pub fn sensitive_patterns(&self) -> &SensitivePatterns {
        &self.sensitive
    }

    /// Decodes a key that already passed [`KeyValidator::validate_base64_key`] structurally.
    pub(crate) fn decode(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, ValidationError> {
        STANDARD
            .decode(key)
            .map(Zeroizing::new)
            .map_err(|e| ValidationError::new("key", self.sensitive.display(key), format!("invalid base64 encoding: {}", e)))
    }
}

impl KeyValidator for DefaultKeyValidator {
    fn validate_keys(&self, keys: &[String], threshold: usize) -> Result<(), ValidationError> {
        validate_key_list(keys, threshold, |key| self.validate_base64_key(key))
    }

    fn validate_base64_key(&self, key: &str) -> Result<(), ValidationError> {
        let shown = || self.sensitive.display(key);

        if key.is_empty() {
            return Err(ValidationError::new("key", "", "key cannot be empty"));
        }

        if key.len() < self.min_key_length {
            return Err(ValidationError::new(
                "key",
                shown(),
                format!("key length ({}) is below minimum ({})", key.len(), self.min_key_length),
            ));
        }

        if key.len() > self.max_key_length {
            return Err(ValidationError::new(
                "key",
                shown(),
                format!("key length ({}) exceeds maximum ({})", key.len(), self.max_key_length),
            ));
        }

        let decoded = self.decode(key)?;
        if decoded.is_empty() {
            return Err(ValidationError::new("key", masked(key), "decoded key cannot be empty"));
        }

        if let Some(pattern) = weak_pattern(&decoded) {
            return Err(ValidationError::new("key", masked(key), format!("key contains a weak pattern: {}", pattern)));
        }

        Ok(())
    }
}

/// Checks shared by every validator: list shape, threshold bounds, per-key rules, then duplicates.
pub(crate) fn validate_key_list<F>(keys: &[String], threshold: usize, validate_key: F) -> Result<(), ValidationError>
where
    F: Fn(&str) -> Result<(), ValidationError>,
{
    if keys.is_empty() {
        return Err(ValidationError::new("keys", "[]", "no unseal keys provided"));
    }

    if threshold < 1 {
        return Err(ValidationError::new("threshold", threshold.to_string(), "threshold must be at least 1"));
    }

    if threshold > keys.len() {
        return Err(ValidationError::new(
            "threshold",
            threshold.to_string(),
            format!("threshold ({}) exceeds number of available keys ({})", threshold, keys.len()),
        ));
    }

    for (i, key) in keys.iter().enumerate() {
        validate_key(key).map_err(|e| e.at_index(i))?;
    }

    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        if let Some(first) = seen.insert(key.as_str(), i) {
            return Err(ValidationError::new(
                "keys",
                format!("[{} keys]", keys.len()),
                format!("duplicate key found at indices {} and {}", first, i),
            ));
        }
    }

    Ok(())
}

/// Detects synthetic key material: all zero bytes, a single repeated byte, or a period 2 or 4 repetition
/// spanning the whole buffer. Periodic patterns are only considered from 8 bytes on.
pub(crate) fn weak_pattern(data: &[u8]) -> Option<&'static str> {
    if data.iter().all(|&b| b == 0) {
        return Some("all zero bytes");
    }

    if data.len() > 1 && data.iter().all(|&b| b == data[0]) {
        return Some("all identical bytes");
    }

    if data.len() >= 8 {
        for period in [2usize, 4] {
            if data.iter().enumerate().skip(period).all(|(i, &b)| b == data[i % period]) {
                return Some("repeating byte sequence");
            }
        }
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn valid_keys(n: usize) -> Vec<String> {
        (0..n).map(|i| encode(&[0x10 + i as u8, 0xa5, 0x3c, 0x7e ^ i as u8])).collect()
    }

    #[test]
    fn test_base64_roundtrip() {
        let data: Vec<u8> = (0u8..=255).collect();
        assert_eq!(STANDARD.decode(encode(&data)).unwrap(), data);
    }

    #[test]
    fn test_validate_keys_ok() {
        let validator = DefaultKeyValidator::new();
        let keys = valid_keys(5);
        for threshold in 1..=5 {
            assert!(validator.validate_keys(&keys, threshold).is_ok());
        }
    }

    #[test]
    fn test_validate_keys_shape() {
        let validator = DefaultKeyValidator::new();

        let err = validator.validate_keys(&[], 1).unwrap_err();
        assert_eq!(err.field, "keys");
        assert!(err.message.contains("no unseal keys"));

        let err = validator.validate_keys(&valid_keys(3), 0).unwrap_err();
        assert_eq!(err.field, "threshold");

        let err = validator.validate_keys(&valid_keys(3), 4).unwrap_err();
        assert_eq!(err.message, "threshold (4) exceeds number of available keys (3)");
    }

    #[test]
    fn test_validate_keys_invalid_base64() {
        let validator = DefaultKeyValidator::new();
        let err = validator.validate_keys(&["not-base64!@#".to_string()], 1).unwrap_err();
        assert_eq!(err.index, Some(0));
        assert!(err.message.contains("invalid base64"));
        assert!(err.to_string().contains("invalid"));
        assert_eq!(err.value, "not-base64!@#");
    }

    #[test]
    fn test_validate_keys_duplicate() {
        let validator = DefaultKeyValidator::new();
        let mut keys = valid_keys(4);
        keys[3] = keys[1].clone();
        let err = validator.validate_keys(&keys, 2).unwrap_err();
        assert!(err.message.contains("indices 1 and 3"), "{}", err);
        assert!(!err.to_string().contains(keys[1].as_str()));
    }

    #[test]
    fn test_validate_key_rules_order() {
        let validator = DefaultKeyValidator::new();

        let err = validator.validate_base64_key("").unwrap_err();
        assert_eq!(err.message, "key cannot be empty");

        let long = "A".repeat(DEFAULT_MAX_KEY_LENGTH + 4);
        let err = validator.validate_base64_key(&long).unwrap_err();
        assert!(err.message.contains("exceeds maximum"));
        assert!(err.value.ends_with(&format!("...({} chars)", long.len())));

        let validator = DefaultKeyValidator::new().with_key_length(8, 64);
        let err = validator.validate_base64_key("AQID").unwrap_err();
        assert!(err.message.contains("below minimum"));
    }

    #[test]
    fn test_weak_patterns() {
        let validator = DefaultKeyValidator::new();

        for bad in [vec![0u8; 16], vec![0x41; 4], vec![1, 2, 1, 2, 1, 2, 1, 2], vec![1, 2, 3, 4, 1, 2, 3, 4]] {
            let err = validator.validate_base64_key(&encode(&bad)).unwrap_err();
            assert!(err.message.contains("weak pattern"), "{:?}: {}", bad, err);
        }

        assert!(validator.validate_base64_key(&encode(&[1, 2, 1, 2])).is_ok());
        assert!(validator.validate_base64_key(&encode(&[7])).is_ok());
        assert!(validator.validate_base64_key(&encode(&[1, 2, 3, 4, 1, 2, 3, 5])).is_ok());
    }

    #[test]
    fn test_rejected_share_text_not_echoed() {
        let validator = DefaultKeyValidator::new();
        let weak = encode(&[0x5a, 0xc3, 0x5a, 0xc3, 0x5a, 0xc3, 0x5a, 0xc3, 0x5a, 0xc3, 0x5a, 0xc3]);

        let err = validator.validate_base64_key(&weak).unwrap_err();
        assert!(err.message.contains("weak pattern"));
        assert_eq!(err.value, "[16 chars]");
        assert!(!err.to_string().contains(&weak[..8]));

        // structural failures still show the offending input
        let err = validator.validate_base64_key("not-base64!@#").unwrap_err();
        assert_eq!(err.value, "not-base64!@#");
    }

    #[test]
    fn test_sensitive_value_redacted() {
        let validator = DefaultKeyValidator::new();
        let err = validator.validate_base64_key("my-password!").unwrap_err();
        assert_eq!(err.value, REDACTED);
        assert!(err.message.contains("invalid base64"));
        assert!(!err.to_string().contains("password"));

        let err = validator.validate_base64_key("http://LOCALHOST/x").unwrap_err();
        assert_eq!(err.value, REDACTED);

        let custom = DefaultKeyValidator::new().with_sensitive_patterns(SensitivePatterns::new(["zebra"]));
        let err = custom.validate_base64_key("my-password!").unwrap_err();
        assert_eq!(err.value, "my-password!");
        let err = custom.validate_base64_key("zebra!").unwrap_err();
        assert_eq!(err.value, REDACTED);
    }

    #[test]
    fn test_adversarial_input_never_panics() {
        let validator = DefaultKeyValidator::new();
        let inputs = vec![
            "A".repeat(1024 * 1024 + 3),
            "\u{0}\u{1}\u{2}\u{7f}".to_string(),
            "%s%n%x%d".to_string(),
            "../../../../etc/passwd".to_string(),
            "\r\n\t ".to_string(),
            String::from_utf8_lossy(&[0xff, 0xfe, 0xfd]).into_owned(),
            "ééé€€€😀".to_string(),
            "====".to_string(),
        ];

        for input in inputs.iter() {
            assert!(validator.validate_base64_key(input).is_err());
            assert!(validator.validate_keys(&[input.clone()], 1).is_err());
            assert!(validator.validate_keys(&[input.clone(), input.clone()], 2).is_err());
        }

        let err = validator.validate_base64_key("\u{0}\u{7}bad").unwrap_err();
        assert!(!err.value.contains('\u{0}'));
    }
}
