use zeroize::Zeroizing;

use super::{masked, validate_key_list, DefaultKeyValidator, KeyValidator, SensitivePatterns};
use crate::errors::ValidationError;

pub const DEFAULT_FORBIDDEN_STRINGS: &[&str] = &["password", "secret", "test", "example", "demo"];

/// Applies every [`DefaultKeyValidator`] rule, then requires an exact decoded length (unless the required
/// length is 0), an allowed prefix on
/// the encoded key (when prefixes are configured) and the absence of forbidden substrings in both the
/// encoded and the decoded form.
#[derive(Debug, Clone)]
pub struct StrictKeyValidator {
    base: DefaultKeyValidator,
    required_key_length: usize,
    allowed_prefixes: Vec<String>,
    forbidden_strings: Vec<String>,
}

impl StrictKeyValidator {
    pub fn new(required_key_length: usize) -> Self {
        Self {
            base: DefaultKeyValidator::default(),
            required_key_length,
            allowed_prefixes: Vec::new(),
            forbidden_strings: DEFAULT_FORBIDDEN_STRINGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_allowed_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.allowed_prefixes = prefixes;
        self
    }

    pub fn with_forbidden_strings(mut self, forbidden: Vec<String>) -> Self {
        self.forbidden_strings = forbidden.into_iter().map(|s| s.to_lowercase()).filter(|s| !s.is_empty()).collect();
        self
    }

    pub fn with_sensitive_patterns(mut self, sensitive: SensitivePatterns) -> Self {
        self.base = self.base.with_sensitive_patterns(sensitive);
        self
    }

    pub fn required_key_length(&self) -> usize {
        self.required_key_length
    }
}

impl KeyValidator for StrictKeyValidator {
    fn validate_keys(&self, keys: &[String], threshold: usize) -> Result<(), ValidationError> {
        validate_key_list(keys, threshold, |key| self.validate_base64_key(key))
    }

    fn validate_base64_key(&self, key: &str) -> Result<(), ValidationError> {
        self.base.validate_base64_key(key)?;

        let decoded = self.base.decode(key)?;
        let shown = || masked(key);

        if self.required_key_length > 0 && decoded.len() != self.required_key_length {
            return Err(ValidationError::new(
                "key",
                shown(),
                format!("decoded key length ({}) does not match required length ({})", decoded.len(), self.required_key_length),
            ));
        }

        if !self.allowed_prefixes.is_empty() && !self.allowed_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(ValidationError::new("key", shown(), "key does not start with an allowed prefix"));
        }

        let encoded_lower = Zeroizing::new(key.to_lowercase());
        let decoded_lower = Zeroizing::new(String::from_utf8_lossy(&decoded).to_lowercase());
        for forbidden in self.forbidden_strings.iter() {
            if encoded_lower.contains(forbidden.as_str()) || decoded_lower.contains(forbidden.as_str()) {
                return Err(ValidationError::new(
                    "key",
                    shown(),
                    format!("key contains forbidden string: {}", forbidden),
                ));
            }
        }

        Ok(())
    }
}
