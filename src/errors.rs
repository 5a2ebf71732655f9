use std::{
    error::Error as StdError,
    fmt, io,
    time::{Duration, SystemTime},
};

use thiserror::Error;

use crate::{api::SealStatus, context::ContextError};

/// A value rejected by validation. `value` holds what may be shown to an operator: sensitive content is
/// already replaced with a redaction placeholder by the code that built the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
    pub index: Option<usize>,
}

impl ValidationError {
    pub fn new(field: &str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.to_string(), value: value.into(), message: message.into(), index: None }
    }

    /// Marks the error as belonging to the key at `index` of a key list.
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.index {
            write!(f, "invalid key at index {}: ", index)?;
        }
        write!(f, "validation failed for field '{}' with value '{}': {}", self.field, self.value, self.message)
    }
}

impl StdError for ValidationError {}

#[derive(Error, Debug)]
#[error("vault {operation} failed for {endpoint}: {cause}")]
pub struct VaultError {
    pub operation: String,
    pub endpoint: String,
    #[source]
    pub cause: Box<AuError>,
    pub retryable: bool,
    pub timestamp: SystemTime,
}

impl VaultError {
    pub fn new(operation: &str, endpoint: &str, cause: impl Into<AuError>, retryable: bool) -> Self {
        Self {
            operation: operation.to_string(),
            endpoint: endpoint.to_string(),
            cause: Box::new(cause.into()),
            retryable,
            timestamp: SystemTime::now(),
        }
    }
}

#[derive(Error, Debug)]
#[error("unseal failed for {endpoint} at key index {key_index}: {cause}")]
pub struct UnsealError {
    pub endpoint: String,
    pub key_index: usize,
    #[source]
    pub cause: Box<AuError>,
    pub seal_status: Option<SealStatus>,
}

impl UnsealError {
    pub fn new(endpoint: &str, key_index: usize, cause: impl Into<AuError>, seal_status: Option<SealStatus>) -> Self {
        Self { endpoint: endpoint.to_string(), key_index, cause: Box::new(cause.into()), seal_status }
    }
}

#[derive(Error, Debug)]
#[error("connection to {endpoint} failed (timeout: {timeout:?}): {cause}")]
pub struct ConnectionError {
    pub endpoint: String,
    #[source]
    pub cause: Box<AuError>,
    pub timeout: Duration,
    pub retryable: bool,
}

impl ConnectionError {
    pub fn new(endpoint: &str, cause: impl Into<AuError>, timeout: Duration, retryable: bool) -> Self {
        Self { endpoint: endpoint.to_string(), cause: Box::new(cause.into()), timeout, retryable }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("operation '{operation}' timed out after {elapsed:?} (timeout: {timeout:?})")]
pub struct TimeoutError {
    pub operation: String,
    pub timeout: Duration,
    pub elapsed: Duration,
}

#[derive(Error, Debug)]
#[error("authentication with {endpoint} failed (method: {method}): {cause}")]
pub struct AuthenticationError {
    pub endpoint: String,
    pub method: String,
    #[source]
    pub cause: Box<AuError>,
}

#[derive(Error, Debug)]
pub enum AuError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Unseal(#[from] UnsealError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error("operation '{operation}' was cancelled")]
    Cancelled { operation: String },
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    AttemptsFailed {
        operation: String,
        attempts: usize,
        #[source]
        source: Box<AuError>,
    },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<AuError>,
    },
    #[error("server responded with status {status}: {}", .errors.join("; "))]
    ResponseStatus { status: u16, errors: Vec<String> },
    #[error("client is closed")]
    ErrClientClosed,
    #[error("Config path is invalid.")]
    ErrConfigPathInvalid,
    #[error("Config load failed.")]
    ErrConfigLoadFailed,
    #[error("Config has no vault instance.")]
    ErrConfigInstanceNotFound,
    #[error("Config instance '{0}' is invalid: {1}")]
    ErrConfigInstanceInvalid(String, String),
    #[error("Some IO error happened, {:?}", .source)]
    IO {
        #[from]
        source: io::Error,
    },
    #[error("Some serde error happened, {:?}", .source)]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("Some serde_yaml error happened, {:?}", .source)]
    SerdeYaml {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("Some hcl error happened, {:?}", .source)]
    Hcl {
        #[from]
        source: hcl::Error,
    },
    #[error("Some ureq error happened, {}", .source)]
    Ureq {
        #[from]
        source: Box<ureq::Error>,
    },
    #[error("Some base64 error happened, {}", .source)]
    Base64 {
        #[from]
        source: base64::DecodeError,
    },
    #[error("Some rustls error happened, {}", .source)]
    Rustls {
        #[from]
        source: rustls::Error,
    },
    #[error(transparent)]
    ErrOther(#[from] anyhow::Error),
}

impl AuError {
    pub fn context(context: impl Into<String>, source: impl Into<AuError>) -> Self {
        AuError::Context { context: context.into(), source: Box::new(source.into()) }
    }

    /// Maps an interrupted [`Context`](crate::context::Context) to the matching error kind.
    pub fn interrupted(reason: ContextError, operation: &str, timeout: Duration, elapsed: Duration) -> Self {
        match reason {
            ContextError::Cancelled => AuError::Cancelled { operation: operation.to_string() },
            ContextError::DeadlineExceeded => {
                AuError::Timeout(TimeoutError { operation: operation.to_string(), timeout, elapsed })
            }
        }
    }

    pub fn is_validation_error(&self) -> bool {
        match self {
            AuError::Validation(_) => true,
            AuError::Context { source, .. } | AuError::AttemptsFailed { source, .. } => source.is_validation_error(),
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AuError::Vault(e) => e.retryable,
            AuError::Connection(e) => e.retryable,
            AuError::Unseal(e) => e.cause.is_retryable(),
            AuError::Context { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            AuError::Cancelled { .. } => true,
            AuError::Context { source, .. } | AuError::AttemptsFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The innermost error of the cause chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

impl From<ureq::Error> for AuError {
    fn from(err: ureq::Error) -> Self {
        AuError::Ureq { source: Box::new(err) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn transport_failure() -> AuError {
        AuError::ResponseStatus { status: 503, errors: vec!["Vault is sealed".into()] }
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("key", "[REDACTED]", "key cannot be empty");
        assert_eq!(err.to_string(), "validation failed for field 'key' with value '[REDACTED]': key cannot be empty");

        let err = err.at_index(2);
        assert!(err.to_string().starts_with("invalid key at index 2: validation failed for field 'key'"));
    }

    #[test]
    fn test_is_retryable() {
        let err: AuError = VaultError::new("seal-status", "http://vault:8200", transport_failure(), true).into();
        assert!(err.is_retryable());

        let err: AuError = VaultError::new("unseal-key-submit", "http://vault:8200", transport_failure(), false).into();
        assert!(!err.is_retryable());

        let inner = VaultError::new("unseal-key-submit", "http://vault:8200", transport_failure(), true);
        let err: AuError = UnsealError::new("http://vault:8200", 1, inner, None).into();
        assert!(err.is_retryable());

        let conn = ConnectionError::new("http://vault:8200", transport_failure(), Duration::from_secs(1), true);
        assert!(AuError::context("get seal status", conn).is_retryable());

        let timeout = TimeoutError {
            operation: "unseal".into(),
            timeout: Duration::from_secs(1),
            elapsed: Duration::from_secs(2),
        };
        assert!(!AuError::from(timeout).is_retryable());
        assert!(!AuError::Cancelled { operation: "unseal".into() }.is_retryable());
        assert!(!AuError::from(ValidationError::new("keys", "[]", "no unseal keys provided")).is_retryable());

        let exhausted = AuError::AttemptsFailed {
            operation: "unseal".into(),
            attempts: 3,
            source: Box::new(VaultError::new("seal-status", "x", transport_failure(), true).into()),
        };
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn test_is_validation_error() {
        let err = AuError::context("validation failed", ValidationError::new("threshold", "0", "bad"));
        assert!(err.is_validation_error());
        assert!(err.to_string().starts_with("validation failed: validation failed for field 'threshold'"));

        let err = AuError::AttemptsFailed { operation: "unseal".into(), attempts: 1, source: Box::new(err) };
        assert!(err.is_validation_error());

        let err: AuError = VaultError::new("seal-status", "x", transport_failure(), true).into();
        assert!(!err.is_validation_error());
    }

    #[test]
    fn test_interrupted() {
        let err = AuError::interrupted(ContextError::Cancelled, "unseal", Duration::ZERO, Duration::ZERO);
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());

        let err = AuError::interrupted(
            ContextError::DeadlineExceeded,
            "unseal",
            Duration::from_secs(1),
            Duration::from_millis(1500),
        );
        assert!(matches!(err, AuError::Timeout(ref t) if t.operation == "unseal"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_root_cause() {
        let err: AuError = VaultError::new("seal-status", "x", transport_failure(), true).into();
        let err = AuError::context("outer", err);
        assert_eq!(err.root_cause().to_string(), "server responded with status 503: Vault is sealed");
    }
}
