use thiserror::Error;

/// Placeholder substitution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("placeholder substitution did not settle within {limit} passes: '{text}'")]
    Unterminated { limit: usize, text: String },
}

/// Configuration document and auth-setup errors. Fatal to the current cycle;
/// the outer loop retries on the next scheduled attempt.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("username/password or bearer token may be set, but not both")]
    AmbiguousAuth,
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),
}

/// Endpoint resolution failures. Transient: the fetch loop re-resolves on
/// every attempt and keeps retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("service '{0}' not found")]
    NotFound(String),
    #[error("ambiguous match for service '{0}'")]
    Ambiguous(String),
    #[error("resolution failed: {0}")]
    Unavailable(String),
}

/// Terminal outcomes of the fetch-with-retry protocol. Transport and
/// resolution failures never surface here directly; they feed the retry loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("retry attempts exhausted after {attempts} tries: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },
    #[error("fetch cancelled")]
    Cancelled,
}

/// Payload decode failures. Non-fatal: the cycle proceeds with an empty
/// record batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {source}; snippet: {snippet:?}")]
    Malformed {
        #[source]
        source: serde_json::Error,
        snippet: String,
    },
    #[error("timestamp not representable as RFC3339: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Credential lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret '{0}' not found")]
    NotFound(String),
    #[error("secret lookup failed: {0}")]
    Unavailable(String),
}

/// Per-row reconciliation failures. Non-fatal: the offending row is skipped.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid label name '{0}'")]
    InvalidLabelName(String),
    #[error("row has {got} fields, header has {want}")]
    RowShape { got: usize, want: usize },
    #[error(transparent)]
    Registry(#[from] prometheus::Error),
}
