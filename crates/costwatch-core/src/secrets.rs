//! Credential lookup seam.
//!
//! The original deployment reads bearer tokens out of a cluster secret
//! store; that collaborator is out of scope here, so the seam is a trait
//! with environment- and file-backed implementations.

use std::future::Future;
use std::pin::Pin;

use crate::config::ExporterConfig;
use crate::error::SecretError;

pub type SecretFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SecretError>> + Send + 'a>>;

pub trait SecretStore: Send + Sync {
    /// Returns the bearer token for the configured provider.
    fn bearer_token<'a>(&'a self, config: &'a ExporterConfig) -> SecretFuture<'a>;
}

/// Reads the token from the environment variable named by
/// `additionalVariables.bearerTokenEnv`, defaulting to `BEARER_TOKEN`.
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn bearer_token<'a>(&'a self, config: &'a ExporterConfig) -> SecretFuture<'a> {
        Box::pin(async move {
            let name = config
                .additional_variables
                .get("bearerTokenEnv")
                .map(String::as_str)
                .unwrap_or("BEARER_TOKEN");
            std::env::var(name).map_err(|_| SecretError::NotFound(name.to_owned()))
        })
    }
}

/// Reads the token from the file named by
/// `additionalVariables.bearerTokenPath`. Trailing whitespace is stripped so
/// a file ending in a newline still yields a usable header value.
pub struct FileSecretStore;

impl SecretStore for FileSecretStore {
    fn bearer_token<'a>(&'a self, config: &'a ExporterConfig) -> SecretFuture<'a> {
        Box::pin(async move {
            let path = config
                .additional_variables
                .get("bearerTokenPath")
                .ok_or_else(|| SecretError::NotFound(String::from("bearerTokenPath")))?;
            let raw = tokio::fs::read_to_string(path)
                .await
                .map_err(|err| SecretError::Unavailable(format!("{path}: {err}")))?;
            Ok(raw.trim_end().to_owned())
        })
    }
}

/// Fixed-token store for tests.
pub struct StaticSecretStore(pub String);

impl SecretStore for StaticSecretStore {
    fn bearer_token<'a>(&'a self, _config: &'a ExporterConfig) -> SecretFuture<'a> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}
