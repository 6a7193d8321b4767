//! Resolved fetch targets and the resolution seam.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::ExporterConfig;
use crate::error::ResolveError;

/// Concrete network target for exactly one fetch attempt. Re-resolved before
/// every retry because the deployment it names may move between attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub server_url: String,
    pub path: String,
    pub debug: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
}

impl Endpoint {
    pub fn url(&self) -> String {
        if self.path.is_empty() {
            self.server_url.clone()
        } else {
            format!(
                "{}/{}",
                self.server_url.trim_end_matches('/'),
                self.path.trim_start_matches('/')
            )
        }
    }

    pub fn has_basic_auth(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    pub fn has_token_auth(&self) -> bool {
        self.bearer_token.is_some()
    }
}

/// Resolution seam. The fetch loop calls this once before the first attempt
/// and again before every retry; failures are transient and feed the retry
/// path rather than aborting.
pub trait EndpointResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        config: &'a ExporterConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Endpoint, ResolveError>> + Send + 'a>>;
}

/// Derives the endpoint from the configured URL template, re-running
/// variable substitution on every call so environment changes are seen.
pub struct ConfigResolver;

impl EndpointResolver for ConfigResolver {
    fn resolve<'a>(
        &'a self,
        config: &'a ExporterConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Endpoint, ResolveError>> + Send + 'a>> {
        Box::pin(async move {
            let server_url = config
                .resolved_url()
                .map_err(|err| ResolveError::Unavailable(err.to_string()))?;
            Ok(Endpoint {
                server_url,
                ..Endpoint::default()
            })
        })
    }
}

/// Scripted resolver for deterministic offline tests: plays back a queue of
/// outcomes, then falls through to a fixed endpoint, counting every call.
pub struct StaticResolver {
    fallback: Endpoint,
    script: Mutex<Vec<Result<Endpoint, ResolveError>>>,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            fallback: endpoint,
            script: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues one resolution outcome ahead of the fallback endpoint.
    pub fn push_outcome(&self, outcome: Result<Endpoint, ResolveError>) {
        self.script
            .lock()
            .expect("resolver script lock")
            .push(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EndpointResolver for StaticResolver {
    fn resolve<'a>(
        &'a self,
        _config: &'a ExporterConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Endpoint, ResolveError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().expect("resolver script lock");
            if script.is_empty() {
                Ok(self.fallback.clone())
            } else {
                script.remove(0)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_server_and_path_with_single_slash() {
        let endpoint = Endpoint {
            server_url: String::from("https://api.example.test/"),
            path: String::from("/v1/usage"),
            ..Endpoint::default()
        };
        assert_eq!(endpoint.url(), "https://api.example.test/v1/usage");
    }

    #[test]
    fn url_without_path_is_the_server_url() {
        let endpoint = Endpoint {
            server_url: String::from("https://api.example.test/usage"),
            ..Endpoint::default()
        };
        assert_eq!(endpoint.url(), "https://api.example.test/usage");
    }

    #[test]
    fn auth_presence_checks() {
        let mut endpoint = Endpoint::default();
        assert!(!endpoint.has_basic_auth());
        assert!(!endpoint.has_token_auth());

        endpoint.username = Some(String::from("scraper"));
        assert!(endpoint.has_basic_auth());

        endpoint.bearer_token = Some(String::from("t"));
        assert!(endpoint.has_token_auth());
    }
}
