//! The poll-retry fetch protocol.
//!
//! One attempt runs `Requesting -> (AsyncPending | Succeeded | Failed)`:
//! a 200 succeeds with the BOM-stripped body, a 202 enters the provider's
//! deferred-result protocol (Retry-After + Location, then a `downloadUrl`
//! hop), and anything else fails the attempt. Failed attempts back off for
//! the policy delay and start over from endpoint resolution, because the
//! target may have moved. The default policy never gives up; the
//! cancellation token is the way out.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AuthMethod, ExporterConfig};
use crate::endpoint::{Endpoint, EndpointResolver};
use crate::error::{ConfigError, FetchError};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};
use crate::secrets::SecretStore;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Delay between attempts plus an optional attempt cap. `max_attempts: None`
/// reproduces the original never-give-up loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<NonZeroU32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(delay: Duration, max_attempts: NonZeroU32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }
}

/// Body of the deferred-result pointer returned at the 202 Location.
#[derive(Debug, Deserialize)]
struct DeferredResult {
    #[serde(rename = "downloadUrl")]
    download_url: String,
}

enum AttemptError {
    /// Broken auth setup; surfaced immediately, never retried.
    Fatal(ConfigError),
    /// Anything the next attempt might fix.
    Transient(String),
    Cancelled,
}

/// Executes the fetch protocol against a resolved-and-re-resolved endpoint.
pub struct Fetcher {
    http: Arc<dyn HttpClient>,
    resolver: Arc<dyn EndpointResolver>,
    secrets: Arc<dyn SecretStore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        resolver: Arc<dyn EndpointResolver>,
        secrets: Arc<dyn SecretStore>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            resolver,
            secrets,
            policy,
            cancel,
        }
    }

    /// Runs attempts until a payload is obtained, the policy is exhausted,
    /// a configuration error surfaces, or the token cancels.
    pub async fn fetch(&self, config: &ExporterConfig) -> Result<Vec<u8>, FetchError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.attempt(config).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(err)) => return Err(FetchError::Config(err)),
                Err(AttemptError::Cancelled) => return Err(FetchError::Cancelled),
                Err(AttemptError::Transient(reason)) => {
                    warn!(attempt = attempts, %reason, "fetch attempt failed");
                    if let Some(max) = self.policy.max_attempts {
                        if attempts >= max.get() {
                            return Err(FetchError::AttemptsExhausted {
                                attempts,
                                last_error: reason,
                            });
                        }
                    }
                    if !self.pause(self.policy.delay).await {
                        return Err(FetchError::Cancelled);
                    }
                }
            }
        }
    }

    /// One pass through the protocol, starting from endpoint resolution.
    async fn attempt(&self, config: &ExporterConfig) -> Result<Vec<u8>, AttemptError> {
        let endpoint = self
            .resolver
            .resolve(config)
            .await
            .map_err(|err| AttemptError::Transient(format!("endpoint resolution failed: {err}")))?;

        let auth = self.auth_for(config, &endpoint).await?;
        let url = endpoint.url();
        if endpoint.debug {
            debug!(%url, "issuing provider request");
        }

        let response = self.get(url, &auth).await?;
        match response.status {
            200 => Ok(strip_bom(response.body)),
            202 => self.follow_deferred(&response, &auth).await,
            status => Err(AttemptError::Transient(format!(
                "unexpected status {status}: {}",
                response.body_snippet(256)
            ))),
        }
    }

    /// The provider's asynchronous-completion protocol: wait Retry-After
    /// seconds, GET the Location, then GET the `downloadUrl` it points at.
    async fn follow_deferred(
        &self,
        response: &HttpResponse,
        auth: &HttpAuth,
    ) -> Result<Vec<u8>, AttemptError> {
        let wait = response
            .header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let location = response
            .header("location")
            .ok_or_else(|| {
                AttemptError::Transient(String::from("202 response missing Location header"))
            })?
            .to_owned();

        debug!(wait_seconds = wait, %location, "provider deferred the result");
        if !self.pause(Duration::from_secs(wait)).await {
            return Err(AttemptError::Cancelled);
        }

        let pending = self.get(location, auth).await?;
        if !pending.is_success() {
            return Err(AttemptError::Transient(format!(
                "deferred-result poll returned status {}: {}",
                pending.status,
                pending.body_snippet(256)
            )));
        }
        let deferred: DeferredResult = serde_json::from_slice(&pending.body)
            .map_err(|err| AttemptError::Transient(format!("malformed deferred-result body: {err}")))?;

        let done = self.get(deferred.download_url, auth).await?;
        if done.status != 200 {
            return Err(AttemptError::Transient(format!(
                "download returned status {}: {}",
                done.status,
                done.body_snippet(256)
            )));
        }
        Ok(strip_bom(done.body))
    }

    /// Picks the effective auth for this attempt. Endpoint credentials win
    /// over the configured method; carrying both basic and bearer on one
    /// endpoint is a configuration error.
    async fn auth_for(
        &self,
        config: &ExporterConfig,
        endpoint: &Endpoint,
    ) -> Result<HttpAuth, AttemptError> {
        if endpoint.has_basic_auth() && endpoint.has_token_auth() {
            return Err(AttemptError::Fatal(ConfigError::AmbiguousAuth));
        }
        if let Some(token) = &endpoint.bearer_token {
            return Ok(HttpAuth::BearerToken(token.clone()));
        }
        if endpoint.has_basic_auth() {
            return Ok(HttpAuth::Basic {
                username: endpoint.username.clone().unwrap_or_default(),
                password: endpoint.password.clone().unwrap_or_default(),
            });
        }
        if !config.require_authentication {
            return Ok(HttpAuth::None);
        }
        match config.authentication_method {
            AuthMethod::None => Ok(HttpAuth::None),
            AuthMethod::BearerToken => {
                let token = self.secrets.bearer_token(config).await.map_err(|err| {
                    AttemptError::Transient(format!("bearer token lookup failed: {err}"))
                })?;
                Ok(HttpAuth::BearerToken(token))
            }
            AuthMethod::CertFile => {
                let path = config
                    .additional_variables
                    .get("certFilePath")
                    .cloned()
                    .unwrap_or_default();
                let data = tokio::fs::read_to_string(&path).await.map_err(|err| {
                    AttemptError::Transient(format!("failed to read cert file '{path}': {err}"))
                })?;
                Ok(HttpAuth::BearerToken(data.trim_end().to_owned()))
            }
        }
    }

    async fn get(&self, url: String, auth: &HttpAuth) -> Result<HttpResponse, AttemptError> {
        let request = HttpRequest::get(url).with_auth(auth.clone());
        self.http
            .execute(request)
            .await
            .map_err(|err| AttemptError::Transient(format!("transport error: {err}")))
    }

    /// Cancellation-aware sleep; false means the token fired first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Strips a leading UTF-8 byte-order mark if present.
pub fn strip_bom(body: Vec<u8>) -> Vec<u8> {
    match body.strip_prefix(&UTF8_BOM) {
        Some(rest) => rest.to_vec(),
        None => body,
    }
}
