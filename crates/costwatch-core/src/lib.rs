//! # costwatch-core
//!
//! The poll-retry-reconcile engine behind the costwatch usage exporter: it
//! periodically pulls usage/cost data from a billing provider API, decodes
//! the response into flat records, and keeps a Prometheus registry
//! synchronized with the latest observed value per record key.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`vars`] | `<name>` placeholder substitution with environment fallback |
//! | [`config`] | Exporter configuration model and reload seam |
//! | [`endpoint`] | Resolved fetch targets and the resolution seam |
//! | [`http_client`] | HTTP transport abstraction (reqwest + scripted mock) |
//! | [`secrets`] | Credential lookup seam |
//! | [`fetch`] | Retry loop and the HTTP 202 deferred-result protocol |
//! | [`decode`] | Provider payload decoding into record batches |
//! | [`record`] | Flat records, batch schema, cache keys |
//! | [`reconcile`] | Metric cache and the reconciliation pass |
//! | [`poll`] | The cycle driver |
//! | [`error`] | Error taxonomy |
//!
//! ## Control flow
//!
//! ```text
//! Poller -> EndpointResolver -> Fetcher -> decode -> reconcile -> Registry
//! ```
//!
//! A single task owns the pipeline and the cache; the registry alone is
//! shared with the scrape endpoint and carries its own synchronization.

pub mod config;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod poll;
pub mod reconcile;
pub mod record;
pub mod secrets;
pub mod vars;

pub use config::{
    AuthMethod, ConfigSource, ExporterConfig, FileConfigSource, Provider, StaticConfigSource,
};
pub use endpoint::{ConfigResolver, Endpoint, EndpointResolver, StaticResolver};
pub use error::{
    ConfigError, DecodeError, FetchError, ReconcileError, ResolveError, SecretError,
    SubstitutionError,
};
pub use fetch::{strip_bom, Fetcher, RetryPolicy};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};
pub use poll::Poller;
pub use reconcile::{reconcile, GaugeEntry, MetricCache, ReconcileSummary, SeriesDescriptor};
pub use record::{record_key, RecordBatch, HEADER, VALUE_COLUMN};
pub use secrets::{EnvSecretStore, FileSecretStore, SecretFuture, SecretStore, StaticSecretStore};
pub use vars::substitute;
