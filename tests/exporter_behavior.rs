//! End-to-end behavior of the poll cycle: config in, registry out.

use std::sync::Arc;
use std::time::Duration;

use costwatch_core::{
    Endpoint, ExporterConfig, Fetcher, HttpResponse, MetricCache, Poller, RetryPolicy,
    ScriptedHttpClient, StaticConfigSource, StaticResolver, StaticSecretStore,
};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;

const AZURE_VM_CONFIG: &str = r#"
provider:
  name: azure-vm
url: https://management.example.test/<ResourceId>/metrics
additionalVariables:
  ResourceId: vm-1
pollingIntervalSeconds: 300
"#;

fn azure_vm_config() -> ExporterConfig {
    costwatch_core::config::parse(AZURE_VM_CONFIG).expect("valid config")
}

fn poller_with(
    client: Arc<ScriptedHttpClient>,
    config: ExporterConfig,
    cancel: CancellationToken,
) -> (Poller, Registry, Arc<StaticResolver>) {
    let resolver = Arc::new(StaticResolver::new(Endpoint {
        server_url: String::from("https://management.example.test/vm-1/metrics"),
        ..Endpoint::default()
    }));
    let registry = Registry::new();
    let fetcher = Fetcher::new(
        client,
        resolver.clone(),
        Arc::new(StaticSecretStore(String::from("unused"))),
        RetryPolicy::default(),
        cancel.clone(),
    );
    let poller = Poller::new(
        Arc::new(StaticConfigSource::new(config)),
        fetcher,
        registry.clone(),
        MetricCache::new(),
        cancel,
    );
    (poller, registry, resolver)
}

#[tokio::test(start_paused = true)]
async fn one_cycle_exposes_the_decoded_series() {
    // Given: a provider responding with one CPU data point
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_response(HttpResponse::ok(
        r#"{
            "value": [{
                "name": {"value": "Percentage CPU", "localizedValue": "Percentage CPU"},
                "unit": "Percent",
                "timeseries": [{
                    "data": [{"timeStamp": "2024-03-01T12:00:00Z", "average": 12.5}]
                }]
            }]
        }"#,
    ));
    let config = azure_vm_config();
    let (mut poller, registry, _) = poller_with(client, config.clone(), CancellationToken::new());

    // When: one cycle runs
    let summary = poller.run_cycle(&config).await.expect("cycle succeeds");

    // Then: exactly one series is registered, labeled from the record
    assert_eq!(summary.created, 1);
    let families = registry.gather();
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].get_name(), "usage_azure_vm_1");

    let metric = &families[0].get_metric()[0];
    assert_eq!(metric.get_gauge().get_value(), 12.5);
    let label = metric
        .get_label()
        .iter()
        .find(|pair| pair.get_name() == "metricName")
        .expect("metricName label");
    assert_eq!(label.get_value(), "Percentage CPU");
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_is_non_fatal_and_applies_an_empty_batch() {
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_response(HttpResponse::ok("<html>gateway error</html>"));
    let config = azure_vm_config();
    let (mut poller, registry, _) = poller_with(client, config.clone(), CancellationToken::new());

    let summary = poller.run_cycle(&config).await.expect("cycle still succeeds");

    assert_eq!(summary, costwatch_core::ReconcileSummary::default());
    assert!(registry.gather().is_empty());
    assert!(poller.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_cycle_with_identical_data_updates_in_place() {
    let payload = r#"{
        "value": [{
            "name": {"value": "Percentage CPU"},
            "unit": "Percent",
            "timeseries": [{"data": [{"timeStamp": "2024-03-01T12:00:00Z", "average": 12.5}]}]
        }]
    }"#;
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_response(HttpResponse::ok(payload));
    client.push_response(HttpResponse::ok(payload));
    let config = azure_vm_config();
    let (mut poller, registry, _) = poller_with(client, config.clone(), CancellationToken::new());

    let first = poller.run_cycle(&config).await.expect("first cycle");
    let second = poller.run_cycle(&config).await.expect("second cycle");

    assert_eq!(first.created, 1);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(poller.cache().len(), 1);
    assert_eq!(registry.gather().len(), 1);
}

#[test]
fn file_config_source_sees_rewrites_between_cycles() {
    use costwatch_core::ConfigSource;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, AZURE_VM_CONFIG).expect("write config");

    let source = costwatch_core::FileConfigSource::new(&path);
    let first = source.load().expect("initial load");
    assert_eq!(first.polling_interval(), Duration::from_secs(300));

    let rewritten = AZURE_VM_CONFIG.replace("pollingIntervalSeconds: 300", "pollingIntervalSeconds: 60");
    std::fs::write(&path, rewritten).expect("rewrite config");
    let second = source.load().expect("reload");
    assert_eq!(second.polling_interval(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn run_loop_stops_when_the_token_cancels() {
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_response(HttpResponse::ok(r#"{"value":[]}"#));

    let cancel = CancellationToken::new();
    let (poller, _registry, _) = poller_with(client, azure_vm_config(), cancel.clone());

    let handle = tokio::spawn(poller.run());
    // Let the first cycle complete and the interval sleep begin.
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("loop stops after cancellation")
        .expect("poll task joins cleanly");
}
