//! Metric cache and the per-cycle reconciliation pass.

use std::collections::HashMap;

use prometheus::{Gauge, Opts, Registry};
use tracing::warn;

use crate::error::ReconcileError;
use crate::record::{record_key, RecordBatch, VALUE_COLUMN};

/// A registered series paired with the row that created it.
#[derive(Debug, Clone)]
pub struct GaugeEntry {
    pub record: Vec<String>,
    pub gauge: Gauge,
}

/// Owned mapping from record key to its registered series. Created once by
/// the poll driver and mutated only inside [`reconcile`]; entries are never
/// evicted, so a provider that stops reporting a resource leaves its
/// last-known gauge exposed.
#[derive(Debug, Default)]
pub struct MetricCache {
    entries: HashMap<String, GaugeEntry>,
}

impl MetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&GaugeEntry> {
        self.entries.get(key)
    }
}

/// Validated name and label set for a dynamically created series. Metric and
/// label names derive from runtime data (the provider name and the batch
/// header), so they are checked against Prometheus naming rules before
/// anything touches the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDescriptor {
    name: String,
    labels: Vec<(String, String)>,
}

impl SeriesDescriptor {
    /// Builds a descriptor from the batch header and one data row. Label
    /// names come from the header, label values from the row; the gauge name
    /// is the provider name (sanitized) plus the row ordinal.
    pub fn from_row(
        provider: &str,
        ordinal: usize,
        header: &[String],
        row: &[String],
    ) -> Result<Self, ReconcileError> {
        if row.len() != header.len() {
            return Err(ReconcileError::RowShape {
                got: row.len(),
                want: header.len(),
            });
        }
        for name in header {
            if !valid_label_name(name) {
                return Err(ReconcileError::InvalidLabelName(name.clone()));
            }
        }
        Ok(Self {
            name: format!("usage_{}_{ordinal}", sanitize(provider)),
            labels: header.iter().cloned().zip(row.iter().cloned()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    fn build_gauge(&self) -> Result<Gauge, ReconcileError> {
        let mut opts = Opts::new(
            self.name.clone(),
            "usage record scraped from the provider API",
        );
        for (name, value) in &self.labels {
            opts = opts.const_label(name.clone(), value.clone());
        }
        Ok(Gauge::with_opts(opts)?)
    }
}

fn sanitize(provider: &str) -> String {
    provider
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Reconciles a fully decoded batch against the cache and registry.
///
/// Existing keys get their gauge set to the row's value; unseen keys create
/// and register a new gauge. Rows with a non-numeric value column are logged
/// and skipped, leaving cache and registry untouched for that key. Nothing
/// is ever removed.
pub fn reconcile(
    cache: &mut MetricCache,
    registry: &Registry,
    provider: &str,
    batch: &RecordBatch,
) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    let Some(header) = batch.header().map(<[String]>::to_vec) else {
        return summary;
    };

    // Row 0 is the header.
    for (ordinal, row) in batch.rows().iter().enumerate().skip(1) {
        let value_text = row.get(VALUE_COLUMN).map(String::as_str).unwrap_or("");
        let value: f64 = match value_text.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(ordinal, value = value_text, "non-numeric value column, skipping row");
                summary.skipped += 1;
                continue;
            }
        };

        let key = record_key(row);
        if let Some(entry) = cache.entries.get(&key) {
            entry.gauge.set(value);
            summary.updated += 1;
            continue;
        }

        let descriptor = match SeriesDescriptor::from_row(provider, ordinal, &header, row) {
            Ok(d) => d,
            Err(err) => {
                warn!(ordinal, error = %err, "invalid series descriptor, skipping row");
                summary.skipped += 1;
                continue;
            }
        };
        let gauge = match descriptor.build_gauge() {
            Ok(g) => g,
            Err(err) => {
                warn!(ordinal, error = %err, "gauge construction failed, skipping row");
                summary.skipped += 1;
                continue;
            }
        };
        if let Err(err) = registry.register(Box::new(gauge.clone())) {
            warn!(ordinal, error = %err, "gauge registration failed, skipping row");
            summary.skipped += 1;
            continue;
        }
        gauge.set(value);
        cache.entries.insert(
            key,
            GaugeEntry {
                record: row.clone(),
                gauge,
            },
        );
        summary.created += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        crate::record::HEADER.iter().map(|s| (*s).to_owned()).collect()
    }

    fn row() -> Vec<String> {
        ["vm-1", "Percentage CPU", "2024-01-01T00:00:00Z", "12.5", "Percent"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
    }

    #[test]
    fn descriptor_sanitizes_provider_name() {
        let descriptor = SeriesDescriptor::from_row("azure-vm", 1, &header(), &row()).unwrap();
        assert_eq!(descriptor.name(), "usage_azure_vm_1");
        assert_eq!(descriptor.labels().len(), 5);
    }

    #[test]
    fn descriptor_rejects_short_rows() {
        let short = vec![String::from("only-one-field")];
        let err = SeriesDescriptor::from_row("p", 1, &header(), &short).unwrap_err();
        assert!(matches!(err, ReconcileError::RowShape { got: 1, want: 5 }));
    }

    #[test]
    fn label_name_validation() {
        assert!(valid_label_name("metricName"));
        assert!(valid_label_name("_internal"));
        assert!(!valid_label_name("9starts_with_digit"));
        assert!(!valid_label_name("has-dash"));
        assert!(!valid_label_name(""));
    }
}
