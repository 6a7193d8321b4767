//! Flat usage records and their cache keys.

/// Column schema shared by every decoded batch. The header row is always the
/// first row of a non-empty batch and is never treated as data.
pub const HEADER: [&str; 5] = ["ResourceId", "metricName", "timestamp", "average", "unit"];

/// Index of the numeric value column within a record.
pub const VALUE_COLUMN: usize = 3;

/// Cache key for a record: the verbatim space-joined row, value column
/// included. Because the value participates, a changed value yields a new
/// key and therefore a new series rather than an in-place update; keying on
/// identity fields only is pending product-owner signoff.
pub fn record_key(row: &[String]) -> String {
    row.join(" ")
}

/// A decoded batch: header row first, then one row per observed data point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordBatch {
    rows: Vec<Vec<String>>,
}

impl RecordBatch {
    /// Batch holding only the header row.
    pub fn with_header() -> Self {
        Self {
            rows: vec![HEADER.iter().map(|s| (*s).to_owned()).collect()],
        }
    }

    /// Batch with no rows at all; what a failed decode yields.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, row: [String; 5]) {
        self.rows.push(row.into());
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Number of data rows, excluding the header.
    pub fn data_len(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_space_joined_full_row() {
        let row: Vec<String> = ["vm-1", "Percentage CPU", "2024-01-01T00:00:00Z", "12.5", "Percent"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        assert_eq!(
            record_key(&row),
            "vm-1 Percentage CPU 2024-01-01T00:00:00Z 12.5 Percent"
        );
    }

    #[test]
    fn header_batch_has_no_data_rows() {
        let batch = RecordBatch::with_header();
        assert_eq!(batch.data_len(), 0);
        assert_eq!(batch.header().map(<[String]>::len), Some(5));
    }

    #[test]
    fn empty_batch_has_no_header() {
        let batch = RecordBatch::empty();
        assert!(batch.is_empty());
        assert!(batch.header().is_none());
    }
}
