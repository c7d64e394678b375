use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const COLUMNS_KEY: &str = "columns";
pub const FILTER_KEY: &str = "filter";
pub const BATCH_SIZE_KEY: &str = "batch_size";

/// Scan configuration bag, merged once at datasource construction and then
/// cloned per scan invocation (the fragment-injection step must never mutate
/// options shared with other concurrent invocations).
///
/// All fields are plain transferable values so a clone can cross a process
/// boundary along with the read task that owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Column projection. Applied to scanned data only; block metadata keeps
    /// the unprojected schema.
    pub columns: Option<Vec<String>>,
    /// Row filter expression, in the backend's filter dialect.
    pub filter: Option<String>,
    /// Fragment selection. Set per read task; always overwrites whatever the
    /// caller left here.
    pub fragment_ids: Option<Vec<u64>>,
    /// Backend-specific scan parameters (e.g. `batch_size`).
    pub extra: IndexMap<String, serde_json::Value>,
}

impl ScanOptions {
    /// Sets the projection, shadowing any `columns` entry in `extra`.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.extra.shift_remove(COLUMNS_KEY);
        self.columns = Some(columns);
        self
    }

    /// Sets the row filter, shadowing any `filter` entry in `extra`.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.extra.shift_remove(FILTER_KEY);
        self.filter = Some(filter.into());
        self
    }

    pub fn with_fragment_ids(mut self, fragment_ids: Vec<u64>) -> Self {
        self.fragment_ids = Some(fragment_ids);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Requested output batch size, if configured in `extra`.
    pub fn batch_size(&self) -> Option<usize> {
        self.extra
            .get(BATCH_SIZE_KEY)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_columns_shadow_extra_entry() {
        let options = ScanOptions::default()
            .with_extra(COLUMNS_KEY, serde_json::json!(["stale"]))
            .with_columns(vec!["id".to_string()]);
        assert_eq!(options.columns, Some(vec!["id".to_string()]));
        assert!(!options.extra.contains_key(COLUMNS_KEY));
    }

    #[test]
    fn explicit_filter_shadows_extra_entry() {
        let options = ScanOptions::default()
            .with_extra(FILTER_KEY, "stale")
            .with_filter("id > 3");
        assert_eq!(options.filter.as_deref(), Some("id > 3"));
        assert!(!options.extra.contains_key(FILTER_KEY));
    }

    #[test]
    fn unrelated_extra_entries_survive_merging() {
        let options = ScanOptions::default()
            .with_extra(BATCH_SIZE_KEY, 64u64)
            .with_columns(vec!["id".to_string()])
            .with_filter("true");
        assert_eq!(options.batch_size(), Some(64));
    }

    #[test]
    fn batch_size_ignores_non_integer_values() {
        let options = ScanOptions::default().with_extra(BATCH_SIZE_KEY, "lots");
        assert_eq!(options.batch_size(), None);
    }

    #[test]
    fn options_round_trip_through_serde() {
        let options = ScanOptions::default()
            .with_columns(vec!["id".to_string()])
            .with_filter("id <= 10")
            .with_fragment_ids(vec![1, 4])
            .with_extra(BATCH_SIZE_KEY, 8u64);
        let json = serde_json::to_string(&options).unwrap();
        let back: ScanOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
