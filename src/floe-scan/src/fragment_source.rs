use std::sync::Arc;
use std::time::Duration;

use common_context::DataContext;
use common_error::{FloeError, FloeResult};
use floe_dataset::{open_dataset, BatchIterator, DatasetRef, ScanOptions, StorageOptions};

use crate::datasource::{BlockMetadata, Datasource, ReadFn, ReadTask};
use crate::retry::{AttemptFn, RetryParams, RetryingBatchIterator};
use crate::split::split_into_groups;

/// Error-message signatures always treated as transient when reading
/// fragments, regardless of engine configuration.
pub const READ_FRAGMENTS_ERRORS_TO_RETRY: &[&str] = &["DatasetError(IO)"];
/// Total attempts per read-task invocation, first try included.
pub const READ_FRAGMENTS_MAX_ATTEMPTS: usize = 10;
pub const READ_FRAGMENTS_RETRY_MAX_BACKOFF: Duration = Duration::from_secs(32);

const READ_FRAGMENTS_RETRY_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// A [`Datasource`] over a fragment-organized dataset.
///
/// Construction opens the dataset eagerly (and without retry, so
/// configuration mistakes surface immediately); everything else is deferred
/// into the read tasks. The retry policy is snapshotted from the current
/// [`DataContext`] at construction time and travels with every task.
#[derive(Debug)]
pub struct FragmentDatasource {
    uri: String,
    dataset: DatasetRef,
    scan_options: ScanOptions,
    retry_params: RetryParams,
}

impl FragmentDatasource {
    pub fn try_new(
        uri: &str,
        columns: Option<Vec<String>>,
        filter: Option<String>,
        storage_options: Option<StorageOptions>,
        scanner_options: Option<ScanOptions>,
    ) -> FloeResult<Self> {
        let dataset = open_dataset(uri, storage_options)?;

        let mut scan_options = scanner_options.unwrap_or_default();
        if let Some(columns) = columns {
            scan_options = scan_options.with_columns(columns);
        }
        if let Some(filter) = filter {
            scan_options = scan_options.with_filter(filter);
        }

        let mut match_substrings: Vec<String> = READ_FRAGMENTS_ERRORS_TO_RETRY
            .iter()
            .map(ToString::to_string)
            .collect();
        match_substrings.extend(DataContext::get_current().retried_io_errors.iter().cloned());
        let retry_params = RetryParams {
            description: "read dataset fragments".to_string(),
            match_substrings,
            max_attempts: READ_FRAGMENTS_MAX_ATTEMPTS,
            initial_backoff: READ_FRAGMENTS_RETRY_INITIAL_BACKOFF,
            max_backoff: READ_FRAGMENTS_RETRY_MAX_BACKOFF,
        };

        Ok(Self {
            uri: uri.to_string(),
            dataset,
            scan_options,
            retry_params,
        })
    }

    pub fn retry_params(&self) -> &RetryParams {
        &self.retry_params
    }
}

impl Datasource for FragmentDatasource {
    fn get_read_tasks(&self, parallelism: usize) -> FloeResult<Vec<ReadTask>> {
        if parallelism == 0 {
            return Err(FloeError::InvalidArgument(
                "parallelism must be positive".to_string(),
            ));
        }
        let fragments = self.dataset.get_fragments()?;
        let mut tasks = Vec::with_capacity(parallelism.min(fragments.len()));
        for group in split_into_groups(&fragments, parallelism) {
            if group.is_empty() {
                continue;
            }
            let fragment_ids: Vec<u64> = group.iter().map(|f| f.id()).collect();
            let mut num_rows = 0;
            for fragment in &group {
                num_rows += fragment.count_rows()?;
            }
            let input_files = group.iter().flat_map(|f| f.data_files()).collect();
            let metadata = BlockMetadata {
                num_rows,
                schema: group[0].schema(),
                input_files,
                size_bytes: None,
                exec_stats: None,
            };

            let dataset = self.dataset.clone();
            let scan_options = self.scan_options.clone();
            let retry_params = self.retry_params.clone();
            let read_fn: ReadFn = Arc::new(move || {
                read_fragments_with_retry(
                    fragment_ids.clone(),
                    dataset.clone(),
                    scan_options.clone(),
                    retry_params.clone(),
                )
            });
            tasks.push(ReadTask::new(read_fn, metadata));
        }
        Ok(tasks)
    }

    fn estimate_inmemory_data_size(&self) -> Option<usize> {
        None
    }

    fn multiline_display(&self) -> Vec<String> {
        let mut lines = vec![format!("FragmentDatasource: {}", self.uri)];
        if let Some(columns) = &self.scan_options.columns {
            lines.push(format!("Projection = [{}]", columns.join(", ")));
        }
        if let Some(filter) = &self.scan_options.filter {
            lines.push(format!("Filter = {filter}"));
        }
        lines
    }
}

/// Reads the given fragments as a retrying batch sequence. A transient
/// failure anywhere, scanner construction included, restarts the whole read
/// under the policy in `retry_params`.
pub fn read_fragments_with_retry(
    fragment_ids: Vec<u64>,
    dataset: DatasetRef,
    options: ScanOptions,
    retry_params: RetryParams,
) -> FloeResult<BatchIterator> {
    let attempt: AttemptFn = Box::new(move || read_fragments(&fragment_ids, &dataset, &options));
    Ok(Box::new(RetryingBatchIterator::new(attempt, retry_params)))
}

fn read_fragments(
    fragment_ids: &[u64],
    dataset: &DatasetRef,
    options: &ScanOptions,
) -> FloeResult<BatchIterator> {
    // Re-resolve every fragment by id so a stale selection fails the attempt
    // up front rather than partway through the scan.
    for id in fragment_ids {
        dataset.get_fragment(*id)?;
    }
    let options = options.clone().with_fragment_ids(fragment_ids.to_vec());
    dataset.scanner(&options)
}
