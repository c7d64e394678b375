//! In-memory reference backend.
//!
//! Datasets are named, immutable fragment lists registered in a
//! process-local registry and addressed as `memory://<name>`. Besides being
//! the reference implementation of the [`Dataset`] seam, this backend can
//! inject failures on demand, which is how the retry path gets exercised
//! without a flaky object store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use common_error::FloeResult;
use lazy_static::lazy_static;

use crate::filter::Predicate;
use crate::{
    BatchIterator, Dataset, DatasetBackend, DatasetRef, Error, Fragment, FragmentRef, ScanOptions,
    StorageOptions,
};

lazy_static! {
    static ref MEMORY_DATASETS: RwLock<HashMap<String, Arc<MemoryDataset>>> =
        RwLock::new(HashMap::new());
}

/// Resolves `memory://` URIs against the process-local registry. Storage
/// options are accepted and ignored; there are no credentials in memory.
#[derive(Debug)]
pub(crate) struct MemoryBackend;

impl DatasetBackend for MemoryBackend {
    fn open(&self, uri: &str, _storage_options: &StorageOptions) -> FloeResult<DatasetRef> {
        let name = uri
            .strip_prefix("memory://")
            .map(|n| n.trim_end_matches('/'))
            .unwrap_or_default();
        let found = MEMORY_DATASETS
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned();
        match found {
            Some(ds) => Ok(ds),
            None => Err(Error::DatasetNotFound {
                uri: uri.to_string(),
            }
            .into()),
        }
    }
}

pub struct MemoryDatasetBuilder {
    name: String,
    schema: SchemaRef,
    fragments: Vec<Vec<RecordBatch>>,
}

impl MemoryDatasetBuilder {
    pub fn new(name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema,
            fragments: Vec::new(),
        }
    }

    /// Appends one fragment holding `batches`. Fragment ids are assigned in
    /// insertion order, starting at 0.
    pub fn add_fragment(mut self, batches: Vec<RecordBatch>) -> Self {
        self.fragments.push(batches);
        self
    }

    /// Registers the dataset under `memory://<name>`, replacing any previous
    /// dataset with the same name, and returns the live handle.
    pub fn build(self) -> Arc<MemoryDataset> {
        let uri = format!("memory://{}", self.name);
        let fragments = self
            .fragments
            .into_iter()
            .enumerate()
            .map(|(id, batches)| {
                let id = id as u64;
                let files = (0..batches.len())
                    .map(|part| format!("{uri}/fragment-{id}/part-{part}.floe"))
                    .collect();
                Arc::new(MemoryFragment {
                    id,
                    schema: self.schema.clone(),
                    batches,
                    files,
                })
            })
            .collect();
        let dataset = Arc::new(MemoryDataset {
            uri,
            schema: self.schema,
            fragments,
            injection: Mutex::new(InjectionState::default()),
        });
        MEMORY_DATASETS
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(self.name, dataset.clone());
        dataset
    }
}

#[derive(Debug)]
struct MemoryFragment {
    id: u64,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    files: Vec<String>,
}

impl Fragment for MemoryFragment {
    fn id(&self) -> u64 {
        self.id
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn count_rows(&self) -> FloeResult<usize> {
        Ok(self.batches.iter().map(RecordBatch::num_rows).sum())
    }

    fn data_files(&self) -> Vec<String> {
        self.files.clone()
    }
}

#[derive(Debug, Default)]
struct InjectionState {
    scan_attempts: usize,
    fail_scans: usize,
    scan_fail_message: String,
    iteration: Option<IterationFailure>,
}

#[derive(Debug)]
struct IterationFailure {
    at_batch: usize,
    remaining_attempts: usize,
    message: String,
}

#[derive(Debug)]
pub struct MemoryDataset {
    uri: String,
    schema: SchemaRef,
    fragments: Vec<Arc<MemoryFragment>>,
    injection: Mutex<InjectionState>,
}

impl MemoryDataset {
    /// Makes the next `attempts` scanner constructions fail with `message`.
    pub fn fail_next_scans(&self, attempts: usize, message: &str) {
        let mut state = self.injection.lock().unwrap_or_else(|p| p.into_inner());
        state.fail_scans = attempts;
        state.scan_fail_message = message.to_string();
    }

    /// Makes the next `attempts` scanners fail mid-iteration, right before
    /// emitting batch `at_batch` (0-based), with `message`.
    pub fn fail_in_iteration(&self, at_batch: usize, attempts: usize, message: &str) {
        let mut state = self.injection.lock().unwrap_or_else(|p| p.into_inner());
        state.iteration = Some(IterationFailure {
            at_batch,
            remaining_attempts: attempts,
            message: message.to_string(),
        });
    }

    /// Total number of scanner constructions attempted against this dataset.
    pub fn scan_attempts(&self) -> usize {
        self.injection
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .scan_attempts
    }

    fn fragment(&self, id: u64) -> FloeResult<Arc<MemoryFragment>> {
        self.fragments
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| {
                Error::FragmentNotFound {
                    id,
                    uri: self.uri.clone(),
                }
                .into()
            })
    }
}

impl Dataset for MemoryDataset {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn get_fragments(&self) -> FloeResult<Vec<FragmentRef>> {
        Ok(self
            .fragments
            .iter()
            .map(|f| f.clone() as FragmentRef)
            .collect())
    }

    fn get_fragment(&self, id: u64) -> FloeResult<FragmentRef> {
        Ok(self.fragment(id)? as FragmentRef)
    }

    fn scanner(&self, options: &ScanOptions) -> FloeResult<BatchIterator> {
        let fail_at = {
            let mut state = self.injection.lock().unwrap_or_else(|p| p.into_inner());
            state.scan_attempts += 1;
            if state.fail_scans > 0 {
                state.fail_scans -= 1;
                return Err(Error::DatasetIo {
                    message: state.scan_fail_message.clone(),
                }
                .into());
            }
            match state.iteration.as_mut() {
                Some(failure) if failure.remaining_attempts > 0 => {
                    failure.remaining_attempts -= 1;
                    Some((failure.at_batch, failure.message.clone()))
                }
                _ => None,
            }
        };

        let fragments: Vec<Arc<MemoryFragment>> = match &options.fragment_ids {
            Some(ids) => ids
                .iter()
                .map(|id| self.fragment(*id))
                .collect::<FloeResult<_>>()?,
            None => self.fragments.clone(),
        };
        let predicate = options
            .filter
            .as_deref()
            .map(Predicate::parse)
            .transpose()?;
        let projection = match &options.columns {
            Some(columns) => {
                let mut indices = Vec::with_capacity(columns.len());
                for column in columns {
                    indices.push(self.schema.index_of(column)?);
                }
                Some(indices)
            }
            None => None,
        };

        let raw: Vec<RecordBatch> = fragments
            .iter()
            .flat_map(|f| f.batches.iter().cloned())
            .collect();
        Ok(Box::new(MemoryScanner {
            raw: raw.into_iter(),
            pending: VecDeque::new(),
            predicate,
            projection,
            batch_size: options.batch_size(),
            fail_at,
            emitted: 0,
        }))
    }
}

struct MemoryScanner {
    raw: std::vec::IntoIter<RecordBatch>,
    pending: VecDeque<RecordBatch>,
    predicate: Option<Predicate>,
    projection: Option<Vec<usize>>,
    batch_size: Option<usize>,
    fail_at: Option<(usize, String)>,
    emitted: usize,
}

impl MemoryScanner {
    fn process(&mut self, batch: RecordBatch) -> FloeResult<()> {
        let batch = match &self.predicate {
            Some(predicate) => predicate.apply(&batch)?,
            None => batch,
        };
        let batch = match &self.projection {
            Some(indices) => batch.project(indices)?,
            None => batch,
        };
        // Batches fully removed by the filter are dropped, not emitted.
        if batch.num_rows() == 0 {
            return Ok(());
        }
        match self.batch_size {
            Some(size) if size > 0 && batch.num_rows() > size => {
                let mut offset = 0;
                while offset < batch.num_rows() {
                    let len = size.min(batch.num_rows() - offset);
                    self.pending.push_back(batch.slice(offset, len));
                    offset += len;
                }
            }
            _ => self.pending.push_back(batch),
        }
        Ok(())
    }
}

impl Iterator for MemoryScanner {
    type Item = FloeResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((at_batch, message)) = self.fail_at.take() {
                if self.emitted == at_batch {
                    return Some(Err(Error::DatasetIo { message }.into()));
                }
                self.fail_at = Some((at_batch, message));
            }
            if let Some(batch) = self.pending.pop_front() {
                self.emitted += 1;
                return Some(Ok(batch));
            }
            let raw = self.raw.next()?;
            if let Err(e) = self.process(raw) {
                return Some(Err(e));
            }
        }
    }
}
