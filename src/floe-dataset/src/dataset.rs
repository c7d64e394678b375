use std::fmt::Debug;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use common_error::FloeResult;

use crate::{ScanOptions, StorageOptions};

pub type FragmentRef = Arc<dyn Fragment>;
pub type DatasetRef = Arc<dyn Dataset>;

/// Lazy, finite, non-restartable sequence of columnar batches. Each item is
/// a single underlying batch, so peak memory stays bounded to one batch.
pub type BatchIterator = Box<dyn Iterator<Item = FloeResult<RecordBatch>> + Send>;

/// An immutable, independently addressable partition of a dataset's rows.
///
/// Fragments are identified by a stable integer id; the id is the only
/// fragment state that should cross a serialization boundary, since live
/// fragment objects are expensive (or impossible) to ship between workers.
pub trait Fragment: Debug + Send + Sync {
    fn id(&self) -> u64;
    fn schema(&self) -> SchemaRef;
    /// Row count from fragment metadata. Never triggers a full data scan.
    fn count_rows(&self) -> FloeResult<usize>;
    /// Backing file paths, in the fragment's own order.
    fn data_files(&self) -> Vec<String>;
}

/// An opened handle to a versioned, fragment-organized dataset.
///
/// Handles are read-only and safe to share across concurrent scan
/// invocations; implementations must not require external locking.
pub trait Dataset: Debug + Send + Sync {
    fn uri(&self) -> &str;
    fn schema(&self) -> SchemaRef;
    /// All fragments, in the order the underlying library reports them.
    fn get_fragments(&self) -> FloeResult<Vec<FragmentRef>>;
    /// Re-resolves a fragment by id. Ids are stable for the lifetime of the
    /// handle at a given dataset version.
    fn get_fragment(&self, id: u64) -> FloeResult<FragmentRef>;
    /// Builds a scanner applying the projection, filter, fragment selection,
    /// and any backend-specific extra parameters in `options`.
    fn scanner(&self, options: &ScanOptions) -> FloeResult<BatchIterator>;
}

/// Opens dataset handles for one URI scheme. See [`crate::register_backend`].
pub trait DatasetBackend: Debug + Send + Sync {
    fn open(&self, uri: &str, storage_options: &StorageOptions) -> FloeResult<DatasetRef>;
}
