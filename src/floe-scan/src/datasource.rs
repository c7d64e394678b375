use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use arrow::datatypes::SchemaRef;
use common_error::FloeResult;
use floe_dataset::BatchIterator;

/// Post-execution statistics. Populated by the engine after it has drained a
/// task, never by the datasource that produced the task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub wall_time: Option<Duration>,
    pub cpu_time: Option<Duration>,
}

/// Lightweight pre-execution description of one read task's expected output.
#[derive(Debug, Clone)]
pub struct BlockMetadata {
    /// Sum of the group's fragment-metadata row counts, computed without a
    /// data scan. Deliberately unfiltered: when a row filter is configured
    /// this can overstate the rows the task actually yields.
    pub num_rows: usize,
    /// Schema of the group's first fragment, assumed uniform across the
    /// whole group (not verified) and not adjusted for column projection.
    pub schema: SchemaRef,
    /// Backing files of every fragment in the group, fragment order preserved.
    pub input_files: Vec<String>,
    /// Always `None`: in-memory size estimation is deferred. Treat the
    /// absence of an estimate as "use default heuristics", never as zero.
    pub size_bytes: Option<usize>,
    /// Always `None` until the engine has executed the task.
    pub exec_stats: Option<ExecStats>,
}

pub type ReadFn = Arc<dyn Fn() -> FloeResult<BatchIterator> + Send + Sync>;

/// A deferred unit of read work: precomputed metadata plus a zero-argument
/// producer of a batch sequence.
///
/// The producer captures only transferable descriptors and the shared
/// read-only dataset handle, never a live scanner, so the task can be
/// invoked on whichever worker the engine picks.
#[derive(Clone)]
pub struct ReadTask {
    metadata: BlockMetadata,
    read_fn: ReadFn,
}

impl ReadTask {
    pub fn new(read_fn: ReadFn, metadata: BlockMetadata) -> Self {
        Self { metadata, read_fn }
    }

    pub fn metadata(&self) -> &BlockMetadata {
        &self.metadata
    }

    /// Runs the read. Every call re-scans storage and returns a fresh,
    /// independent, fully-drainable sequence; sequences are never shared
    /// between calls. Results across calls agree only as long as the
    /// underlying dataset version has not moved.
    pub fn execute(&self) -> FloeResult<BatchIterator> {
        (self.read_fn)()
    }
}

impl Debug for ReadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTask")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// A pluggable source of read tasks for the batch engine.
pub trait Datasource: Debug + Send + Sync {
    /// Splits the source into at most `parallelism` read tasks. Fewer tasks
    /// are returned when the source cannot fill the requested parallelism;
    /// empty tasks are never returned.
    fn get_read_tasks(&self, parallelism: usize) -> FloeResult<Vec<ReadTask>>;

    /// Estimated in-memory size of the source's data, if one is available.
    fn estimate_inmemory_data_size(&self) -> Option<usize>;

    fn multiline_display(&self) -> Vec<String>;
}
