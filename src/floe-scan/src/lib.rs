//! Engine-facing datasource surface.
//!
//! A [`Datasource`] turns a fragment-organized dataset into a list of
//! [`ReadTask`]s: deferred, independently invokable producers of columnar
//! batch sequences, each paired with precomputed [`BlockMetadata`]. The host
//! engine owns all scheduling; nothing here spawns or blocks beyond the
//! retry loop's backoff sleeps.

mod datasource;
mod fragment_source;
mod retry;
mod split;

use common_error::FloeError;
use snafu::Snafu;

pub use datasource::{BlockMetadata, Datasource, ExecStats, ReadFn, ReadTask};
pub use fragment_source::{
    read_fragments_with_retry, FragmentDatasource, READ_FRAGMENTS_ERRORS_TO_RETRY,
    READ_FRAGMENTS_MAX_ATTEMPTS, READ_FRAGMENTS_RETRY_MAX_BACKOFF,
};
pub use retry::{AttemptFn, RetryParams, RetryingBatchIterator};
pub use split::split_into_groups;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{description} failed after {attempts} attempts: {source}"))]
    RetriesExhausted {
        description: String,
        attempts: usize,
        source: common_error::GenericError,
    },
}

impl From<Error> for FloeError {
    fn from(err: Error) -> Self {
        Self::External(err.into())
    }
}
