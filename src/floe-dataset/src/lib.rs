//! Dataset-access seam for Floe.
//!
//! The on-disk layout, fragment discovery, and scan execution of a columnar
//! dataset format all live behind the [`Dataset`]/[`Fragment`] traits here.
//! Backends register themselves per URI scheme; [`open_dataset`] is the
//! single entry point for acquiring a live handle.

mod dataset;
mod filter;
pub mod memory;
mod options;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common_error::{FloeError, FloeResult};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use snafu::Snafu;

pub use dataset::{BatchIterator, Dataset, DatasetBackend, DatasetRef, Fragment, FragmentRef};
pub use memory::{MemoryDataset, MemoryDatasetBuilder};
pub use options::ScanOptions;

/// Storage credentials and related per-connection settings, passed through
/// to the backend opening the dataset.
pub type StorageOptions = IndexMap<String, String>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "Unsupported dataset URI scheme \"{scheme}\": no dataset backend is registered or enabled for it"
    ))]
    UnsupportedScheme { scheme: String },

    #[snafu(display("Invalid dataset URI \"{uri}\": {source}"))]
    InvalidUri {
        uri: String,
        source: url::ParseError,
    },

    #[snafu(display("No dataset registered at {uri}"))]
    DatasetNotFound { uri: String },

    #[snafu(display("Fragment {id} does not exist in dataset {uri}"))]
    FragmentNotFound { id: u64, uri: String },

    #[snafu(display("DatasetError(IO): {message}"))]
    DatasetIo { message: String },

    #[snafu(display("Invalid filter expression \"{expression}\": {reason}"))]
    InvalidFilter { expression: String, reason: String },
}

impl From<Error> for FloeError {
    fn from(err: Error) -> Self {
        match err {
            Error::DatasetNotFound { uri } => Self::DatasetNotFound {
                path: uri,
                source: "no dataset registered under this URI".to_string().into(),
            },
            _ => Self::External(err.into()),
        }
    }
}

lazy_static! {
    static ref BACKENDS: RwLock<HashMap<String, Arc<dyn DatasetBackend>>> =
        RwLock::new(HashMap::new());
}

/// Registers `backend` for a URI scheme, replacing any previous registration.
pub fn register_backend(scheme: impl Into<String>, backend: Arc<dyn DatasetBackend>) {
    BACKENDS
        .write()
        .unwrap_or_else(|p| p.into_inner())
        .insert(scheme.into().to_lowercase(), backend);
}

/// Opens a live handle to the dataset at `uri`.
///
/// The scheme selects the backend: `memory://` resolves against the
/// process-local registry of in-memory datasets, anything else must have
/// been registered through [`register_backend`]. Failures here (unknown
/// scheme, missing dataset, bad credentials) propagate as-is and are never
/// retried.
pub fn open_dataset(uri: &str, storage_options: Option<StorageOptions>) -> FloeResult<DatasetRef> {
    let parsed = url::Url::parse(uri).map_err(|source| Error::InvalidUri {
        uri: uri.to_string(),
        source,
    })?;
    let scheme = parsed.scheme().to_lowercase();
    let storage_options = storage_options.unwrap_or_default();
    if scheme == "memory" {
        return memory::MemoryBackend.open(uri, &storage_options);
    }
    let backend = BACKENDS
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .get(&scheme)
        .cloned();
    match backend {
        Some(backend) => backend.open(uri, &storage_options),
        None => Err(Error::UnsupportedScheme { scheme }.into()),
    }
}
