mod error;

pub use error::{FloeError, FloeResult, GenericError};
