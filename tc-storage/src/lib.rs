#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod error;
mod request;
mod storage;

pub use error::{StorageError, StorageResult};
pub use request::{RequestParameters, ServerParameters};
pub use storage::{ResultStorage, Storage};

/// Raw image bytes as handed over by the host.
pub type Raw = bytes::Bytes;
