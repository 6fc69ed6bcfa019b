#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod intercept;
pub mod result_storage;
pub mod storage;
pub mod store;

#[doc(inline)]
pub use crate::backend::RedisStore;
#[doc(inline)]
pub use crate::config::{ConnectionConfig, RedisConfig, RedisMode, StorageKind};
#[doc(inline)]
pub use crate::connection::{
    Connect, ConnectionRegistry, ConnectionResolver, RedisConnector, Sharing, Topology,
};
#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::result_storage::{RedisResultStorage, RedisResultStorageBuilder};
#[doc(inline)]
pub use crate::storage::{RedisStorage, RedisStorageBuilder};
#[doc(inline)]
pub use crate::store::KeyValueStore;
