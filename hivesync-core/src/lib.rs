//! hivesync core library: store addressing, the async store boundary,
//! concrete stores and client configuration.
//!
//! - [`types`] — newtypes, [`StoreKey`], file tree entries
//! - [`store`] — [`AsyncStore`] plus [`MemoryStore`] and [`DirStore`]
//! - [`config`] — [`ClientConfig`] load / save
//! - [`error`] — [`StoreError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::ClientConfig;
pub use error::{ConfigError, StoreError};
pub use store::{AsyncStore, DirStore, GetResponse, MemoryStore};
pub use types::{
    content_keys, ContentKey, FileTreeNode, LocalEntry, LocationKey, ReplicaId, StoreKey,
    TreeEntry, UserId,
};
