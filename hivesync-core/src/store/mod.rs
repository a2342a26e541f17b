//! Client-side contract of the distributed key/value store.
//!
//! The store is eventually consistent: a successful `remove` only means the
//! contacted peers accepted it, not that every replica has dropped the value.
//! Callers that need certainty read the key back (see the removal verifier in
//! `hivesync-process`).

mod dir;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{ReplicaId, StoreKey};

pub use dir::DirStore;
pub use memory::MemoryStore;

/// Result of a `get`: what every answering replica holds for the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetResponse {
    pub entries: BTreeMap<ReplicaId, Option<Vec<u8>>>,
}

impl GetResponse {
    /// True when no replica holds a non-empty value. A response with zero
    /// replicas counts as absent.
    pub fn is_absent_everywhere(&self) -> bool {
        self.entries.values().all(|value| !is_present(value))
    }

    /// Number of replicas still holding a non-empty value.
    pub fn present_count(&self) -> usize {
        self.entries.values().filter(|value| is_present(value)).count()
    }

    /// First value any replica returned, in replica order. An empty value
    /// is still content (a zero-byte file); only removal checks treat it as
    /// absent.
    pub fn first_value(&self) -> Option<&[u8]> {
        self.entries.values().find_map(|value| value.as_deref())
    }
}

fn is_present(value: &Option<Vec<u8>>) -> bool {
    value.as_ref().map(|bytes| !bytes.is_empty()).unwrap_or(false)
}

/// Async put/get/remove against the distributed store.
#[async_trait]
pub trait AsyncStore: Send + Sync {
    async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, key: &StoreKey) -> Result<GetResponse, StoreError>;

    /// Acknowledged removal. The ack does not guarantee global visibility.
    async fn remove(&self, key: &StoreKey) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(values: &[Option<&[u8]>]) -> GetResponse {
        let entries = values
            .iter()
            .enumerate()
            .map(|(i, v)| (ReplicaId(format!("r{i}")), v.map(|b| b.to_vec())))
            .collect();
        GetResponse { entries }
    }

    #[test]
    fn empty_response_is_absent() {
        assert!(GetResponse::default().is_absent_everywhere());
    }

    #[test]
    fn empty_bytes_count_as_absent() {
        let resp = response(&[None, Some(b"")]);
        assert!(resp.is_absent_everywhere());
        assert_eq!(resp.present_count(), 0);
    }

    #[test]
    fn empty_content_is_still_a_value() {
        let resp = response(&[None, Some(b""), Some(b"later")]);
        assert_eq!(resp.first_value(), Some(&b""[..]));
        assert_eq!(response(&[None, None]).first_value(), None);
    }

    #[test]
    fn one_stale_replica_is_enough_to_be_present() {
        let resp = response(&[None, Some(b"stale"), None]);
        assert!(!resp.is_absent_everywhere());
        assert_eq!(resp.present_count(), 1);
        assert_eq!(resp.first_value(), Some(&b"stale"[..]));
    }
}
