//! Remove-then-confirm against an eventually consistent store.
//!
//! A remove ack only says the contacted peers accepted it. The verifier reads
//! the key back after every remove and re-issues the remove while any replica
//! still returns data, up to `max_retries` extra attempts.

use std::sync::Arc;

use hivesync_core::{AsyncStore, StoreKey};

/// Terminal result of one removal. `attempts` counts issued removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Success { attempts: u32 },
    Failed { attempts: u32 },
}

impl RemovalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RemovalOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            RemovalOutcome::Success { attempts } | RemovalOutcome::Failed { attempts } => attempts,
        }
    }
}

/// Receives the terminal outcome of [`RemovalVerifier::remove_and_notify`].
pub trait RemovalListener: Send + Sync {
    fn on_remove_task_success(&self, key: &StoreKey);

    fn on_remove_task_failure(&self, key: &StoreKey, attempts: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalPhase {
    Removing,
    Verifying,
    Retrying,
    Succeeded,
    Failed,
}

/// Bounded remove-and-verify loop. Cheap to clone; holds no per-key state.
#[derive(Clone)]
pub struct RemovalVerifier {
    store: Arc<dyn AsyncStore>,
    max_retries: u32,
}

impl RemovalVerifier {
    pub fn new(store: Arc<dyn AsyncStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Remove `key` and confirm every replica dropped it.
    ///
    /// Issues at most `max_retries + 1` removes. No delay between attempts.
    pub async fn remove_and_verify(&self, key: &StoreKey) -> RemovalOutcome {
        let mut attempts = 0u32;
        let mut phase = RemovalPhase::Removing;

        loop {
            phase = match phase {
                RemovalPhase::Removing => {
                    attempts += 1;
                    // The ack is not trusted either way; the read decides.
                    if let Err(err) = self.store.remove(key).await {
                        tracing::debug!(key = %key, attempts, error = %err, "remove not acknowledged");
                    }
                    RemovalPhase::Verifying
                }
                RemovalPhase::Verifying => match self.store.get(key).await {
                    Ok(response) if response.is_absent_everywhere() => RemovalPhase::Succeeded,
                    Ok(response) => {
                        tracing::debug!(
                            key = %key,
                            attempts,
                            stale_replicas = response.present_count(),
                            "removal not converged",
                        );
                        RemovalPhase::Retrying
                    }
                    Err(err) => {
                        tracing::debug!(key = %key, attempts, error = %err, "verification read failed");
                        RemovalPhase::Retrying
                    }
                },
                RemovalPhase::Retrying => {
                    if attempts <= self.max_retries {
                        RemovalPhase::Removing
                    } else {
                        RemovalPhase::Failed
                    }
                }
                RemovalPhase::Succeeded => {
                    tracing::debug!(key = %key, attempts, "removal verified");
                    return RemovalOutcome::Success { attempts };
                }
                RemovalPhase::Failed => {
                    tracing::warn!(key = %key, attempts, "removal did not converge");
                    return RemovalOutcome::Failed { attempts };
                }
            };
        }
    }

    /// [`remove_and_verify`](Self::remove_and_verify), reporting the outcome
    /// to `listener` as well as returning it.
    pub async fn remove_and_notify(
        &self,
        key: &StoreKey,
        listener: &dyn RemovalListener,
    ) -> RemovalOutcome {
        let outcome = self.remove_and_verify(key).await;
        match outcome {
            RemovalOutcome::Success { .. } => listener.on_remove_task_success(key),
            RemovalOutcome::Failed { attempts } => listener.on_remove_task_failure(key, attempts),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hivesync_core::{GetResponse, MemoryStore, ReplicaId, StoreError};

    use super::*;

    fn key() -> StoreKey {
        StoreKey::new("alice", "USER_PROFILE_TASK:1")
    }

    async fn seeded(replicas: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(replicas));
        store.put(&key(), b"task".to_vec()).await.expect("seed");
        store
    }

    #[tokio::test]
    async fn converged_removal_succeeds_on_first_attempt() {
        let store = seeded(3).await;
        let verifier = RemovalVerifier::new(store.clone(), 3);

        let outcome = verifier.remove_and_verify(&key()).await;
        assert_eq!(outcome, RemovalOutcome::Success { attempts: 1 });
        assert_eq!(store.remove_count(), 1);
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn stale_for_two_reads_succeeds_after_three_removes() {
        let store = seeded(3).await;
        store.lag_removals(2);
        let verifier = RemovalVerifier::new(store.clone(), 3);

        let outcome = verifier.remove_and_verify(&key()).await;
        assert_eq!(outcome, RemovalOutcome::Success { attempts: 3 });
        assert_eq!(store.remove_count(), 3);
    }

    #[tokio::test]
    async fn never_converging_fails_after_initial_plus_retries() {
        let store = seeded(3).await;
        store.lag_removals(usize::MAX);
        let verifier = RemovalVerifier::new(store.clone(), 2);

        let outcome = verifier.remove_and_verify(&key()).await;
        assert_eq!(outcome, RemovalOutcome::Failed { attempts: 3 });
        assert_eq!(store.remove_count(), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_a_single_remove() {
        let store = seeded(2).await;
        store.lag_removals(usize::MAX);
        let verifier = RemovalVerifier::new(store.clone(), 0);

        assert_eq!(
            verifier.remove_and_verify(&key()).await,
            RemovalOutcome::Failed { attempts: 1 }
        );
        assert_eq!(store.remove_count(), 1);
    }

    #[tokio::test]
    async fn zero_replicas_count_as_removed() {
        let store = Arc::new(MemoryStore::new(0));
        let verifier = RemovalVerifier::new(store, 3);
        assert!(verifier.remove_and_verify(&key()).await.is_success());
    }

    #[tokio::test]
    async fn unacknowledged_remove_still_verifies_by_reading() {
        let store = seeded(3).await;
        store.fail_removes(true);
        let verifier = RemovalVerifier::new(store.clone(), 1);

        let outcome = verifier.remove_and_verify(&key()).await;
        assert_eq!(outcome, RemovalOutcome::Failed { attempts: 2 });
        assert_eq!(store.get_count(), 2);
    }

    /// Reads fail until `healthy_after` gets have been served.
    struct FlakyReads {
        gets: Mutex<u32>,
        healthy_after: u32,
    }

    #[async_trait]
    impl AsyncStore for FlakyReads {
        async fn put(&self, _key: &StoreKey, _value: Vec<u8>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get(&self, _key: &StoreKey) -> Result<GetResponse, StoreError> {
            let mut gets = self.gets.lock().unwrap();
            *gets += 1;
            if *gets <= self.healthy_after {
                return Err(StoreError::Unreachable("peer timeout".into()));
            }
            let mut response = GetResponse::default();
            response.entries.insert(ReplicaId::from("r0"), None);
            Ok(response)
        }

        async fn remove(&self, _key: &StoreKey) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn read_errors_consume_retries() {
        let store = Arc::new(FlakyReads { gets: Mutex::new(0), healthy_after: 1 });
        let verifier = RemovalVerifier::new(store.clone(), 3);
        assert_eq!(
            verifier.remove_and_verify(&key()).await,
            RemovalOutcome::Success { attempts: 2 }
        );

        let store = Arc::new(FlakyReads { gets: Mutex::new(0), healthy_after: u32::MAX });
        let verifier = RemovalVerifier::new(store, 1);
        assert_eq!(
            verifier.remove_and_verify(&key()).await,
            RemovalOutcome::Failed { attempts: 2 }
        );
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl RemovalListener for Recorder {
        fn on_remove_task_success(&self, key: &StoreKey) {
            self.events.lock().unwrap().push(format!("ok {key}"));
        }

        fn on_remove_task_failure(&self, key: &StoreKey, attempts: u32) {
            self.events.lock().unwrap().push(format!("failed {key} after {attempts}"));
        }
    }

    #[tokio::test]
    async fn listener_receives_exactly_one_terminal_callback() {
        let store = seeded(3).await;
        let verifier = RemovalVerifier::new(store.clone(), 3);
        let recorder = Recorder::default();
        verifier.remove_and_notify(&key(), &recorder).await;

        store.put(&key(), b"again".to_vec()).await.unwrap();
        store.lag_removals(usize::MAX);
        verifier.remove_and_notify(&key(), &recorder).await;

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                "ok alice/USER_PROFILE_TASK:1".to_string(),
                "failed alice/USER_PROFILE_TASK:1 after 4".to_string(),
            ]
        );
    }
}
