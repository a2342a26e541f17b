//! Shared environment of every sync workflow, and the context of the
//! post-login chain.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hivesync_core::{content_keys, AsyncStore, ClientConfig, StoreKey, UserId};
use hivesync_process::{Attachment, RemovalVerifier};

use crate::error::SyncError;
use crate::profile::UserProfile;
use crate::queue::UserProfileTask;
use crate::synchronize::SyncReport;

/// Everything a sync process needs besides its own payload. Cheap to clone.
#[derive(Clone)]
pub struct SyncEnv {
    pub store: Arc<dyn AsyncStore>,
    pub user: UserId,
    /// Local directory mirrored by the profile's `/`.
    pub root: PathBuf,
    pub max_remove_retries: u32,
    /// Upper bound on the wait for all transfers to settle.
    pub settle_timeout: Option<Duration>,
    pub attachment: Attachment,
}

impl SyncEnv {
    pub fn new(store: Arc<dyn AsyncStore>, user: UserId, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            user,
            root: root.into(),
            max_remove_retries: hivesync_core::config::DEFAULT_REMOVE_RETRIES,
            settle_timeout: None,
            attachment: Attachment::default(),
        }
    }

    pub fn from_config(config: &ClientConfig, store: Arc<dyn AsyncStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            max_remove_retries: config.max_remove_retries,
            settle_timeout: config.settle_timeout(),
            ..Self::new(store, config.user_id.clone(), root)
        }
    }

    pub fn key(&self, content: &str) -> StoreKey {
        StoreKey::new(&self.user, content)
    }

    pub fn profile_key(&self) -> StoreKey {
        self.key(content_keys::USER_PROFILE)
    }

    pub fn public_key_key(&self) -> StoreKey {
        self.key(content_keys::USER_PUBLIC_KEY)
    }

    pub fn queue_key(&self) -> StoreKey {
        self.key(content_keys::USER_MESSAGE_QUEUE)
    }

    pub fn file_key(&self, full_path: &str) -> StoreKey {
        StoreKey::new(&self.user, content_keys::file_content(full_path))
    }

    pub fn task_key(&self, task_id: &str) -> StoreKey {
        StoreKey::new(&self.user, content_keys::profile_task(task_id))
    }

    pub fn verifier(&self) -> RemovalVerifier {
        RemovalVerifier::new(self.store.clone(), self.max_remove_retries)
    }

    /// Map a profile path (`/docs/a.txt`) below [`root`](Self::root).
    ///
    /// Paths escaping the root (`..`) or pointing at the root itself are rejected.
    pub fn disk_path(&self, full_path: &str) -> Result<PathBuf, SyncError> {
        let relative = Path::new(full_path.trim_start_matches('/'));
        let mut path = self.root.clone();
        let mut depth = 0;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return Err(SyncError::InvalidPath(full_path.to_string())),
            }
        }
        if depth == 0 {
            return Err(SyncError::InvalidPath(full_path.to_string()));
        }
        Ok(path)
    }
}

/// State carried through the post-login chain.
pub struct PostLoginContext {
    pub env: SyncEnv,
    pub is_master: bool,
    pub profile: UserProfile,
    /// Raw profile document as loaded, restored if writing the new one fails.
    pub stored_profile: Option<Vec<u8>>,
    /// Set whenever `profile` diverges from `stored_profile`.
    pub profile_dirty: bool,
    pub tasks: Vec<UserProfileTask>,
    /// Ids of tasks applied to `profile`, removed once the profile is stored.
    pub handled_tasks: Vec<String>,
    /// Queued ids without a task entry, dropped from the queue.
    pub dangling_tasks: Vec<String>,
    pub report: SyncReport,
}

impl PostLoginContext {
    pub fn new(env: SyncEnv, is_master: bool) -> Self {
        let profile = UserProfile::new(env.user.clone());
        Self {
            env,
            is_master,
            profile,
            stored_profile: None,
            profile_dirty: false,
            tasks: Vec::new(),
            handled_tasks: Vec::new(),
            dangling_tasks: Vec::new(),
            report: SyncReport::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use hivesync_core::MemoryStore;

    use super::*;

    fn env() -> SyncEnv {
        SyncEnv::new(Arc::new(MemoryStore::new(1)), UserId::from("alice"), "/sync")
    }

    #[test]
    fn disk_path_maps_below_root() {
        assert_eq!(
            env().disk_path("/docs/a.txt").expect("path"),
            PathBuf::from("/sync/docs/a.txt")
        );
        assert_eq!(env().disk_path("docs").expect("path"), PathBuf::from("/sync/docs"));
    }

    #[test]
    fn disk_path_rejects_escapes_and_root() {
        assert!(matches!(env().disk_path("/../etc/passwd"), Err(SyncError::InvalidPath(_))));
        assert!(matches!(env().disk_path("/"), Err(SyncError::InvalidPath(_))));
    }

    #[test]
    fn keys_live_under_the_user() {
        let env = env();
        assert_eq!(env.profile_key().to_string(), "alice/USER_PROFILE");
        assert_eq!(env.file_key("/a").to_string(), "alice/FILE:/a");
        assert_eq!(env.task_key("7").to_string(), "alice/USER_PROFILE_TASK:7");
    }

    #[test]
    fn config_values_flow_into_env() {
        let mut config = ClientConfig::new(UserId::from("bob"), PathBuf::from("/store"));
        config.max_remove_retries = 9;
        config.settle_timeout_secs = Some(4);
        let env = SyncEnv::from_config(&config, Arc::new(MemoryStore::new(1)), "/r");
        assert_eq!(env.user, UserId::from("bob"));
        assert_eq!(env.max_remove_retries, 9);
        assert_eq!(env.settle_timeout, Some(Duration::from_secs(4)));
        assert_eq!(env.verifier().max_retries(), 9);
    }
}
