//! The user profile: the list of synchronized paths, stored as one JSON
//! document under `(user, USER_PROFILE)`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hivesync_core::{AsyncStore, FileTreeNode, StoreKey, UserId};
use hivesync_process::{ProcessError, ProcessStep, NextStep};

use crate::context::PostLoginContext;
use crate::error::SyncError;

/// Profile document. `nodes` is kept sorted by path, so parents precede
/// their children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub nodes: Vec<FileTreeNode>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            nodes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn find(&self, full_path: &str) -> Option<&FileTreeNode> {
        self.nodes.iter().find(|node| node.full_path == full_path)
    }

    /// Insert or replace the node at `node.full_path`. Returns whether the
    /// profile changed.
    pub fn upsert(&mut self, node: FileTreeNode) -> bool {
        match self.nodes.binary_search_by(|n| n.full_path.cmp(&node.full_path)) {
            Ok(i) if self.nodes[i] == node => false,
            Ok(i) => {
                self.nodes[i] = node;
                self.touch();
                true
            }
            Err(i) => {
                self.nodes.insert(i, node);
                self.touch();
                true
            }
        }
    }

    /// Remove the node at `full_path` and everything below it.
    pub fn remove(&mut self, full_path: &str) -> bool {
        let before = self.nodes.len();
        let nested = format!("{}/", full_path.trim_end_matches('/'));
        self.nodes
            .retain(|node| node.full_path != full_path && !node.full_path.starts_with(&nested));
        let changed = self.nodes.len() != before;
        if changed {
            self.touch();
        }
        changed
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        let mut profile: Self = serde_json::from_slice(bytes)?;
        profile.nodes.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        Ok(profile)
    }
}

/// Load the profile of `user`, or a fresh one when none is stored.
///
/// Also returns the raw stored document, if any.
pub async fn load_profile(
    store: &dyn AsyncStore,
    user: &UserId,
) -> Result<(UserProfile, Option<Vec<u8>>), SyncError> {
    let key = StoreKey::new(user, hivesync_core::content_keys::USER_PROFILE);
    let response = store.get(&key).await?;
    match response.first_value() {
        Some(bytes) => {
            let profile = UserProfile::from_bytes(bytes)?;
            tracing::debug!(user = %user, nodes = profile.nodes.len(), "profile loaded");
            Ok((profile, Some(bytes.to_vec())))
        }
        None => {
            tracing::debug!(user = %user, "no stored profile, starting empty");
            Ok((UserProfile::new(user.clone()), None))
        }
    }
}

/// Nodes recorded by concurrently running uploads, merged into the profile
/// once the transfers settled.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdates {
    inner: Arc<Mutex<Vec<FileTreeNode>>>,
}

impl ProfileUpdates {
    pub fn record(&self, node: FileTreeNode) {
        lock(&self.inner).push(node);
    }

    pub fn forget(&self, full_path: &str) {
        lock(&self.inner).retain(|node| node.full_path != full_path);
    }

    pub fn take(&self) -> Vec<FileTreeNode> {
        std::mem::take(&mut *lock(&self.inner))
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// First post-login step: load the stored profile into the context.
pub struct LoadProfileStep;

#[async_trait]
impl ProcessStep<PostLoginContext> for LoadProfileStep {
    fn name(&self) -> &str {
        "load profile"
    }

    async fn start(&mut self, ctx: &mut PostLoginContext) -> Result<NextStep<PostLoginContext>, ProcessError> {
        let (profile, stored) = load_profile(ctx.env.store.as_ref(), &ctx.env.user).await?;
        ctx.profile = profile;
        ctx.stored_profile = stored;
        ctx.profile_dirty = false;
        hivesync_process::next(crate::synchronize::SynchronizeFilesStep::new())
    }

    async fn roll_back(&mut self, _ctx: &mut PostLoginContext) {}
}

/// Write `ctx.profile`; rollback puts the previously stored document back.
/// Queue tasks applied to the profile are only removed after this write.
#[derive(Default)]
pub struct PutUserProfileStep {
    written: bool,
}

impl PutUserProfileStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessStep<PostLoginContext> for PutUserProfileStep {
    fn name(&self) -> &str {
        "put user profile"
    }

    async fn start(&mut self, ctx: &mut PostLoginContext) -> Result<NextStep<PostLoginContext>, ProcessError> {
        let bytes = ctx.profile.to_bytes()?;
        let key = ctx.env.profile_key();
        self.written = true;
        if let Err(err) = ctx.env.store.put(&key, bytes).await {
            self.roll_back(ctx).await;
            return Err(err.into());
        }
        ctx.profile_dirty = false;
        ctx.report.profile_written = true;
        tracing::info!(user = %ctx.env.user, nodes = ctx.profile.nodes.len(), "profile written");
        if ctx.handled_tasks.is_empty() && ctx.dangling_tasks.is_empty() {
            Ok(None)
        } else {
            hivesync_process::next(crate::queue::RemoveHandledTasksStep)
        }
    }

    async fn roll_back(&mut self, ctx: &mut PostLoginContext) {
        if !std::mem::take(&mut self.written) {
            return;
        }
        let key = ctx.env.profile_key();
        let result = match &ctx.stored_profile {
            Some(previous) => ctx.env.store.put(&key, previous.clone()).await,
            None => ctx.env.store.remove(&key).await,
        };
        if let Err(err) = result {
            tracing::warn!(key = %key, error = %err, "restoring previous profile failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        let mut profile = UserProfile::new(UserId::from("alice"));
        profile.upsert(FileTreeNode::file("/b.txt", Some("h1".into())));
        profile.upsert(FileTreeNode::folder("/a"));
        profile.upsert(FileTreeNode::file("/a/x", None));
        profile
    }

    fn paths(profile: &UserProfile) -> Vec<&str> {
        profile.nodes.iter().map(|n| n.full_path.as_str()).collect()
    }

    #[test]
    fn upsert_keeps_parents_before_children() {
        assert_eq!(paths(&profile()), vec!["/a", "/a/x", "/b.txt"]);
    }

    #[test]
    fn upsert_reports_changes_only() {
        let mut profile = profile();
        assert!(!profile.upsert(FileTreeNode::folder("/a")));
        assert!(profile.upsert(FileTreeNode::file("/b.txt", Some("h2".into()))));
        assert_eq!(profile.find("/b.txt").and_then(|n| n.content_hash.as_deref()), Some("h2"));
    }

    #[test]
    fn remove_takes_descendants_but_not_lookalikes() {
        let mut profile = profile();
        profile.upsert(FileTreeNode::file("/ab", None));
        assert!(profile.remove("/a"));
        assert_eq!(paths(&profile), vec!["/ab", "/b.txt"]);
        assert!(!profile.remove("/missing"));
    }

    #[test]
    fn document_round_trips_through_json() {
        let profile = profile();
        let bytes = profile.to_bytes().expect("serialize");
        assert_eq!(UserProfile::from_bytes(&bytes).expect("parse"), profile);
    }

    #[test]
    fn updates_can_be_forgotten_and_drained() {
        let updates = ProfileUpdates::default();
        updates.record(FileTreeNode::folder("/a"));
        updates.record(FileTreeNode::file("/a/b", None));
        updates.forget("/a");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates.take(), vec![FileTreeNode::file("/a/b", None)]);
        assert!(updates.is_empty());
    }
}
