//! File synchronization: run every download and upload the diff calls for,
//! in dependency order, and wait until all of them settled.
//!
//! Three trees run side by side:
//! - missing on disk: hierarchical, one download per node
//! - missing in profile: hierarchical, one upload per local entry
//! - changed: flat, one re-download per file
//!
//! Failures never abort the sync; they are collected into the report.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use hivesync_core::{FileTreeNode, LocalEntry};
use hivesync_process::{next, NextStep, ProcessError, ProcessStep, ProcessTree, Problems};

use crate::context::{PostLoginContext, SyncEnv};
use crate::diff::{FileDiff, FileDiffSource};
use crate::download::download_process;
use crate::profile::{ProfileUpdates, PutUserProfileStep};
use crate::queue::GetUserMessageQueueStep;
use crate::upload::upload_process;

/// Outcome of a post-login run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Downloads scheduled for paths missing on disk.
    pub downloads: usize,
    /// Uploads scheduled for paths missing in the profile.
    pub uploads: usize,
    /// Re-downloads scheduled for changed files.
    pub updates: usize,
    /// Every failure reason, in the order reported.
    pub problems: Vec<String>,
    /// The settle deadline expired before all transfers finished.
    pub timed_out: bool,
    pub tasks_applied: usize,
    pub tasks_pending: usize,
    pub profile_written: bool,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && !self.timed_out
    }
}

/// Builds, starts and awaits the three transfer trees.
pub struct Synchronizer {
    env: SyncEnv,
}

impl Synchronizer {
    pub fn new(env: SyncEnv) -> Self {
        Self { env }
    }

    /// Synchronize the three lists. Never fails: problems end up in the
    /// report. Uploaded nodes are recorded into `updates`.
    ///
    /// When `settle_timeout` expires the remaining transfers keep running
    /// detached. An upload finishing after that point is not part of this
    /// run's profile write; its path is still missing in the profile on the
    /// next run and gets uploaded again.
    pub async fn synchronize(
        &self,
        missing_on_disk: Vec<FileTreeNode>,
        missing_in_profile: Vec<LocalEntry>,
        changed: Vec<FileTreeNode>,
        updates: &ProfileUpdates,
    ) -> SyncReport {
        let env = &self.env;
        let mut report = SyncReport {
            downloads: missing_on_disk.len(),
            uploads: missing_in_profile.len(),
            updates: changed.len(),
            ..SyncReport::default()
        };

        let downloads = ProcessTree::hierarchical(missing_on_disk, env.attachment, |node| {
            download_process(env, node)
        });
        let uploads = ProcessTree::hierarchical(missing_in_profile, env.attachment, |entry| {
            upload_process(env, entry, updates)
        });
        let changed = ProcessTree::flat(changed, |node| download_process(env, node));

        tracing::info!(
            downloads = report.downloads,
            uploads = report.uploads,
            updates = report.updates,
            "synchronizing files",
        );

        let problems = Problems::new();
        let sink = Arc::new(problems.clone());
        let handles = [
            downloads.start(sink.clone()),
            uploads.start(sink.clone()),
            changed.start(sink),
        ];
        let settled = async {
            tokio::join!(handles[0].wait(), handles[1].wait(), handles[2].wait());
        };

        match env.settle_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, settled).await.is_err() {
                    let pending: usize = handles.iter().map(|h| h.pending()).sum();
                    report.timed_out = true;
                    problems.push(format!(
                        "synchronization did not settle within {limit:?}, {pending} operations still running"
                    ));
                }
            }
            None => settled.await,
        }

        report.problems = problems.take();
        for problem in &report.problems {
            tracing::warn!(problem = %problem, "synchronization problem");
        }
        tracing::info!(problems = report.problems.len(), "file synchronization settled");
        report
    }

    /// [`synchronize`](Self::synchronize) over the lists of a diff source.
    pub async fn synchronize_diff(&self, diff: &dyn FileDiffSource, updates: &ProfileUpdates) -> SyncReport {
        self.synchronize(
            diff.missing_on_disk(),
            diff.missing_in_profile(),
            diff.changed_files(),
            updates,
        )
        .await
    }
}

/// Post-login step wrapping the [`Synchronizer`]. After the transfers
/// settled, uploaded nodes are merged into the profile; the master then
/// drains the task queue, everyone else persists the profile if needed.
#[derive(Default)]
pub struct SynchronizeFilesStep;

impl SynchronizeFilesStep {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessStep<PostLoginContext> for SynchronizeFilesStep {
    fn name(&self) -> &str {
        "synchronize files"
    }

    async fn start(&mut self, ctx: &mut PostLoginContext) -> Result<NextStep<PostLoginContext>, ProcessError> {
        let root = ctx.env.root.clone();
        let profile = ctx.profile.clone();
        let diff = tokio::task::spawn_blocking(move || FileDiff::compute(&root, &profile))
            .await
            .map_err(|e| ProcessError::failed(format!("file diff task failed: {e}")))??;

        let updates = ProfileUpdates::default();
        let report = Synchronizer::new(ctx.env.clone())
            .synchronize_diff(&diff, &updates)
            .await;
        ctx.report = report;

        for node in updates.take() {
            ctx.profile_dirty |= ctx.profile.upsert(node);
        }

        if ctx.is_master {
            next(GetUserMessageQueueStep)
        } else if ctx.profile_dirty {
            next(PutUserProfileStep::new())
        } else {
            Ok(None)
        }
    }

    async fn roll_back(&mut self, _ctx: &mut PostLoginContext) {
        // Each transfer compensated its own failures already.
        tracing::debug!("nothing to roll back for file synchronization");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hivesync_core::{content_keys, AsyncStore, GetResponse, MemoryStore, StoreError, StoreKey, UserId};
    use tempfile::TempDir;

    use super::*;

    /// Never answers a get for one content key.
    struct StallingStore {
        inner: MemoryStore,
        stalled: String,
    }

    #[async_trait]
    impl AsyncStore for StallingStore {
        async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
            self.inner.put(key, value).await
        }

        async fn get(&self, key: &StoreKey) -> Result<GetResponse, StoreError> {
            if key.content.0 == self.stalled {
                std::future::pending::<()>().await;
            }
            self.inner.get(key).await
        }

        async fn remove(&self, key: &StoreKey) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn settle_deadline_reports_pending_work_and_returns() {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(StallingStore {
            inner: MemoryStore::new(1),
            stalled: content_keys::file_content("/stuck.bin").0,
        });
        let mut env = SyncEnv::new(store, UserId::from("alice"), dir.path());
        env.settle_timeout = Some(Duration::from_secs(5));

        let report = Synchronizer::new(env)
            .synchronize(
                vec![FileTreeNode::file("/stuck.bin", None)],
                Vec::new(),
                Vec::new(),
                &ProfileUpdates::default(),
            )
            .await;

        assert!(report.timed_out);
        assert!(!report.is_clean());
        assert_eq!(report.downloads, 1);
        assert_eq!(
            report.problems,
            ["synchronization did not settle within 5s, 1 operations still running"]
        );
    }

    #[tokio::test]
    async fn without_a_deadline_nothing_times_out() {
        let dir = TempDir::new().expect("tempdir");
        let env = SyncEnv::new(Arc::new(MemoryStore::new(1)), UserId::from("alice"), dir.path());

        let report = Synchronizer::new(env)
            .synchronize(
                vec![FileTreeNode::folder("/docs")],
                Vec::new(),
                Vec::new(),
                &ProfileUpdates::default(),
            )
            .await;

        assert!(report.is_clean(), "{report:?}");
        assert!(dir.path().join("docs").is_dir());
    }
}
