//! Pending user profile tasks, drained by the master client after a sync.
//!
//! The queue document `(user, USER_MESSAGE_QUEUE)` lists task ids in
//! arrival order; each task lives in its own entry
//! `(user, USER_PROFILE_TASK:<id>)`. Tasks are applied to the profile, the
//! profile is stored, and only then are the task entries removed with
//! remove-and-verify. A task leaves the queue once its removal converged.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hivesync_core::{FileTreeNode, StoreKey};
use hivesync_process::{next, NextStep, ProcessError, ProcessStep, RemovalListener};

use crate::context::{PostLoginContext, SyncEnv};
use crate::error::SyncError;
use crate::profile::PutUserProfileStep;

/// Change another client asked the master to apply to the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileTaskAction {
    AddNode { node: FileTreeNode },
    RemoveNode { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileTask {
    pub id: String,
    pub action: ProfileTaskAction,
    pub created_at: DateTime<Utc>,
}

impl UserProfileTask {
    pub fn new(id: impl Into<String>, action: ProfileTaskAction) -> Self {
        Self {
            id: id.into(),
            action,
            created_at: Utc::now(),
        }
    }
}

/// Queue document: ids of pending tasks, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessageQueue {
    #[serde(default)]
    pub tasks: Vec<String>,
}

async fn load_queue(env: &SyncEnv) -> Result<UserMessageQueue, SyncError> {
    let response = env.store.get(&env.queue_key()).await?;
    match response.first_value() {
        Some(bytes) => Ok(serde_json::from_slice(bytes)?),
        None => Ok(UserMessageQueue::default()),
    }
}

async fn save_queue(env: &SyncEnv, queue: &UserMessageQueue) -> Result<(), SyncError> {
    let bytes = serde_json::to_vec(queue)?;
    env.store.put(&env.queue_key(), bytes).await?;
    Ok(())
}

/// Store `task` and append it to the queue. Used by non-master clients.
pub async fn enqueue_task(env: &SyncEnv, task: &UserProfileTask) -> Result<(), SyncError> {
    env.store
        .put(&env.task_key(&task.id), serde_json::to_vec(task)?)
        .await?;
    let mut queue = load_queue(env).await?;
    if !queue.tasks.contains(&task.id) {
        queue.tasks.push(task.id.clone());
    }
    save_queue(env, &queue).await?;
    tracing::debug!(task = %task.id, queued = queue.tasks.len(), "task enqueued");
    Ok(())
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Load the queue and every task it lists into the context.
pub struct GetUserMessageQueueStep;

#[async_trait]
impl ProcessStep<PostLoginContext> for GetUserMessageQueueStep {
    fn name(&self) -> &str {
        "get user message queue"
    }

    async fn start(&mut self, ctx: &mut PostLoginContext) -> Result<NextStep<PostLoginContext>, ProcessError> {
        let queue = load_queue(&ctx.env).await?;
        let mut tasks = Vec::with_capacity(queue.tasks.len());
        for id in &queue.tasks {
            let response = ctx.env.store.get(&ctx.env.task_key(id)).await?;
            match response.first_value() {
                Some(bytes) => tasks.push(serde_json::from_slice(bytes).map_err(SyncError::from)?),
                None => {
                    tracing::warn!(task = %id, "queued task has no entry, dropping it");
                    ctx.dangling_tasks.push(id.clone());
                }
            }
        }
        tracing::debug!(tasks = tasks.len(), "user message queue loaded");
        ctx.tasks = tasks;
        next(HandleUserMessageQueueStep)
    }

    async fn roll_back(&mut self, ctx: &mut PostLoginContext) {
        ctx.tasks.clear();
        ctx.dangling_tasks.clear();
    }
}

/// Apply every loaded task to the in-memory profile. Nothing is written
/// here: the profile is stored first, the task entries removed after it.
pub struct HandleUserMessageQueueStep;

#[async_trait]
impl ProcessStep<PostLoginContext> for HandleUserMessageQueueStep {
    fn name(&self) -> &str {
        "handle user message queue"
    }

    async fn start(&mut self, ctx: &mut PostLoginContext) -> Result<NextStep<PostLoginContext>, ProcessError> {
        for task in std::mem::take(&mut ctx.tasks) {
            let changed = match &task.action {
                ProfileTaskAction::AddNode { node } => ctx.profile.upsert(node.clone()),
                ProfileTaskAction::RemoveNode { path } => ctx.profile.remove(path),
            };
            ctx.profile_dirty |= changed;
            ctx.report.tasks_applied += 1;
            tracing::debug!(task = %task.id, changed, "profile task applied");
            ctx.handled_tasks.push(task.id);
        }

        if ctx.profile_dirty {
            next(PutUserProfileStep::new())
        } else if ctx.handled_tasks.is_empty() && ctx.dangling_tasks.is_empty() {
            Ok(None)
        } else {
            next(RemoveHandledTasksStep)
        }
    }

    async fn roll_back(&mut self, ctx: &mut PostLoginContext) {
        ctx.report.tasks_applied = 0;
        ctx.handled_tasks.clear();
    }
}

/// Collects the terminal outcome of each task removal.
#[derive(Default)]
struct TaskRemovals {
    removed: Mutex<Vec<StoreKey>>,
    failed: Mutex<Vec<(StoreKey, u32)>>,
}

impl RemovalListener for TaskRemovals {
    fn on_remove_task_success(&self, key: &StoreKey) {
        lock(&self.removed).push(key.clone());
    }

    fn on_remove_task_failure(&self, key: &StoreKey, attempts: u32) {
        lock(&self.failed).push((key.clone(), attempts));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remove the entries of handled tasks and drop them from the queue.
///
/// Runs once the profile holds their effect, so it never fails: a task
/// whose entry survives stays queued and is applied again next time, which
/// is harmless. Queue write failures end up in the report.
pub struct RemoveHandledTasksStep;

#[async_trait]
impl ProcessStep<PostLoginContext> for RemoveHandledTasksStep {
    fn name(&self) -> &str {
        "remove handled tasks"
    }

    async fn start(&mut self, ctx: &mut PostLoginContext) -> Result<NextStep<PostLoginContext>, ProcessError> {
        let verifier = ctx.env.verifier();
        let removals = TaskRemovals::default();
        let mut gone: HashSet<String> = ctx.dangling_tasks.drain(..).collect();

        for id in std::mem::take(&mut ctx.handled_tasks) {
            let outcome = verifier.remove_and_notify(&ctx.env.task_key(&id), &removals).await;
            if outcome.is_success() {
                gone.insert(id);
            }
        }
        for (key, attempts) in lock(&removals.failed).iter() {
            ctx.report
                .problems
                .push(format!("task entry {key} still present after {attempts} removal attempts"));
        }

        // Reload so tasks enqueued meanwhile survive the rewrite.
        match load_queue(&ctx.env).await {
            Ok(mut queue) => {
                let before = queue.tasks.len();
                queue.tasks.retain(|id| !gone.contains(id));
                ctx.report.tasks_pending = queue.tasks.len();
                if queue.tasks.len() != before {
                    if let Err(err) = save_queue(&ctx.env, &queue).await {
                        ctx.report.problems.push(format!("rewriting the task queue failed: {err}"));
                    }
                }
            }
            Err(err) => ctx.report.problems.push(format!("reloading the task queue failed: {err}")),
        }

        tracing::info!(
            applied = ctx.report.tasks_applied,
            removed = lock(&removals.removed).len(),
            pending = ctx.report.tasks_pending,
            "user message queue handled",
        );
        Ok(None)
    }

    async fn roll_back(&mut self, _ctx: &mut PostLoginContext) {
        // Removed entries were already reflected in the stored profile.
        tracing::debug!("nothing to roll back for task removal");
    }
}
