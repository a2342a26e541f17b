//! Upload process: publish a local path the profile does not know yet.
//!
//! `ReadFileStep` → verified [`CompensatingPut`] of the content →
//! `RecordInProfileStep`. Folders skip the put.

use async_trait::async_trait;

use hivesync_core::{FileTreeNode, LocalEntry, StoreError};
use hivesync_process::{
    io_err, next, CompensatingPut, NextStep, Process, ProcessError, ProcessStep, PutHandler,
    Runnable,
};

use crate::context::SyncEnv;
use crate::diff::content_hash;
use crate::profile::ProfileUpdates;

/// Context of one upload.
pub struct UploadContext {
    pub env: SyncEnv,
    pub entry: LocalEntry,
    pub content_hash: Option<String>,
    pub updates: ProfileUpdates,
}

/// Build the upload process of `entry`; the resulting profile node is
/// recorded into `updates`.
pub fn upload_process(env: &SyncEnv, entry: &LocalEntry, updates: &ProfileUpdates) -> Box<dyn Runnable> {
    let ctx = UploadContext {
        env: env.clone(),
        entry: entry.clone(),
        content_hash: None,
        updates: updates.clone(),
    };
    Box::new(Process::new(format!("upload {}", entry.full_path), ctx, ReadFileStep))
}

/// Read the local file and hand its content to the store write.
pub struct ReadFileStep;

#[async_trait]
impl ProcessStep<UploadContext> for ReadFileStep {
    fn name(&self) -> &str {
        "read file"
    }

    async fn start(&mut self, ctx: &mut UploadContext) -> Result<NextStep<UploadContext>, ProcessError> {
        if ctx.entry.is_folder {
            return next(RecordInProfileStep::default());
        }
        let path = &ctx.entry.disk_path;
        let bytes = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
        ctx.content_hash = Some(content_hash(&bytes));
        let key = ctx.env.file_key(&ctx.entry.full_path);
        tracing::debug!(path = %ctx.entry.full_path, bytes = bytes.len(), "uploading");
        next(CompensatingPut::new("put file content", ctx.env.store.clone(), key, bytes, ContentPut).verified())
    }

    async fn roll_back(&mut self, ctx: &mut UploadContext) {
        ctx.content_hash = None;
    }
}

/// Continues with [`RecordInProfileStep`] once the content is stored.
pub struct ContentPut;

#[async_trait]
impl PutHandler<UploadContext> for ContentPut {
    async fn on_put(
        &mut self,
        _ctx: &mut UploadContext,
        result: Result<(), StoreError>,
    ) -> Result<NextStep<UploadContext>, ProcessError> {
        result?;
        next(RecordInProfileStep::default())
    }
}

/// Record the uploaded node for the profile write after the sync settles.
#[derive(Default)]
pub struct RecordInProfileStep {
    recorded: bool,
}

#[async_trait]
impl ProcessStep<UploadContext> for RecordInProfileStep {
    fn name(&self) -> &str {
        "record in profile"
    }

    async fn start(&mut self, ctx: &mut UploadContext) -> Result<NextStep<UploadContext>, ProcessError> {
        let node = if ctx.entry.is_folder {
            FileTreeNode::folder(ctx.entry.full_path.clone())
        } else {
            FileTreeNode::file(ctx.entry.full_path.clone(), ctx.content_hash.clone())
        };
        ctx.updates.record(node);
        self.recorded = true;
        tracing::info!(path = %ctx.entry.full_path, "uploaded");
        Ok(None)
    }

    async fn roll_back(&mut self, ctx: &mut UploadContext) {
        if std::mem::take(&mut self.recorded) {
            ctx.updates.forget(&ctx.entry.full_path);
        }
    }
}
