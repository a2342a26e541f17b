//! Download process: fetch a profile node's content and materialize it
//! under the sync root.
//!
//! `GetFileContentStep` → `WriteFileStep`. Files are written to
//! `<path>.hivesync.tmp` first and renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use hivesync_core::FileTreeNode;
use hivesync_process::{io_err, next, NextStep, Process, ProcessError, ProcessStep, Runnable};

use crate::context::SyncEnv;
use crate::diff::{content_hash, TMP_SUFFIX};

/// Context of one download.
pub struct DownloadContext {
    pub env: SyncEnv,
    pub node: FileTreeNode,
    pub content: Option<Vec<u8>>,
}

/// Build the download process of `node`.
pub fn download_process(env: &SyncEnv, node: &FileTreeNode) -> Box<dyn Runnable> {
    let ctx = DownloadContext {
        env: env.clone(),
        node: node.clone(),
        content: None,
    };
    Box::new(Process::new(
        format!("download {}", node.full_path),
        ctx,
        GetFileContentStep,
    ))
}

/// Read the content of a file node from the store and check its hash.
/// Folders have no content and pass straight through.
pub struct GetFileContentStep;

#[async_trait]
impl ProcessStep<DownloadContext> for GetFileContentStep {
    fn name(&self) -> &str {
        "get file content"
    }

    async fn start(&mut self, ctx: &mut DownloadContext) -> Result<NextStep<DownloadContext>, ProcessError> {
        if ctx.node.is_folder {
            return next(WriteFileStep::default());
        }
        let key = ctx.env.file_key(&ctx.node.full_path);
        let response = ctx.env.store.get(&key).await?;
        let Some(bytes) = response.first_value() else {
            return Err(ProcessError::failed(format!(
                "no replica holds the content of {}",
                ctx.node.full_path
            )));
        };
        if let Some(expected) = &ctx.node.content_hash {
            let actual = content_hash(bytes);
            if &actual != expected {
                return Err(ProcessError::failed(format!(
                    "content of {} does not match the profile (expected {expected}, got {actual})",
                    ctx.node.full_path
                )));
            }
        }
        tracing::debug!(path = %ctx.node.full_path, bytes = bytes.len(), "content fetched");
        ctx.content = Some(bytes.to_vec());
        next(WriteFileStep::default())
    }

    async fn roll_back(&mut self, ctx: &mut DownloadContext) {
        ctx.content = None;
    }
}

/// What [`WriteFileStep`] has to undo.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Undo {
    CreatedDir(PathBuf),
    CreatedFile(PathBuf),
    Replaced { path: PathBuf, previous: Vec<u8> },
}

/// Create the folder, or write the fetched content atomically.
#[derive(Debug, Default)]
pub struct WriteFileStep {
    undo: Option<Undo>,
}

#[async_trait]
impl ProcessStep<DownloadContext> for WriteFileStep {
    fn name(&self) -> &str {
        "write file"
    }

    async fn start(&mut self, ctx: &mut DownloadContext) -> Result<NextStep<DownloadContext>, ProcessError> {
        let path = ctx.env.disk_path(&ctx.node.full_path)?;

        if ctx.node.is_folder {
            if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                return Ok(None);
            }
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| io_err(&path, e))?;
            tracing::info!(path = %path.display(), "created folder");
            self.undo = Some(Undo::CreatedDir(path));
            return Ok(None);
        }

        let Some(content) = ctx.content.as_deref() else {
            return Err(ProcessError::failed(format!(
                "no content fetched for {}",
                ctx.node.full_path
            )));
        };
        let previous = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(io_err(&path, err)),
        };
        write_atomically(&path, content).await?;
        tracing::info!(path = %path.display(), bytes = content.len(), "wrote");
        self.undo = Some(match previous {
            Some(previous) => Undo::Replaced { path, previous },
            None => Undo::CreatedFile(path),
        });
        Ok(None)
    }

    async fn roll_back(&mut self, _ctx: &mut DownloadContext) {
        let result = match self.undo.take() {
            None => return,
            Some(Undo::CreatedDir(path)) => tokio::fs::remove_dir(&path).await.map_err(|e| io_err(&path, e)),
            Some(Undo::CreatedFile(path)) => tokio::fs::remove_file(&path).await.map_err(|e| io_err(&path, e)),
            Some(Undo::Replaced { path, previous }) => write_atomically(&path, &previous).await,
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "undoing local write failed");
        }
    }
}

/// Write `content` to `<path>.hivesync.tmp`, then rename it over `path`.
pub(crate) async fn write_atomically(path: &Path, content: &[u8]) -> Result<(), ProcessError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    let tmp = PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()));
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(path, e));
    }
    Ok(())
}
