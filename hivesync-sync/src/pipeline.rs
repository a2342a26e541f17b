//! Post-login workflow shared by the CLI commands.
//!
//! `LoadProfileStep` → `SynchronizeFilesStep` → (master only)
//! `GetUserMessageQueueStep` → `HandleUserMessageQueueStep` →
//! `PutUserProfileStep` when the profile changed → (master only)
//! `RemoveHandledTasksStep`.

use hivesync_process::Process;

use crate::context::{PostLoginContext, SyncEnv};
use crate::error::SyncError;
use crate::profile::LoadProfileStep;
use crate::synchronize::SyncReport;

/// Build the post-login process without running it.
pub fn post_login_process(env: SyncEnv, is_master: bool) -> Process<PostLoginContext> {
    let name = format!("post-login {}", env.user);
    Process::new(name, PostLoginContext::new(env, is_master), LoadProfileStep)
}

/// Run the post-login workflow to completion.
///
/// Transfer failures are reported in the [`SyncReport`]; only failures of
/// the workflow itself (profile or queue access) are errors.
pub async fn post_login(env: SyncEnv, is_master: bool) -> Result<SyncReport, SyncError> {
    let mut process = post_login_process(env, is_master);
    process.run().await?;
    Ok(process.into_context().report)
}
