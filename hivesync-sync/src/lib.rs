//! # hivesync-sync
//!
//! Client workflows on top of the process layer.
//!
//! Call [`post_login`] to synchronize a local root with the user profile
//! (and, on the master, drain the pending task queue), or [`register`] to
//! publish a new user.

pub mod context;
pub mod diff;
pub mod download;
pub mod error;
pub mod pipeline;
pub mod profile;
pub mod queue;
pub mod register;
pub mod synchronize;
pub mod upload;

pub use context::{PostLoginContext, SyncEnv};
pub use diff::{content_hash, FileDiff, FileDiffSource};
pub use error::SyncError;
pub use pipeline::{post_login, post_login_process};
pub use profile::{load_profile, ProfileUpdates, UserProfile};
pub use queue::{enqueue_task, ProfileTaskAction, UserMessageQueue, UserProfileTask};
pub use register::register;
pub use synchronize::{SyncReport, SynchronizeFilesStep, Synchronizer};
