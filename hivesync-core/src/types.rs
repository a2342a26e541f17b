//! Domain types shared by every hivesync crate.
//!
//! Store addressing uses string newtypes; profile paths are `/`-separated
//! strings rooted at `/`, never `PathBuf`, because the tree scheduler compares
//! them as plain string prefixes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of the entity that owns a store entry (usually a user).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey(pub String);

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for LocationKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LocationKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque identifier of the kind (and version) of a store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey(pub String);

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContentKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContentKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a single replica (peer) answering a store read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(pub String);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A user of the network. Every entry a user owns lives under their id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&UserId> for LocationKey {
    fn from(user: &UserId) -> Self {
        Self(user.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Store keys
// ---------------------------------------------------------------------------

/// Address of one entry in the distributed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey {
    pub location: LocationKey,
    pub content: ContentKey,
}

impl StoreKey {
    pub fn new(location: impl Into<LocationKey>, content: impl Into<ContentKey>) -> Self {
        Self {
            location: location.into(),
            content: content.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.location, self.content)
    }
}

/// Well-known content keys.
pub mod content_keys {
    use super::ContentKey;

    pub const USER_PROFILE: &str = "USER_PROFILE";
    pub const USER_PUBLIC_KEY: &str = "USER_PUBLIC_KEY";
    pub const USER_MESSAGE_QUEUE: &str = "USER_MESSAGE_QUEUE";

    /// Content of the file at `full_path`.
    pub fn file_content(full_path: &str) -> ContentKey {
        ContentKey(format!("FILE:{full_path}"))
    }

    /// A queued user profile task.
    pub fn profile_task(task_id: &str) -> ContentKey {
        ContentKey(format!("USER_PROFILE_TASK:{task_id}"))
    }
}

// ---------------------------------------------------------------------------
// File tree entries
// ---------------------------------------------------------------------------

/// Path and kind of an item that can be placed in a dependency tree.
pub trait TreeEntry {
    /// `/`-separated path used for prefix comparison.
    fn tree_path(&self) -> &str;
    fn is_folder(&self) -> bool;
}

/// One path of the synchronized tree as recorded in the user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeNode {
    pub full_path: String,
    pub is_folder: bool,
    /// Hex SHA-256 of the file content. Always `None` for folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FileTreeNode {
    pub fn folder(full_path: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            is_folder: true,
            content_hash: None,
        }
    }

    pub fn file(full_path: impl Into<String>, content_hash: Option<String>) -> Self {
        Self {
            full_path: full_path.into(),
            is_folder: false,
            content_hash,
        }
    }
}

impl TreeEntry for FileTreeNode {
    fn tree_path(&self) -> &str {
        &self.full_path
    }

    fn is_folder(&self) -> bool {
        self.is_folder
    }
}

/// A local filesystem path that is missing from the user profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Profile-form path (`/docs/a.txt`).
    pub full_path: String,
    /// Absolute path on disk.
    pub disk_path: PathBuf,
    pub is_folder: bool,
}

impl TreeEntry for LocalEntry {
    fn tree_path(&self) -> &str {
        &self.full_path
    }

    fn is_folder(&self) -> bool {
        self.is_folder
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
