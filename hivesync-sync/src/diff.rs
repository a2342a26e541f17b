//! Local file diff: compare the sync root on disk with the user profile.
//!
//! Produces the three lists the synchronizer consumes. Paths are compared in
//! profile form (`/docs/a.txt`); content is compared by hex SHA-256.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use hivesync_core::{FileTreeNode, LocalEntry};

use crate::error::{io_err, SyncError};
use crate::profile::UserProfile;

/// Suffix of in-flight download files, never synchronized.
pub const TMP_SUFFIX: &str = ".hivesync.tmp";

/// Source of the three diff lists.
pub trait FileDiffSource: Send + Sync {
    /// Profile nodes with no counterpart on disk.
    fn missing_on_disk(&self) -> Vec<FileTreeNode>;

    /// Local paths the profile does not know about.
    fn missing_in_profile(&self) -> Vec<LocalEntry>;

    /// Profile files whose local content differs.
    fn changed_files(&self) -> Vec<FileTreeNode>;
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A computed diff, in preorder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    pub missing_on_disk: Vec<FileTreeNode>,
    pub missing_in_profile: Vec<LocalEntry>,
    pub changed: Vec<FileTreeNode>,
}

#[derive(Debug)]
struct DiskEntry {
    disk_path: PathBuf,
    is_folder: bool,
}

impl FileDiff {
    /// Walk `root` and compare it with `profile`. A missing root is treated
    /// as empty.
    pub fn compute(root: &Path, profile: &UserProfile) -> Result<Self, SyncError> {
        let mut local = BTreeMap::new();
        let mut order = Vec::new();
        walk(root, "", &mut local, &mut order)?;

        let missing_on_disk = profile
            .nodes
            .iter()
            .filter(|node| !local.contains_key(&node.full_path))
            .cloned()
            .collect();

        let missing_in_profile = order
            .iter()
            .filter(|path| profile.find(path).is_none())
            .filter_map(|path| {
                local.get(path).map(|entry: &DiskEntry| LocalEntry {
                    full_path: path.clone(),
                    disk_path: entry.disk_path.clone(),
                    is_folder: entry.is_folder,
                })
            })
            .collect();

        let mut changed = Vec::new();
        for node in profile.nodes.iter().filter(|node| !node.is_folder) {
            let Some(entry) = local.get(&node.full_path) else {
                continue;
            };
            if entry.is_folder {
                continue;
            }
            let bytes = std::fs::read(&entry.disk_path).map_err(|e| io_err(&entry.disk_path, e))?;
            let local_hash = content_hash(&bytes);
            if node.content_hash.as_deref() != Some(local_hash.as_str()) {
                changed.push(node.clone());
            }
        }

        let diff = Self {
            missing_on_disk,
            missing_in_profile,
            changed,
        };
        tracing::debug!(
            root = %root.display(),
            missing_on_disk = diff.missing_on_disk.len(),
            missing_in_profile = diff.missing_in_profile.len(),
            changed = diff.changed.len(),
            "file diff computed",
        );
        Ok(diff)
    }

    pub fn is_empty(&self) -> bool {
        self.missing_on_disk.is_empty() && self.missing_in_profile.is_empty() && self.changed.is_empty()
    }
}

impl FileDiffSource for FileDiff {
    fn missing_on_disk(&self) -> Vec<FileTreeNode> {
        self.missing_on_disk.clone()
    }

    fn missing_in_profile(&self) -> Vec<LocalEntry> {
        self.missing_in_profile.clone()
    }

    fn changed_files(&self) -> Vec<FileTreeNode> {
        self.changed.clone()
    }
}

/// Preorder walk, children sorted by name.
fn walk(
    dir: &Path,
    prefix: &str,
    local: &mut BTreeMap<String, DiskEntry>,
    order: &mut Vec<String>,
) -> Result<(), SyncError> {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) if err.kind() == ErrorKind::NotFound && prefix.is_empty() => return Ok(()),
        Err(err) => return Err(io_err(dir, err)),
    };
    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
        entries.push((entry.file_name(), entry.path(), file_type));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, disk_path, file_type) in entries {
        let Some(name) = name.to_str() else {
            tracing::warn!(path = %disk_path.display(), "skipping non UTF-8 file name");
            continue;
        };
        if name.ends_with(TMP_SUFFIX) || file_type.is_symlink() {
            continue;
        }
        let full_path = format!("{prefix}/{name}");
        let is_folder = file_type.is_dir();
        order.push(full_path.clone());
        local.insert(
            full_path.clone(),
            DiskEntry {
                disk_path: disk_path.clone(),
                is_folder,
            },
        );
        if is_folder {
            walk(&disk_path, &full_path, local, order)?;
        }
    }
    Ok(())
}
