//! Dependency-tree scheduler.
//!
//! Every node wraps one [`Runnable`] process (the synthetic root may wrap
//! none). A node's process starts only once its parent's process is
//! terminal; siblings run concurrently, each in its own tokio task. Failures
//! are reported as strings to a [`FailureSink`] and never stop unrelated
//! subtrees.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use hivesync_core::TreeEntry;

use crate::process::Runnable;

/// Index of a node in a [`ProcessTree`].
pub type NodeId = usize;

/// The synthetic root every tree starts with.
pub const ROOT: NodeId = 0;

/// How [`ProcessTree::hierarchical`] picks the parent of a new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attachment {
    /// Scan only the root's direct children in insertion order; the last
    /// folder whose path is a string prefix of the item's path wins.
    ///
    /// Items nested more than one level below a root-level folder end up as
    /// siblings of their intermediate folders, not below them.
    #[default]
    LastRootMatch,
    /// Search the whole tree for the deepest folder containing the item,
    /// respecting path component boundaries. Later insertions win ties.
    DeepestPrefix,
}

/// Receives failure reasons while a tree runs. Must not panic.
pub trait FailureSink: Send + Sync {
    fn on_fail(&self, reason: String);
}

/// Concurrent-safe list of failure reasons; the default [`FailureSink`].
#[derive(Clone, Default)]
pub struct Problems {
    inner: Arc<Mutex<Vec<String>>>,
}

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reason: impl Into<String>) {
        lock(&self.inner).push(reason.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        lock(&self.inner).clone()
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.inner))
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

impl FailureSink for Problems {
    fn on_fail(&self, reason: String) {
        self.push(reason);
    }
}

impl fmt::Debug for Problems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(lock(&self.inner).iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

struct Node<T> {
    label: String,
    item: Option<T>,
    process: Option<Box<dyn Runnable>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A tree of processes, built up front and consumed by [`ProcessTree::start`].
pub struct ProcessTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T: TreeEntry> Default for ProcessTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TreeEntry> ProcessTree<T> {
    /// A tree holding only the synthetic root, which wraps no process.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                label: "/".to_string(),
                item: None,
                process: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Let the root wrap `process`; every item then waits for it.
    pub fn with_root_process(mut self, process: Box<dyn Runnable>) -> Self {
        self.nodes[ROOT].label = process.name().to_string();
        self.nodes[ROOT].process = Some(process);
        self
    }

    /// Insert `items` in order, each below the parent chosen by `attachment`.
    pub fn hierarchical<I, F>(items: I, attachment: Attachment, mut make: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&T) -> Box<dyn Runnable>,
    {
        let mut tree = Self::new();
        for item in items {
            let process = make(&item);
            tree.insert(item, process, attachment);
        }
        tree
    }

    /// Insert every item directly below the root.
    pub fn flat<I, F>(items: I, mut make: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&T) -> Box<dyn Runnable>,
    {
        let mut tree = Self::new();
        for item in items {
            let process = make(&item);
            tree.attach(ROOT, item, process);
        }
        tree
    }

    pub fn insert(&mut self, item: T, process: Box<dyn Runnable>, attachment: Attachment) -> NodeId {
        let parent = self.find_parent(item.tree_path(), attachment);
        self.attach(parent, item, process)
    }

    /// Insert below an explicit parent. `None` when `parent` is not a node
    /// of this tree.
    pub fn insert_under(&mut self, parent: NodeId, item: T, process: Box<dyn Runnable>) -> Option<NodeId> {
        if parent >= self.nodes.len() {
            return None;
        }
        Some(self.attach(parent, item, process))
    }

    fn attach(&mut self, parent: NodeId, item: T, process: Box<dyn Runnable>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            label: item.tree_path().to_string(),
            item: Some(item),
            process: Some(process),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// The node a new item with `path` would be attached to.
    pub fn find_parent(&self, path: &str, attachment: Attachment) -> NodeId {
        match attachment {
            Attachment::LastRootMatch => self.nodes[ROOT]
                .children
                .iter()
                .copied()
                .filter(|&id| self.is_folder_node(id) && path.starts_with(&self.nodes[id].label))
                .last()
                .unwrap_or(ROOT),
            Attachment::DeepestPrefix => (1..self.nodes.len())
                .filter(|&id| self.is_folder_node(id) && is_within(path, &self.nodes[id].label))
                .fold(None::<NodeId>, |best, id| match best {
                    Some(b) if self.nodes[b].label.len() > self.nodes[id].label.len() => Some(b),
                    _ => Some(id),
                })
                .unwrap_or(ROOT),
        }
    }

    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(id).map(|node| node.children.as_slice())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    pub fn item(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id).and_then(|node| node.item.as_ref())
    }

    /// Number of nodes, synthetic root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds no item.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Path of every item in preorder, for logs and tests.
    pub fn preorder_paths(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.nodes.len() - 1);
        let mut stack: Vec<NodeId> = self.nodes[ROOT].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(self.nodes[id].label.clone());
            stack.extend(self.nodes[id].children.iter().rev());
        }
        out
    }

    fn is_folder_node(&self, id: NodeId) -> bool {
        self.nodes[id].item.as_ref().is_some_and(TreeEntry::is_folder)
    }

    /// Start the root and return a handle observing quiescence.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(mut self, sink: Arc<dyn FailureSink>) -> TreeHandle {
        let total = self.nodes.len();
        let root = detach(&mut self.nodes, ROOT);
        let (done, done_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(total),
            done,
            sink,
        });
        tracing::debug!(nodes = total, "starting process tree");
        tokio::spawn(run_node(root, shared.clone()));
        TreeHandle {
            shared,
            done_rx,
            total,
        }
    }
}

/// Whether `path` lies inside `folder`, on a component boundary.
fn is_within(path: &str, folder: &str) -> bool {
    match path.strip_prefix(folder) {
        Some(rest) => folder.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Owned form of a node, moved into the task that drives it.
struct Detached {
    label: String,
    process: Option<Box<dyn Runnable>>,
    children: Vec<Detached>,
}

impl Detached {
    fn len(&self) -> usize {
        1 + self.children.iter().map(Detached::len).sum::<usize>()
    }
}

fn detach<T>(nodes: &mut [Node<T>], id: NodeId) -> Detached {
    let children = std::mem::take(&mut nodes[id].children);
    Detached {
        label: std::mem::take(&mut nodes[id].label),
        process: nodes[id].process.take(),
        children: children.into_iter().map(|child| detach(nodes, child)).collect(),
    }
}

struct Shared {
    pending: AtomicUsize,
    done: watch::Sender<bool>,
    sink: Arc<dyn FailureSink>,
}

impl Shared {
    fn settle(&self, nodes: usize) {
        if self.pending.fetch_sub(nodes, Ordering::AcqRel) == nodes {
            self.done.send_replace(true);
        }
    }
}

type NodeFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// Boxed so the task spawning its children has a nameable type.
fn run_node(node: Detached, shared: Arc<Shared>) -> NodeFuture {
    Box::pin(async move {
        let outcome = match node.process {
            Some(process) => match tokio::spawn(process.run_to_end()).await {
                Ok(result) => result,
                Err(join) => Err(format!("process '{}' aborted: {join}", node.label)),
            },
            None => Ok(()),
        };

        match outcome {
            Ok(()) => {
                for child in node.children {
                    tokio::spawn(run_node(child, shared.clone()));
                }
                shared.settle(1);
            }
            Err(reason) => {
                tracing::warn!(node = %node.label, reason = %reason, "tree node failed");
                shared.sink.on_fail(reason);
                let mut skipped = 0;
                for child in &node.children {
                    skip(child, &node.label, &*shared.sink);
                    skipped += child.len();
                }
                shared.settle(1 + skipped);
            }
        }
    })
}

/// Report `node` and its descendants as not run because `failed` failed.
fn skip(node: &Detached, failed: &str, sink: &dyn FailureSink) {
    sink.on_fail(format!("'{}' skipped: '{failed}' failed", node.label));
    for child in &node.children {
        skip(child, failed, sink);
    }
}

/// Observes a started tree. Clones observe the same tree.
#[derive(Clone)]
pub struct TreeHandle {
    shared: Arc<Shared>,
    done_rx: watch::Receiver<bool>,
    total: usize,
}

impl TreeHandle {
    /// True once every node, root included, is terminal.
    pub fn is_done(&self) -> bool {
        self.pending() == 0
    }

    /// Nodes not yet terminal.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Nodes in the tree, synthetic root included.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Resolve once the whole tree is quiescent.
    pub async fn wait(&self) {
        let mut rx = self.done_rx.clone();
        // The sender lives in `shared`, which this handle keeps alive.
        let _ = rx.wait_for(|done| *done).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
