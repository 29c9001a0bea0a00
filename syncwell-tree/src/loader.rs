//! Lazy loader for the database → schema → table → column tree.
//!
//! Children of a node are unknown until the node is expanded. Each node keeps
//! its own load status, so a failed load under one table leaves every sibling
//! alone. Expansion is view state: collapsing never drops loaded children and
//! re-expanding a loaded node never fetches. Only `refresh` reloads a loaded
//! node, and it keeps the subtree of every child that survives the reload.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use syncwell_core::{
    AttemptToken, ChildDescriptor, LoadStatus, NodePath, NodePayload, RemoteError, TreeError,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::fetcher::ChildFetcher;
use crate::node::{NodeView, TreeEvent, TreeNode};

const EVENT_CAPACITY: usize = 256;

/// What an `expand` or `refresh` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Children were already loaded; nothing was fetched.
    AlreadyLoaded,
    /// A load was already running; no second fetch was issued.
    InFlight,
    /// Children were fetched and attached.
    Loaded(usize),
    /// The fetch completed after a newer load replaced it and was dropped.
    Superseded,
}

struct TreeInner {
    root: NodePath,
    nodes: HashMap<NodePath, TreeNode>,
}

impl TreeInner {
    fn node_mut(&mut self, path: &NodePath) -> Result<&mut TreeNode, TreeError> {
        self.nodes.get_mut(path).ok_or_else(|| TreeError::NodeNotFound {
            path: path.to_string(),
        })
    }

    /// Replace the children of `parent`, keeping every existing child node
    /// whose path and kind are unchanged.
    fn merge_children(&mut self, parent: &NodePath, children: Vec<ChildDescriptor>) -> usize {
        let previous = self
            .nodes
            .get(parent)
            .and_then(|node| node.children.clone())
            .unwrap_or_default();

        let mut next: Vec<NodePath> = Vec::with_capacity(children.len());
        for child in children {
            let path = parent.child(&child.name);
            if next.contains(&path) {
                continue;
            }
            let reusable = self
                .nodes
                .get(&path)
                .is_some_and(|node| node.kind == child.kind());
            if reusable {
                if let Some(existing) = self.nodes.get_mut(&path) {
                    existing.payload = child.payload;
                }
            } else {
                self.remove_subtree(&path);
                self.nodes
                    .insert(path.clone(), TreeNode::new(path.clone(), child.payload));
            }
            next.push(path);
        }

        for old in previous.iter().filter(|old| !next.contains(old)) {
            self.remove_subtree(old);
        }

        let count = next.len();
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children = Some(next);
        }
        count
    }

    fn remove_subtree(&mut self, path: &NodePath) {
        let Some(node) = self.nodes.remove(path) else {
            return;
        };
        for child in node.children.unwrap_or_default() {
            self.remove_subtree(&child);
        }
    }

    fn collect_visible(&self, path: &NodePath, rows: &mut Vec<NodeView>) {
        let Some(node) = self.nodes.get(path) else {
            return;
        };
        rows.push(node.view());
        if !node.expanded {
            return;
        }
        for child in node.children.iter().flatten() {
            self.collect_visible(child, rows);
        }
    }
}

/// One database's metadata tree.
///
/// Child loads run on spawned tokio tasks, so `expand` and `refresh` must be
/// called from within a tokio runtime.
#[derive(Clone)]
pub struct LazyTreeLoader {
    inner: Arc<Mutex<TreeInner>>,
    fetcher: Arc<dyn ChildFetcher>,
    events: broadcast::Sender<TreeEvent>,
}

impl LazyTreeLoader {
    /// Create a tree holding just the unloaded root for `database`.
    pub fn new(database: impl Into<String>, fetcher: Arc<dyn ChildFetcher>) -> Self {
        Self::with_root_payload(database, NodePayload::Root { database_type: None }, fetcher)
    }

    pub fn with_root_payload(
        database: impl Into<String>,
        payload: NodePayload,
        fetcher: Arc<dyn ChildFetcher>,
    ) -> Self {
        let root = NodePath::root(database);
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), TreeNode::new(root.clone(), payload));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(TreeInner { root, nodes })),
            fetcher,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, event: TreeEvent) {
        let event_type = event.event_type();
        match self.events.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "Broadcast tree event"),
            Err(_) => debug!(event_type, "No receivers for tree event"),
        }
    }

    /// Receive every future [`TreeEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    pub fn root_path(&self) -> NodePath {
        self.lock().root.clone()
    }

    /// Mark `path` expanded and load its children unless they are loaded or
    /// already loading.
    ///
    /// A failed load leaves the node in `error` with its previous children,
    /// and is returned as [`TreeError::LoadFailed`]. Expanding an errored
    /// node retries.
    pub async fn expand(&self, path: &NodePath) -> Result<ExpandOutcome, TreeError> {
        let attempt = {
            let mut inner = self.lock();
            let node = inner.node_mut(path)?;
            if !node.expanded {
                node.expanded = true;
                self.broadcast(TreeEvent::Expanded { path: path.clone() });
            }
            match node.status {
                LoadStatus::Loaded => return Ok(ExpandOutcome::AlreadyLoaded),
                LoadStatus::Loading => {
                    debug!(path = %path, "Expand joined in-flight load");
                    return Ok(ExpandOutcome::InFlight);
                }
                LoadStatus::Unloaded | LoadStatus::Error => node.begin_load(),
            }
        };
        self.load(path, attempt).await
    }

    /// Mark `path` collapsed. Loaded children are kept.
    pub fn collapse(&self, path: &NodePath) -> Result<(), TreeError> {
        let mut inner = self.lock();
        let node = inner.node_mut(path)?;
        if node.expanded {
            node.expanded = false;
            self.broadcast(TreeEvent::Collapsed { path: path.clone() });
        }
        Ok(())
    }

    /// Reload the children of `path` whatever its status, superseding a load
    /// in flight.
    ///
    /// Children that come back under the same name and kind keep their node,
    /// including its own children, load status and expansion. Children that
    /// are gone are dropped with their subtrees. Terminal nodes have nothing
    /// to reload.
    pub async fn refresh(&self, path: &NodePath) -> Result<ExpandOutcome, TreeError> {
        let attempt = {
            let mut inner = self.lock();
            let node = inner.node_mut(path)?;
            if node.kind.is_terminal() {
                return Ok(ExpandOutcome::AlreadyLoaded);
            }
            if let Some(previous) = node.attempt {
                debug!(path = %path, attempt = previous, "Refresh superseding in-flight load");
            }
            node.begin_load()
        };
        self.load(path, attempt).await
    }

    /// Run the fetch for `attempt` on its own task and wait for it.
    ///
    /// The task settles the node even if the caller stops waiting, so a
    /// dropped `expand` never leaves the node stuck in `loading`.
    async fn load(&self, path: &NodePath, attempt: AttemptToken) -> Result<ExpandOutcome, TreeError> {
        self.broadcast(TreeEvent::LoadStarted { path: path.clone() });
        debug!(path = %path, attempt, "Loading children");

        let loader = self.clone();
        let target = path.clone();
        let task = tokio::spawn(async move {
            let result = loader.fetcher.list_children(&target).await;
            loader.complete(&target, attempt, result)
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => self.complete(
                path,
                attempt,
                Err(RemoteError::unknown(format!("Child load aborted: {}", join_error))),
            ),
        }
    }

    fn complete(
        &self,
        path: &NodePath,
        attempt: AttemptToken,
        result: Result<Vec<ChildDescriptor>, RemoteError>,
    ) -> Result<ExpandOutcome, TreeError> {
        let mut inner = self.lock();
        let current = inner
            .nodes
            .get(path)
            .is_some_and(|node| node.attempt == Some(attempt));
        if !current {
            debug!(path = %path, attempt, "Discarding superseded children");
            return Ok(ExpandOutcome::Superseded);
        }

        match result {
            Ok(children) => {
                let count = inner.merge_children(path, children);
                let node = inner.node_mut(path)?;
                node.status = LoadStatus::Loaded;
                node.error = None;
                node.attempt = None;
                debug!(path = %path, children = count, "Children loaded");
                self.broadcast(TreeEvent::Loaded {
                    path: path.clone(),
                    children: count,
                });
                Ok(ExpandOutcome::Loaded(count))
            }
            Err(source) => {
                let node = inner.node_mut(path)?;
                node.status = LoadStatus::Error;
                node.error = Some(source.clone());
                node.attempt = None;
                warn!(
                    path = %path,
                    kind = %source.kind,
                    code = %source.code,
                    "Loading children failed"
                );
                self.broadcast(TreeEvent::LoadFailed {
                    path: path.clone(),
                    error: source.clone(),
                });
                Err(TreeError::LoadFailed {
                    path: path.to_string(),
                    source,
                })
            }
        }
    }

    pub fn node(&self, path: &NodePath) -> Option<NodeView> {
        self.lock().nodes.get(path).map(TreeNode::view)
    }

    pub fn root(&self) -> NodeView {
        let inner = self.lock();
        // The root is inserted at construction and never removed.
        inner
            .nodes
            .get(&inner.root)
            .map(TreeNode::view)
            .unwrap_or_else(|| {
                TreeNode::new(inner.root.clone(), NodePayload::Root { database_type: None }).view()
            })
    }

    /// Views of the loaded children of `path`, in load order.
    pub fn children(&self, path: &NodePath) -> Option<Vec<NodeView>> {
        let inner = self.lock();
        let node = inner.nodes.get(path)?;
        let children = node.children.as_ref()?;
        Some(
            children
                .iter()
                .filter_map(|child| inner.nodes.get(child).map(TreeNode::view))
                .collect(),
        )
    }

    /// Depth-first list of the root and every node under an expanded chain.
    pub fn visible_rows(&self) -> Vec<NodeView> {
        let inner = self.lock();
        let mut rows = Vec::new();
        inner.collect_visible(&inner.root, &mut rows);
        rows
    }

    /// Number of nodes currently held, root included.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Error of the latest failed load of `path`.
    pub fn error(&self, path: &NodePath) -> Option<RemoteError> {
        self.lock().nodes.get(path).and_then(|node| node.error.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================
