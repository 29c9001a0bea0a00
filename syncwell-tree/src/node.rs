//! Tree nodes, their public views and change events.

use serde::Serialize;
use syncwell_core::{
    next_attempt_token, AttemptToken, LoadStatus, NodeKind, NodePath, NodePayload, RemoteError,
};

/// A node as owned by the loader.
#[derive(Debug, Clone)]
pub(crate) struct TreeNode {
    pub(crate) path: NodePath,
    pub(crate) kind: NodeKind,
    pub(crate) payload: NodePayload,
    /// `None` until the first successful load.
    pub(crate) children: Option<Vec<NodePath>>,
    pub(crate) status: LoadStatus,
    pub(crate) error: Option<RemoteError>,
    pub(crate) expanded: bool,
    pub(crate) attempt: Option<AttemptToken>,
}

impl TreeNode {
    /// Terminal nodes start out loaded with no children.
    pub(crate) fn new(path: NodePath, payload: NodePayload) -> Self {
        let kind = payload.kind();
        let (status, children) = if kind.is_terminal() {
            (LoadStatus::Loaded, Some(Vec::new()))
        } else {
            (LoadStatus::Unloaded, None)
        };
        Self {
            path,
            kind,
            payload,
            children,
            status,
            error: None,
            expanded: false,
            attempt: None,
        }
    }

    /// Stamp a new load, superseding any load in flight.
    pub(crate) fn begin_load(&mut self) -> AttemptToken {
        let attempt = next_attempt_token();
        self.status = LoadStatus::Loading;
        self.attempt = Some(attempt);
        attempt
    }

    pub(crate) fn view(&self) -> NodeView {
        NodeView {
            path: self.path.clone(),
            kind: self.kind,
            load_status: self.status,
            expanded: self.expanded,
            children: self.children.clone(),
            payload: self.payload.clone(),
            error: self.error.clone(),
        }
    }
}

/// Read-only view of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub path: NodePath,
    pub kind: NodeKind,
    pub load_status: LoadStatus,
    pub expanded: bool,
    pub children: Option<Vec<NodePath>>,
    pub payload: NodePayload,
    pub error: Option<RemoteError>,
}

impl NodeView {
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// Indentation level; the root is 0.
    pub fn depth(&self) -> usize {
        self.path.depth()
    }

    pub fn parent(&self) -> Option<NodePath> {
        self.path.parent()
    }

    pub fn label(&self) -> String {
        self.payload.describe(self.name())
    }

    pub fn has_children(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Change notification broadcast by the loader.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeEvent {
    Expanded { path: NodePath },
    Collapsed { path: NodePath },
    LoadStarted { path: NodePath },
    Loaded { path: NodePath, children: usize },
    LoadFailed { path: NodePath, error: RemoteError },
}

impl TreeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Expanded { .. } => "expanded",
            Self::Collapsed { .. } => "collapsed",
            Self::LoadStarted { .. } => "load_started",
            Self::Loaded { .. } => "loaded",
            Self::LoadFailed { .. } => "load_failed",
        }
    }

    pub fn path(&self) -> &NodePath {
        match self {
            Self::Expanded { path }
            | Self::Collapsed { path }
            | Self::LoadStarted { path }
            | Self::Loaded { path, .. }
            | Self::LoadFailed { path, .. } => path,
        }
    }
}
