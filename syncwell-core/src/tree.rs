//! Identity and payload types for the lazily loaded resource tree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a node in the database tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A database connection.
    Root,
    Schema,
    Table,
    Column,
}

impl NodeKind {
    /// Kind of the children this node loads, or `None` for terminal nodes.
    pub fn child_kind(&self) -> Option<NodeKind> {
        match self {
            Self::Root => Some(Self::Schema),
            Self::Schema => Some(Self::Table),
            Self::Table => Some(Self::Column),
            Self::Column => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.child_kind().is_none()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Schema => write!(f, "schema"),
            Self::Table => write!(f, "table"),
            Self::Column => write!(f, "column"),
        }
    }
}

/// Path of a node from the root, e.g. `["main", "public", "users", "id"]`.
///
/// The path is the node's identity: two fetches that return a child with the
/// same name under the same parent address the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// Zero for the root.
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Table flavour as reported by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    #[default]
    Table,
    View,
}

impl TableType {
    /// Parse the loose type string the metadata endpoint returns
    /// (`"BASE TABLE"`, `"table"`, `"VIEW"`...).
    pub fn parse_lossy(raw: &str) -> Self {
        if raw.to_ascii_lowercase().contains("view") {
            Self::View
        } else {
            Self::Table
        }
    }
}

/// Kind-specific attributes of a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodePayload {
    Root {
        database_type: Option<String>,
    },
    Schema,
    Table {
        table_type: TableType,
        row_count: Option<u64>,
    },
    Column {
        data_type: String,
        nullable: bool,
        default: Option<String>,
        position: u32,
    },
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Root { .. } => NodeKind::Root,
            Self::Schema => NodeKind::Schema,
            Self::Table { .. } => NodeKind::Table,
            Self::Column { .. } => NodeKind::Column,
        }
    }

    /// Short label, e.g. `id (integer, nullable, default: 0)`.
    pub fn describe(&self, name: &str) -> String {
        match self {
            Self::Column {
                data_type,
                nullable,
                default,
                ..
            } => {
                let mut label = format!("{} ({}", name, data_type);
                if *nullable {
                    label.push_str(", nullable");
                }
                if let Some(default) = default {
                    label.push_str(&format!(", default: {}", default));
                }
                label.push(')');
                label
            }
            Self::Table {
                row_count: Some(rows),
                ..
            } => format!("{} ({})", name, rows),
            _ => name.to_string(),
        }
    }
}

/// One child as returned by a `list_children` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDescriptor {
    pub name: String,
    pub payload: NodePayload,
}

impl ChildDescriptor {
    pub fn new(name: impl Into<String>, payload: NodePayload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn schema(name: impl Into<String>) -> Self {
        Self::new(name, NodePayload::Schema)
    }

    pub fn table(name: impl Into<String>, table_type: TableType) -> Self {
        Self::new(
            name,
            NodePayload::Table {
                table_type,
                row_count: None,
            },
        )
    }

    pub fn column(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        position: u32,
    ) -> Self {
        Self::new(
            name,
            NodePayload::Column {
                data_type: data_type.into(),
                nullable,
                default: None,
                position,
            },
        )
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }
}
