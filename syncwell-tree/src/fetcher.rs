//! Children source consumed by the tree loader.

use async_trait::async_trait;
use syncwell_core::{ChildDescriptor, NodePath, RemoteError};

/// Lists the children of a tree node.
///
/// Called with the database root for its schemas, a schema for its tables and
/// a table for its columns. Column nodes are never asked.
#[async_trait]
pub trait ChildFetcher: Send + Sync {
    async fn list_children(&self, path: &NodePath) -> Result<Vec<ChildDescriptor>, RemoteError>;
}
