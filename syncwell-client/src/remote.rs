//! Remote API capabilities and their REST implementations.
//!
//! The board and tree only see these traits, so tests can swap the transport
//! for in-memory fakes.

use crate::api_client::RestClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use syncwell_core::{
    ChildDescriptor, DatabaseConnection, ListTagsParams, ListTicketsParams, NodePath, NodePayload,
    RemoteError, TableType, Tag, TagCreate, Ticket, TicketCreate, TicketUpdate, TicketsPage,
};
use syncwell_tree::ChildFetcher;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait TicketsApi: Send + Sync {
    async fn list_tickets(&self, params: &ListTicketsParams) -> Result<TicketsPage, RemoteError>;
    async fn get_ticket(&self, id: Uuid) -> Result<Ticket, RemoteError>;
    async fn create_ticket(&self, create: &TicketCreate) -> Result<Ticket, RemoteError>;
    async fn update_ticket(&self, id: Uuid, update: &TicketUpdate) -> Result<Ticket, RemoteError>;
    async fn delete_ticket(&self, id: Uuid) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait TagsApi: Send + Sync {
    async fn list_tags(&self, params: &ListTagsParams) -> Result<Vec<Tag>, RemoteError>;
    async fn create_tag(&self, create: &TagCreate) -> Result<Tag, RemoteError>;
    async fn delete_tag(&self, id: Uuid) -> Result<(), RemoteError>;
}

/// Tables of one schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaTables {
    pub name: String,
    pub tables: Vec<TableInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableInfo {
    pub name: String,
    /// Loose type string, e.g. `BASE TABLE` or `VIEW`.
    #[serde(rename = "type")]
    pub table_type: String,
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub position: u32,
}

#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<DatabaseConnection>, RemoteError>;

    /// Schemas with their tables, optionally narrowed to one schema.
    async fn list_tables(
        &self,
        database: &str,
        schema: Option<&str>,
    ) -> Result<Vec<SchemaTables>, RemoteError>;

    async fn list_columns(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, RemoteError>;
}

// ============================================================================
// REST IMPLEMENTATIONS
// ============================================================================

#[async_trait]
impl TicketsApi for RestClient {
    async fn list_tickets(&self, params: &ListTicketsParams) -> Result<TicketsPage, RemoteError> {
        let pairs = params.to_query_pairs();
        self.get_json("/tickets", Some(&pairs)).await
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Ticket, RemoteError> {
        self.get_json::<_, ()>(&format!("/tickets/{}", id), None).await
    }

    async fn create_ticket(&self, create: &TicketCreate) -> Result<Ticket, RemoteError> {
        self.post_json("/tickets", create).await
    }

    async fn update_ticket(&self, id: Uuid, update: &TicketUpdate) -> Result<Ticket, RemoteError> {
        self.patch_json(&format!("/tickets/{}", id), update).await
    }

    async fn delete_ticket(&self, id: Uuid) -> Result<(), RemoteError> {
        self.delete(&format!("/tickets/{}", id)).await
    }
}

#[async_trait]
impl TagsApi for RestClient {
    async fn list_tags(&self, params: &ListTagsParams) -> Result<Vec<Tag>, RemoteError> {
        match params.q.as_deref().filter(|q| !q.is_empty()) {
            Some(q) => self.get_json("/tags", Some(&[("q", q)])).await,
            None => self.get_json::<_, ()>("/tags", None).await,
        }
    }

    async fn create_tag(&self, create: &TagCreate) -> Result<Tag, RemoteError> {
        self.post_json("/tags", create).await
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), RemoteError> {
        self.delete(&format!("/tags/{}", id)).await
    }
}

#[derive(Deserialize)]
struct DatabasesResponse {
    databases: Vec<DatabaseConnection>,
}

#[derive(Deserialize)]
struct TablesResponse {
    schemas: Vec<SchemaTables>,
}

#[derive(Deserialize)]
struct ColumnsResponse {
    columns: Vec<ColumnInfo>,
}

#[async_trait]
impl DatabaseApi for RestClient {
    async fn list_databases(&self) -> Result<Vec<DatabaseConnection>, RemoteError> {
        let response: DatabasesResponse = self.get_json::<_, ()>("/dbs", None).await?;
        Ok(response.databases)
    }

    async fn list_tables(
        &self,
        database: &str,
        schema: Option<&str>,
    ) -> Result<Vec<SchemaTables>, RemoteError> {
        let path = format!("/dbs/{}/tables", database);
        let response: TablesResponse = match schema {
            Some(schema) => self.get_json(&path, Some(&[("schema", schema)])).await?,
            None => self.get_json::<_, ()>(&path, None).await?,
        };
        Ok(response.schemas)
    }

    async fn list_columns(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, RemoteError> {
        let path = format!("/dbs/{}/tables/{}/{}/columns", database, schema, table);
        let response: ColumnsResponse = self.get_json::<_, ()>(&path, None).await?;
        Ok(response.columns)
    }
}

// ============================================================================
// TREE SOURCE
// ============================================================================

/// Feeds a lazy tree from the database metadata endpoints.
///
/// The path depth picks the listing: the root lists schemas, a schema lists
/// its tables and a table lists its columns.
#[derive(Clone)]
pub struct DatabaseTreeSource {
    api: Arc<dyn DatabaseApi>,
}

impl DatabaseTreeSource {
    pub fn new(api: Arc<dyn DatabaseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChildFetcher for DatabaseTreeSource {
    async fn list_children(&self, path: &NodePath) -> Result<Vec<ChildDescriptor>, RemoteError> {
        let segments = path.segments();
        debug!(path = %path, depth = path.depth(), "Listing children");
        match segments {
            [database] => {
                let schemas = self.api.list_tables(database, None).await?;
                Ok(schemas
                    .into_iter()
                    .map(|s| ChildDescriptor::schema(s.name))
                    .collect())
            }
            [database, schema] => {
                let schemas = self.api.list_tables(database, Some(schema)).await?;
                Ok(schemas
                    .into_iter()
                    .filter(|s| s.name == *schema)
                    .flat_map(|s| s.tables)
                    .map(|t| ChildDescriptor::table(t.name, TableType::parse_lossy(&t.table_type)))
                    .collect())
            }
            [database, schema, table] => {
                let mut columns = self.api.list_columns(database, schema, table).await?;
                columns.sort_by_key(|c| c.position);
                Ok(columns
                    .into_iter()
                    .map(|c| {
                        ChildDescriptor::new(
                            c.name,
                            NodePayload::Column {
                                data_type: c.data_type,
                                nullable: c.nullable,
                                default: c.default,
                                position: c.position,
                            },
                        )
                    })
                    .collect())
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDatabase {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DatabaseApi for FakeDatabase {
        async fn list_databases(&self) -> Result<Vec<DatabaseConnection>, RemoteError> {
            Ok(Vec::new())
        }

        async fn list_tables(
            &self,
            database: &str,
            schema: Option<&str>,
        ) -> Result<Vec<SchemaTables>, RemoteError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("tables {} {:?}", database, schema));
            let table = |name: &str, kind: &str, schema: &str| TableInfo {
                name: name.to_string(),
                table_type: kind.to_string(),
                schema: schema.to_string(),
            };
            Ok(vec![
                SchemaTables {
                    name: "public".to_string(),
                    tables: vec![
                        table("users", "BASE TABLE", "public"),
                        table("active_users", "VIEW", "public"),
                    ],
                },
                SchemaTables {
                    name: "audit".to_string(),
                    tables: vec![table("events", "BASE TABLE", "audit")],
                },
            ])
        }

        async fn list_columns(
            &self,
            _database: &str,
            _schema: &str,
            table: &str,
        ) -> Result<Vec<ColumnInfo>, RemoteError> {
            if table != "users" {
                return Err(RemoteError::server("table_not_found", "Table not found"));
            }
            Ok(vec![
                ColumnInfo {
                    name: "email".to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                    default: None,
                    position: 2,
                },
                ColumnInfo {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    nullable: false,
                    default: Some("nextval('users_id_seq')".to_string()),
                    position: 1,
                },
            ])
        }
    }

    fn source() -> (Arc<FakeDatabase>, DatabaseTreeSource) {
        let db = Arc::new(FakeDatabase::default());
        (db.clone(), DatabaseTreeSource::new(db))
    }

    #[tokio::test]
    async fn test_root_lists_schemas() {
        let (db, source) = source();
        let children = source.list_children(&NodePath::root("main")).await.unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["public", "audit"]);
        assert_eq!(db.calls.lock().unwrap()[0], "tables main None");
    }

    #[tokio::test]
    async fn test_schema_lists_only_its_tables() {
        let (_, source) = source();
        let path = NodePath::from_segments(["main", "public"]);
        let children = source.list_children(&path).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(
            children[1].payload,
            NodePayload::Table {
                table_type: TableType::View,
                row_count: None
            }
        );
    }

    #[tokio::test]
    async fn test_table_lists_columns_by_position() {
        let (_, source) = source();
        let path = NodePath::from_segments(["main", "public", "users"]);
        let children = source.list_children(&path).await.unwrap();
        assert_eq!(children[0].name, "id");
        assert_eq!(children[1].name, "email");
        assert!(matches!(
            &children[0].payload,
            NodePayload::Column { default: Some(_), nullable: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_table_error_propagates() {
        let (_, source) = source();
        let path = NodePath::from_segments(["main", "audit", "missing"]);
        let err = source.list_children(&path).await.unwrap_err();
        assert_eq!(err.code, "table_not_found");
    }

    #[tokio::test]
    async fn test_column_path_has_no_children() {
        let (_, source) = source();
        let path = NodePath::from_segments(["main", "public", "users", "id"]);
        assert!(source.list_children(&path).await.unwrap().is_empty());
    }
}
