//! SYNCWELL Test Utilities
//!
//! Shared test infrastructure for the SYNCWELL workspace:
//! - Proptest generators for keys and resource types
//! - Fixtures for tickets, tags and database metadata
//! - Scripted remotes whose calls resolve only when the test says so

pub use syncwell_core::{
    ChildDescriptor, ErrorKind, KeyMatch, ListTagsParams, ListTicketsParams, NodePath, QueryKey,
    RemoteError, Tag, TagCreate, Ticket, TicketCreate, TicketStatus, TicketUpdate, TicketsPage,
    Timestamp,
};

pub use syncwell_client::remote::DatabaseTreeSource;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use syncwell_cache::QueryFetcher;
use syncwell_client::remote::{ColumnInfo, DatabaseApi, SchemaTables, TableInfo};
use syncwell_client::{TagsApi, TicketsApi};
use syncwell_core::DatabaseConnection;
use tokio::sync::Semaphore;
use uuid::Uuid;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Optional gate: when closed, each call waits for one permit.
#[derive(Debug, Default)]
struct Gate(Option<Semaphore>);

impl Gate {
    fn closed() -> Self {
        Self(Some(Semaphore::new(0)))
    }

    async fn pass(&self) {
        if let Some(semaphore) = &self.0 {
            if let Ok(permit) = semaphore.acquire().await {
                permit.forget();
            }
        }
    }

    fn release(&self, n: usize) {
        if let Some(semaphore) = &self.0 {
            semaphore.add_permits(n);
        }
    }
}

// ============================================================================
// GATED FETCHER
// ============================================================================

/// Query fetcher answering from a script.
///
/// Each call takes the next scripted response when it starts, then waits at
/// the gate if the fetcher was built with [`GatedFetcher::gated`]. Calls
/// finish in the order permits are released, which lets tests resolve an
/// older load after a newer one.
pub struct GatedFetcher<T> {
    responses: Mutex<VecDeque<Result<T, RemoteError>>>,
    fallback: Mutex<Option<T>>,
    keys: Mutex<Vec<QueryKey>>,
    gate: Gate,
}

impl<T: Clone + Send + 'static> GatedFetcher<T> {
    /// Calls resolve immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(Gate::default()))
    }

    /// Calls wait for [`GatedFetcher::release`].
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Gate::closed()))
    }

    fn build(gate: Gate) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            keys: Mutex::new(Vec::new()),
            gate,
        }
    }

    pub fn push_ok(&self, value: T) -> &Self {
        lock(&self.responses).push_back(Ok(value));
        self
    }

    pub fn push_err(&self, error: RemoteError) -> &Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// Value returned once the script runs out.
    pub fn always(&self, value: T) -> &Self {
        *lock(&self.fallback) = Some(value);
        self
    }

    pub fn release(&self, n: usize) {
        self.gate.release(n);
    }

    pub fn calls(&self) -> usize {
        lock(&self.keys).len()
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        lock(&self.keys).clone()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> QueryFetcher<T> for GatedFetcher<T> {
    async fn fetch(&self, key: &QueryKey) -> Result<T, RemoteError> {
        lock(&self.keys).push(key.clone());
        let scripted = lock(&self.responses).pop_front();
        let response = match scripted {
            Some(response) => response,
            None => lock(&self.fallback)
                .clone()
                .ok_or_else(|| RemoteError::unknown(format!("no scripted response for {}", key))),
        };
        self.gate.pass().await;
        response
    }
}

// ============================================================================
// MOCK TICKETS / TAGS API
// ============================================================================

/// In-memory tickets and tags service.
///
/// Listing honors status, tags, text and pagination filters. Writes can be
/// failed one at a time with [`MockTicketsApi::fail_next_write`] or held at a
/// gate with [`MockTicketsApi::with_gated_writes`].
pub struct MockTicketsApi {
    tickets: Mutex<Vec<Ticket>>,
    tags: Mutex<Vec<Tag>>,
    write_failures: Mutex<VecDeque<RemoteError>>,
    list_calls: Mutex<usize>,
    write_gate: Gate,
}

impl MockTicketsApi {
    pub fn new(tickets: Vec<Ticket>) -> Arc<Self> {
        Arc::new(Self::build(tickets, Gate::default()))
    }

    pub fn with_gated_writes(tickets: Vec<Ticket>) -> Arc<Self> {
        Arc::new(Self::build(tickets, Gate::closed()))
    }

    fn build(tickets: Vec<Ticket>, write_gate: Gate) -> Self {
        let mut tags: Vec<Tag> = Vec::new();
        for tag in tickets.iter().flat_map(|t| t.tags.iter()) {
            if !tags.iter().any(|existing| existing.id == tag.id) {
                tags.push(tag.clone());
            }
        }
        Self {
            tickets: Mutex::new(tickets),
            tags: Mutex::new(tags),
            write_failures: Mutex::new(VecDeque::new()),
            list_calls: Mutex::new(0),
            write_gate,
        }
    }

    pub fn fail_next_write(&self, error: RemoteError) {
        lock(&self.write_failures).push_back(error);
    }

    pub fn release_writes(&self, n: usize) {
        self.write_gate.release(n);
    }

    pub fn list_calls(&self) -> usize {
        *lock(&self.list_calls)
    }

    pub fn stored_tickets(&self) -> Vec<Ticket> {
        lock(&self.tickets).clone()
    }

    pub fn stored_tags(&self) -> Vec<Tag> {
        lock(&self.tags).clone()
    }

    async fn begin_write(&self) -> Result<(), RemoteError> {
        self.write_gate.pass().await;
        match lock(&self.write_failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn tag_named(&self, name: &str) -> Tag {
        let mut tags = lock(&self.tags);
        if let Some(existing) = tags.iter().find(|t| t.name.eq_ignore_ascii_case(name)) {
            return existing.clone();
        }
        let tag = fixtures::tag(name);
        tags.push(tag.clone());
        tag
    }

    fn not_found(id: Uuid) -> RemoteError {
        RemoteError::server("ticket_not_found", format!("Ticket {} not found", id))
    }
}

fn listing_matches(ticket: &Ticket, params: &ListTicketsParams) -> bool {
    if params.status.is_some_and(|s| s != ticket.status) {
        return false;
    }
    if let Some(q) = params.q.as_deref().filter(|q| !q.is_empty()) {
        if !ticket.title.to_lowercase().contains(&q.to_lowercase()) {
            return false;
        }
    }
    params
        .tags
        .iter()
        .all(|name| ticket.tags.iter().any(|t| &t.name == name))
}

#[async_trait]
impl TicketsApi for MockTicketsApi {
    async fn list_tickets(&self, params: &ListTicketsParams) -> Result<TicketsPage, RemoteError> {
        *lock(&self.list_calls) += 1;
        let matching: Vec<Ticket> = lock(&self.tickets)
            .iter()
            .filter(|t| listing_matches(t, params))
            .cloned()
            .collect();
        let offset = params.offset.unwrap_or(0) as usize;
        let limit = params.limit.filter(|l| *l > 0).unwrap_or(20) as usize;
        Ok(TicketsPage {
            total: matching.len() as u64,
            items: matching.into_iter().skip(offset).take(limit).collect(),
        })
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Ticket, RemoteError> {
        lock(&self.tickets)
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create_ticket(&self, create: &TicketCreate) -> Result<Ticket, RemoteError> {
        self.begin_write().await?;
        if create.title.trim().is_empty() {
            return Err(RemoteError::validation("validation_error", "title must not be empty")
                .with_details(serde_json::json!({ "field": "title" })));
        }
        let mut ticket = fixtures::ticket(&create.title, TicketStatus::Open);
        ticket.description = create.description.clone();
        ticket.tags = create.tags.iter().map(|name| self.tag_named(name)).collect();
        lock(&self.tickets).push(ticket.clone());
        Ok(ticket)
    }

    async fn update_ticket(&self, id: Uuid, update: &TicketUpdate) -> Result<Ticket, RemoteError> {
        self.begin_write().await?;
        let tags = update
            .tags
            .as_ref()
            .map(|names| names.iter().map(|n| self.tag_named(n)).collect::<Vec<_>>());
        let mut tickets = lock(&self.tickets);
        let ticket = tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        if let Some(title) = &update.title {
            ticket.title = title.clone();
        }
        if let Some(description) = &update.description {
            ticket.description = Some(description.clone());
        }
        if let Some(status) = update.status {
            ticket.status = status;
        }
        if let Some(tags) = tags {
            ticket.tags = tags;
        }
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn delete_ticket(&self, id: Uuid) -> Result<(), RemoteError> {
        self.begin_write().await?;
        let mut tickets = lock(&self.tickets);
        let before = tickets.len();
        tickets.retain(|t| t.id != id);
        if tickets.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TagsApi for MockTicketsApi {
    async fn list_tags(&self, params: &ListTagsParams) -> Result<Vec<Tag>, RemoteError> {
        let needle = params.q.clone().unwrap_or_default().to_lowercase();
        Ok(lock(&self.tags)
            .iter()
            .filter(|t| t.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn create_tag(&self, create: &TagCreate) -> Result<Tag, RemoteError> {
        self.begin_write().await?;
        Ok(self.tag_named(&create.name))
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), RemoteError> {
        self.begin_write().await?;
        lock(&self.tags).retain(|t| t.id != id);
        for ticket in lock(&self.tickets).iter_mut() {
            ticket.tags.retain(|t| t.id != id);
        }
        Ok(())
    }
}

// ============================================================================
// MOCK DATABASE API
// ============================================================================

/// In-memory database metadata: schema → table → columns.
///
/// Tables and columns can be changed between calls to simulate schema drift,
/// and single tables can be made to fail.
pub struct MockDatabaseApi {
    database: String,
    schemas: Mutex<BTreeMap<String, BTreeMap<String, Vec<ColumnInfo>>>>,
    failing_tables: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<String>>,
    gate: Gate,
}

impl MockDatabaseApi {
    pub fn new(database: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(database.into(), Gate::default()))
    }

    /// Every call waits for [`MockDatabaseApi::release`].
    pub fn gated(database: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(database.into(), Gate::closed()))
    }

    /// `public.users(id, email)` and `public.orders(id, user_id, total)`
    /// plus an empty `audit` schema.
    pub fn sample() -> Arc<Self> {
        let api = Self::new("main");
        api.add_table("public", "users", &["id", "email"]);
        api.add_table("public", "orders", &["id", "user_id", "total"]);
        api.add_schema("audit");
        api
    }

    fn build(database: String, gate: Gate) -> Self {
        Self {
            database,
            schemas: Mutex::new(BTreeMap::new()),
            failing_tables: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            gate,
        }
    }

    pub fn add_schema(&self, schema: &str) {
        lock(&self.schemas).entry(schema.to_string()).or_default();
    }

    /// Columns get type `text`, nullable, positions from 1.
    pub fn add_table(&self, schema: &str, table: &str, columns: &[&str]) {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnInfo {
                name: name.to_string(),
                data_type: "text".to_string(),
                nullable: true,
                default: None,
                position: i as u32 + 1,
            })
            .collect();
        lock(&self.schemas)
            .entry(schema.to_string())
            .or_default()
            .insert(table.to_string(), columns);
    }

    pub fn drop_table(&self, schema: &str, table: &str) {
        if let Some(tables) = lock(&self.schemas).get_mut(schema) {
            tables.remove(table);
        }
    }

    pub fn fail_table(&self, schema: &str, table: &str) {
        lock(&self.failing_tables).push((schema.to_string(), table.to_string()));
    }

    pub fn heal_table(&self, schema: &str, table: &str) {
        lock(&self.failing_tables).retain(|(s, t)| !(s == schema && t == table));
    }

    pub fn release(&self, n: usize) {
        self.gate.release(n);
    }

    /// Calls made so far, e.g. `tables main public` or `columns main public users`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn unknown_database(&self, database: &str) -> Option<RemoteError> {
        (database != self.database).then(|| {
            RemoteError::server("database_not_found", format!("Database {} not found", database))
        })
    }
}

#[async_trait]
impl DatabaseApi for MockDatabaseApi {
    async fn list_databases(&self) -> Result<Vec<DatabaseConnection>, RemoteError> {
        lock(&self.calls).push("databases".to_string());
        self.gate.pass().await;
        let now = Utc::now();
        Ok(vec![DatabaseConnection {
            name: self.database.clone(),
            url: format!("postgres://localhost/{}", self.database),
            database_type: "postgres".to_string(),
            created_at: now,
            updated_at: now,
        }])
    }

    async fn list_tables(
        &self,
        database: &str,
        schema: Option<&str>,
    ) -> Result<Vec<SchemaTables>, RemoteError> {
        lock(&self.calls).push(format!(
            "tables {} {}",
            database,
            schema.unwrap_or("*")
        ));
        self.gate.pass().await;
        if let Some(error) = self.unknown_database(database) {
            return Err(error);
        }
        let schemas = lock(&self.schemas);
        Ok(schemas
            .iter()
            .filter(|(name, _)| schema.map_or(true, |s| s == name.as_str()))
            .map(|(name, tables)| SchemaTables {
                name: name.clone(),
                tables: tables
                    .keys()
                    .map(|table| TableInfo {
                        name: table.clone(),
                        table_type: "BASE TABLE".to_string(),
                        schema: name.clone(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn list_columns(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, RemoteError> {
        lock(&self.calls).push(format!("columns {} {} {}", database, schema, table));
        self.gate.pass().await;
        if let Some(error) = self.unknown_database(database) {
            return Err(error);
        }
        let failing = lock(&self.failing_tables)
            .iter()
            .any(|(s, t)| s == schema && t == table);
        if failing {
            return Err(RemoteError::server(
                "metadata_unavailable",
                format!("Could not read columns of {}.{}", schema, table),
            ));
        }
        lock(&self.schemas)
            .get(schema)
            .and_then(|tables| tables.get(table))
            .cloned()
            .ok_or_else(|| {
                RemoteError::server("table_not_found", format!("Table {}.{} not found", schema, table))
            })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SYNCWELL types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Timestamps between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_ticket_status() -> impl Strategy<Value = TicketStatus> {
        prop_oneof![Just(TicketStatus::Open), Just(TicketStatus::Done)]
    }

    pub fn arb_tag_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,11}"
    }

    pub fn arb_tag() -> impl Strategy<Value = Tag> {
        (arb_uuid(), arb_tag_name(), arb_timestamp())
            .prop_map(|(id, name, created_at)| Tag { id, name, created_at })
    }

    pub fn arb_ticket() -> impl Strategy<Value = Ticket> {
        (
            arb_uuid(),
            "[A-Za-z][A-Za-z0-9 ]{0,39}",
            proptest::option::of("[a-z ]{0,60}"),
            arb_ticket_status(),
            arb_timestamp(),
            prop::collection::vec(arb_tag(), 0..3),
        )
            .prop_map(|(id, title, description, status, created_at, tags)| Ticket {
                id,
                title,
                description,
                status,
                created_at,
                updated_at: created_at,
                tags,
            })
    }

    /// Pages whose `total` is at least the number of items.
    pub fn arb_tickets_page() -> impl Strategy<Value = TicketsPage> {
        (prop::collection::vec(arb_ticket(), 0..8), 0u64..50).prop_map(|(items, extra)| {
            TicketsPage {
                total: items.len() as u64 + extra,
                items,
            }
        })
    }

    pub fn arb_list_tickets_params() -> impl Strategy<Value = ListTicketsParams> {
        (
            proptest::option::of(arb_ticket_status()),
            prop::collection::vec(arb_tag_name(), 0..3),
            proptest::option::of("[a-z]{0,6}"),
            proptest::option::of(0u32..100),
            proptest::option::of(0u32..200),
        )
            .prop_map(|(status, tags, q, limit, offset)| ListTicketsParams {
                status,
                tags,
                q,
                limit,
                offset,
            })
    }

    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        prop_oneof![
            arb_list_tickets_params().prop_map(|p| p.query_key()),
            proptest::option::of("[a-z]{1,6}").prop_map(|q| ListTagsParams { q }.query_key()),
        ]
    }

    pub fn arb_node_path() -> impl Strategy<Value = NodePath> {
        prop::collection::vec("[a-z_]{1,8}", 1..5).prop_map(NodePath::from_segments)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    pub fn tag(name: &str) -> Tag {
        Tag {
            id: Uuid::now_v7(),
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn ticket(title: &str, status: TicketStatus) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::now_v7(),
            title: title.to_string(),
            description: None,
            status,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
        }
    }

    pub fn tagged_ticket(title: &str, tags: &[Tag]) -> Ticket {
        Ticket {
            tags: tags.to_vec(),
            ..ticket(title, TicketStatus::Open)
        }
    }

    /// `n` open tickets titled `ticket 1`..`ticket n`.
    pub fn open_tickets(n: usize) -> Vec<Ticket> {
        (1..=n)
            .map(|i| ticket(&format!("ticket {}", i), TicketStatus::Open))
            .collect()
    }

    pub fn page(items: Vec<Ticket>) -> TicketsPage {
        TicketsPage {
            total: items.len() as u64,
            items,
        }
    }

    pub fn network_error() -> RemoteError {
        RemoteError::network("connection refused")
    }

    pub fn server_error() -> RemoteError {
        RemoteError::server("internal_error", "Server error, please try again later")
    }

    pub fn schema_path(database: &str, schema: &str) -> NodePath {
        NodePath::from_segments([database, schema])
    }

    pub fn table_path(database: &str, schema: &str, table: &str) -> NodePath {
        NodePath::from_segments([database, schema, table])
    }

    pub fn schema_children(names: &[&str]) -> Vec<ChildDescriptor> {
        names.iter().map(|n| ChildDescriptor::schema(*n)).collect()
    }
}
