//! Ticket board: cached ticket and tag listings plus the mutations on them.

use crate::remote::{TagsApi, TicketsApi};
use std::future::Future;
use std::sync::Arc;
use syncwell_cache::{
    fetch_fn, InvalidationTarget, Mutation, MutationExecutor, QueryCache, QuerySubscription,
};
use syncwell_core::{
    CacheSettings, KeyMatch, ListTagsParams, ListTicketsParams, QueryKey, RemoteError, Tag, TagCreate,
    Ticket, TicketCreate, TicketStatus, TicketUpdate, TicketsPage, TAGS_RESOURCE,
    TICKETS_RESOURCE,
};
use tracing::debug;
use uuid::Uuid;

/// Coordinates the ticket and tag caches for one board.
///
/// Cloning is cheap and clones share both caches.
#[derive(Clone)]
pub struct TicketBoard {
    tickets: QueryCache<TicketsPage>,
    tags: QueryCache<Vec<Tag>>,
    ticket_writes: MutationExecutor<TicketsPage>,
    tag_writes: MutationExecutor<Vec<Tag>>,
    tickets_api: Arc<dyn TicketsApi>,
    tags_api: Arc<dyn TagsApi>,
}

impl TicketBoard {
    pub fn new(tickets_api: Arc<dyn TicketsApi>, tags_api: Arc<dyn TagsApi>) -> Self {
        Self::with_settings(tickets_api, tags_api, CacheSettings::default())
    }

    pub fn with_settings(
        tickets_api: Arc<dyn TicketsApi>,
        tags_api: Arc<dyn TagsApi>,
        settings: CacheSettings,
    ) -> Self {
        let tickets = QueryCache::with_settings(settings.clone());
        let tags = QueryCache::with_settings(settings);
        Self {
            ticket_writes: MutationExecutor::new(tickets.clone()),
            tag_writes: MutationExecutor::new(tags.clone()),
            tickets,
            tags,
            tickets_api,
            tags_api,
        }
    }

    pub fn tickets(&self) -> &QueryCache<TicketsPage> {
        &self.tickets
    }

    pub fn tags(&self) -> &QueryCache<Vec<Tag>> {
        &self.tags
    }

    /// Mutations still waiting on the remote side.
    pub fn pending_writes(&self) -> usize {
        self.ticket_writes.pending() + self.tag_writes.pending()
    }

    /// Subscribe to one ticket listing.
    pub fn watch(&self, params: ListTicketsParams) -> QuerySubscription<TicketsPage> {
        let api = Arc::clone(&self.tickets_api);
        let key = params.query_key();
        let fetcher = fetch_fn(move |_key: QueryKey| {
            let api = Arc::clone(&api);
            let params = params.clone();
            async move { api.list_tickets(&params).await }
        });
        self.tickets.subscribe(key, fetcher)
    }

    /// Subscribe to one tag listing.
    pub fn watch_tags(&self, params: ListTagsParams) -> QuerySubscription<Vec<Tag>> {
        let api = Arc::clone(&self.tags_api);
        let key = params.query_key();
        let fetcher = fetch_fn(move |_key: QueryKey| {
            let api = Arc::clone(&api);
            let params = params.clone();
            async move { api.list_tags(&params).await }
        });
        self.tags.subscribe(key, fetcher)
    }

    /// Flip a ticket between open and done.
    ///
    /// Every cached listing shows the new status before the returned future
    /// is first polled; a failure restores the listings exactly.
    pub fn toggle_status(
        &self,
        ticket: &Ticket,
    ) -> impl Future<Output = Result<Ticket, RemoteError>> {
        let id = ticket.id;
        let next = ticket.status.toggled();
        debug!(ticket = %id, status = next.as_str(), "Toggling ticket status");

        let mutation = Mutation::new("toggle_status")
            .affecting_matching(KeyMatch::resource(TICKETS_RESOURCE))
            .with_optimistic_patch(move |page: &TicketsPage| with_status(page, id, next));

        let api = Arc::clone(&self.tickets_api);
        let update = TicketUpdate::status(next);
        self.ticket_writes.mutate(mutation, move || async move {
            api.update_ticket(id, &update).await
        })
    }

    /// Delete a ticket, removing it from every cached listing up front.
    pub fn delete(&self, id: Uuid) -> impl Future<Output = Result<(), RemoteError>> {
        debug!(ticket = %id, "Deleting ticket");
        let mutation = Mutation::new("delete_ticket")
            .affecting_matching(KeyMatch::resource(TICKETS_RESOURCE))
            .with_optimistic_patch(move |page: &TicketsPage| without_ticket(page, id));

        let api = Arc::clone(&self.tickets_api);
        self.ticket_writes
            .mutate(mutation, move || async move { api.delete_ticket(id).await })
    }

    /// Create a ticket. Tickets and tags reload once it exists, since new tag
    /// names are created on the way.
    pub fn create(
        &self,
        create: TicketCreate,
    ) -> impl Future<Output = Result<Ticket, RemoteError>> {
        let mutation = Mutation::new("create_ticket")
            .invalidating(KeyMatch::resource(TICKETS_RESOURCE))
            .also_invalidate(self.tags_target(), KeyMatch::resource(TAGS_RESOURCE));

        let api = Arc::clone(&self.tickets_api);
        self.ticket_writes.mutate(mutation, move || async move {
            api.create_ticket(&create).await
        })
    }

    pub fn update(
        &self,
        id: Uuid,
        update: TicketUpdate,
    ) -> impl Future<Output = Result<Ticket, RemoteError>> {
        let mutation = Mutation::new("update_ticket")
            .invalidating(KeyMatch::resource(TICKETS_RESOURCE))
            .also_invalidate(self.tags_target(), KeyMatch::resource(TAGS_RESOURCE));

        let api = Arc::clone(&self.tickets_api);
        self.ticket_writes.mutate(mutation, move || async move {
            api.update_ticket(id, &update).await
        })
    }

    pub fn create_tag(&self, create: TagCreate) -> impl Future<Output = Result<Tag, RemoteError>> {
        let mutation = Mutation::new("create_tag").invalidating(KeyMatch::resource(TAGS_RESOURCE));
        let api = Arc::clone(&self.tags_api);
        self.tag_writes
            .mutate(mutation, move || async move { api.create_tag(&create).await })
    }

    /// Delete a tag. Listings drop it immediately and tickets reload since
    /// they embed their tags.
    pub fn delete_tag(&self, id: Uuid) -> impl Future<Output = Result<(), RemoteError>> {
        let mutation = Mutation::new("delete_tag")
            .affecting_matching(KeyMatch::resource(TAGS_RESOURCE))
            .with_optimistic_patch(move |tags: &Vec<Tag>| {
                tags.iter().filter(|t| t.id != id).cloned().collect()
            })
            .also_invalidate(self.tickets_target(), KeyMatch::resource(TICKETS_RESOURCE));

        let api = Arc::clone(&self.tags_api);
        self.tag_writes
            .mutate(mutation, move || async move { api.delete_tag(id).await })
    }

    fn tags_target(&self) -> Arc<dyn InvalidationTarget> {
        Arc::new(self.tags.clone())
    }

    fn tickets_target(&self) -> Arc<dyn InvalidationTarget> {
        Arc::new(self.tickets.clone())
    }
}

fn with_status(page: &TicketsPage, id: Uuid, status: TicketStatus) -> TicketsPage {
    let items = page
        .items
        .iter()
        .map(|t| {
            if t.id == id {
                Ticket {
                    status,
                    ..t.clone()
                }
            } else {
                t.clone()
            }
        })
        .collect();
    TicketsPage {
        total: page.total,
        items,
    }
}

/// `total` only drops on pages that actually held the ticket.
fn without_ticket(page: &TicketsPage, id: Uuid) -> TicketsPage {
    let items: Vec<Ticket> = page.items.iter().filter(|t| t.id != id).cloned().collect();
    let removed = (page.items.len() - items.len()) as u64;
    TicketsPage {
        total: page.total.saturating_sub(removed),
        items,
    }
}

// ============================================================================
// TESTS
// ============================================================================
