//! Ticket list filters and pagination.

use crate::debounce::Debounced;
use syncwell_core::{ListTicketsParams, TicketStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Channel name the search box debounces on.
pub const SEARCH_CHANNEL: &str = "ticket_search";

/// Current filter state of the ticket list.
///
/// Changing any filter returns to the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    status: Option<TicketStatus>,
    tags: Vec<String>,
    q: String,
    limit: u32,
    offset: u32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            status: None,
            tags: Vec::new(),
            q: String::new(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<TicketStatus> {
        self.status
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn query(&self) -> &str {
        &self.q
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn set_status(&mut self, status: Option<TicketStatus>) {
        if self.status != status {
            self.status = status;
            self.offset = 0;
        }
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        if self.tags != tags {
            self.tags = tags;
            self.offset = 0;
        }
    }

    pub fn set_query(&mut self, q: impl Into<String>) {
        let q = q.into();
        if self.q != q {
            self.q = q;
            self.offset = 0;
        }
    }

    /// Zero is ignored.
    pub fn set_limit(&mut self, limit: u32) {
        if limit > 0 && self.limit != limit {
            self.limit = limit;
            self.offset = 0;
        }
    }

    pub fn has_prev_page(&self) -> bool {
        self.offset > 0
    }

    pub fn has_next_page(&self, total: u64) -> bool {
        u64::from(self.offset) + u64::from(self.limit) < total
    }

    pub fn prev_page(&mut self) -> bool {
        if !self.has_prev_page() {
            return false;
        }
        self.offset = self.offset.saturating_sub(self.limit);
        true
    }

    pub fn next_page(&mut self, total: u64) -> bool {
        if !self.has_next_page(total) {
            return false;
        }
        self.offset = self.offset.saturating_add(self.limit);
        true
    }

    /// Apply a debounced search value. Values from other channels are ignored.
    pub fn apply(&mut self, debounced: Debounced<String>) -> bool {
        if debounced.channel != SEARCH_CHANNEL {
            return false;
        }
        let before = self.q.clone();
        self.set_query(debounced.value.trim());
        before != self.q
    }

    pub fn params(&self) -> ListTicketsParams {
        ListTicketsParams {
            status: self.status,
            tags: self.tags.clone(),
            q: Some(self.q.clone()).filter(|q| !q.is_empty()),
            limit: Some(self.limit),
            offset: Some(self.offset),
        }
    }
}
