//! Resource types exchanged with the remote API.
//!
//! Tickets and tags are the list/detail resources; database connections are
//! the roots of the lazily loaded metadata tree.

use crate::{QueryKey, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resource name of ticket queries.
pub const TICKETS_RESOURCE: &str = "tickets";

/// Resource name of tag queries.
pub const TAGS_RESOURCE: &str = "tags";

// ============================================================================
// TICKETS & TAGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Done,
}

impl TicketStatus {
    pub fn toggled(&self) -> Self {
        match self {
            Self::Open => Self::Done,
            Self::Done => Self::Open,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// One page of a ticket listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicketsPage {
    pub total: u64,
    pub items: Vec<Ticket>,
}

impl TicketsPage {
    pub fn find(&self, id: Uuid) -> Option<&Ticket> {
        self.items.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicketCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tag names; unknown names are created by the server.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TicketUpdate {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCreate {
    pub name: String,
}

/// Ticket list filters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTicketsParams {
    pub status: Option<TicketStatus>,
    /// Tag names; a ticket must carry all of them.
    pub tags: Vec<String>,
    /// Free-text title search.
    pub q: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListTicketsParams {
    /// Cache key for this listing.
    ///
    /// Empty values are dropped so "no filter" has exactly one key.
    pub fn query_key(&self) -> QueryKey {
        let tags = if self.tags.is_empty() {
            None
        } else {
            Some(self.tags.clone())
        };
        QueryKey::new(TICKETS_RESOURCE)
            .with_opt("status", self.status.map(|s| s.as_str()))
            .with_opt("tags", tags)
            .with_opt("q", self.search_text())
            .with_opt("limit", self.limit.filter(|l| *l > 0))
            .with_opt("offset", self.offset.filter(|o| *o > 0))
    }

    /// Query-string pairs sent to the list endpoint.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if !self.tags.is_empty() {
            pairs.push(("tags", self.tags.join(",")));
        }
        if let Some(q) = self.search_text() {
            pairs.push(("q", q.to_string()));
        }
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }

    fn search_text(&self) -> Option<&str> {
        self.q.as_deref().filter(|q| !q.is_empty())
    }
}

/// Tag list filters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListTagsParams {
    pub q: Option<String>,
}

impl ListTagsParams {
    pub fn query_key(&self) -> QueryKey {
        QueryKey::new(TAGS_RESOURCE).with_opt("q", self.q.clone().filter(|q| !q.is_empty()))
    }
}

// ============================================================================
// DATABASES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnection {
    pub name: String,
    pub url: String,
    pub database_type: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// ERROR ENVELOPE
// ============================================================================

/// Error body returned by the API: `{"error": {"code", "message", "details"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
