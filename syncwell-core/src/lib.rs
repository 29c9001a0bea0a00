//! SYNCWELL Core - Shared Types
//!
//! Pure data structures shared by the cache, tree and client crates.
//! This crate contains ONLY data types and their invariants - no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub mod config;
pub mod error;
pub mod key;
pub mod resources;
pub mod tree;

pub use config::{CacheSettings, DebounceSettings};
pub use error::{
    ConfigError, DebounceError, ErrorKind, RemoteError, SyncwellError, SyncwellResult, TreeError,
};
pub use key::{KeyMatch, KeyValue, QueryKey};
pub use resources::{
    DatabaseConnection, ErrorBody, ErrorEnvelope, ListTagsParams, ListTicketsParams, Tag,
    TagCreate, Ticket, TicketCreate, TicketStatus, TicketUpdate, TicketsPage, TAGS_RESOURCE,
    TICKETS_RESOURCE,
};
pub use tree::{ChildDescriptor, NodeKind, NodePath, NodePayload, TableType};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Monotonically increasing token stamped on every remote load at start.
///
/// A completion whose token no longer matches the owner's current token has
/// been superseded and must be discarded.
pub type AttemptToken = u64;

static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

/// Issue a fresh attempt token, unique for the life of the process.
pub fn next_attempt_token() -> AttemptToken {
    NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Load status of a cached query entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Nothing has been requested for this key yet.
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Load status of a tree node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Error,
}

impl LoadStatus {
    /// Whether `expand` should leave the node alone.
    pub fn blocks_expand(&self) -> bool {
        matches!(self, Self::Loading | Self::Loaded)
    }
}

// ============================================================================
// TESTS
// ============================================================================
