//! Point-in-time views of cache entries.
//!
//! Consumers never touch entries directly; every read hands out a
//! [`QuerySnapshot`] that carries the data together with its load status,
//! last error and age, so staleness is visible instead of hidden.

use chrono::Utc;
use std::time::Duration;
use syncwell_core::{QueryStatus, RemoteError, Timestamp};

/// Observable state of one query entry.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<T> {
    /// Last successfully loaded (or optimistically written) value.
    pub data: Option<T>,
    pub status: QueryStatus,
    /// Error of the latest failed load. Kept alongside `data`.
    pub error: Option<RemoteError>,
    /// When `data` was written.
    pub fetched_at: Option<Timestamp>,
    /// Whether the entry has been invalidated since `data` was written.
    pub is_stale: bool,
}

impl<T> Default for QuerySnapshot<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> QuerySnapshot<T> {
    /// Snapshot of a key nothing has been requested for.
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            fetched_at: None,
            is_stale: false,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }

    /// Loading with nothing to show yet.
    pub fn is_initial_load(&self) -> bool {
        self.is_loading() && self.data.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Time since `data` was written, if there is any.
    pub fn staleness(&self) -> Option<Duration> {
        let fetched_at = self.fetched_at?;
        Some(
            Utc::now()
                .signed_duration_since(fetched_at)
                .to_std()
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Returns true if the data was written at or after `timestamp`.
    pub fn is_fresh_as_of(&self, timestamp: Timestamp) -> bool {
        self.fetched_at.is_some_and(|at| at >= timestamp)
    }

    /// Map the data to a new type, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> QuerySnapshot<U>
    where
        F: FnOnce(T) -> U,
    {
        QuerySnapshot {
            data: self.data.map(f),
            status: self.status,
            error: self.error,
            fetched_at: self.fetched_at,
            is_stale: self.is_stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded<T>(value: T, fetched_at: Timestamp) -> QuerySnapshot<T> {
        QuerySnapshot {
            data: Some(value),
            status: QueryStatus::Success,
            error: None,
            fetched_at: Some(fetched_at),
            is_stale: false,
        }
    }

    #[test]
    fn test_idle_snapshot() {
        let snapshot = QuerySnapshot::<i32>::idle();
        assert_eq!(snapshot.status, QueryStatus::Idle);
        assert!(!snapshot.has_data());
        assert!(snapshot.staleness().is_none());
        assert!(!snapshot.is_initial_load());
    }

    #[test]
    fn test_staleness() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let snapshot = loaded("test", past);

        let staleness = snapshot.staleness().unwrap();
        assert!(staleness >= Duration::from_secs(4));
        assert!(staleness <= Duration::from_secs(10));
    }

    #[test]
    fn test_is_fresh_as_of() {
        let fetched_at = Utc::now();
        let snapshot = loaded("test", fetched_at);

        let past = fetched_at - chrono::Duration::seconds(10);
        let future = fetched_at + chrono::Duration::seconds(10);

        assert!(snapshot.is_fresh_as_of(past));
        assert!(snapshot.is_fresh_as_of(fetched_at));
        assert!(!snapshot.is_fresh_as_of(future));
    }

    #[test]
    fn test_map_keeps_metadata() {
        let mut snapshot = loaded(42i32, Utc::now());
        snapshot.is_stale = true;
        let mapped = snapshot.map(|v| v.to_string());

        assert_eq!(mapped.data.as_deref(), Some("42"));
        assert!(mapped.is_stale);
        assert_eq!(mapped.status, QueryStatus::Success);
    }
}
