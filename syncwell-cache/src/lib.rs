//! SYNCWELL Cache - Query Cache and Optimistic Mutations
//!
//! A read-through cache for remote queries, keyed by [`QueryKey`].
//!
//! # Design Philosophy
//!
//! Stale data is shown, never hidden: every read returns a [`QuerySnapshot`]
//! carrying status, last error and age next to the data. Invalidation keeps the
//! old data on screen while a reload runs in the background, and a failed
//! reload keeps it too.
//!
//! Concurrent interest in one key shares one load. Each load is stamped with an
//! attempt token; a response arriving for a superseded attempt is dropped.
//!
//! # Example
//!
//! ```ignore
//! let cache: QueryCache<TicketsPage> = QueryCache::new();
//! let mut sub = cache.subscribe(params.query_key(), fetcher);
//! let page = sub.settled().await;
//!
//! let executor = MutationExecutor::new(cache.clone());
//! executor
//!     .mutate(
//!         Mutation::new("toggle_status")
//!             .affecting_matching(KeyMatch::resource(TICKETS_RESOURCE))
//!             .with_optimistic_patch(move |page| toggle(page, id)),
//!         || api.update_ticket(id, update),
//!     )
//!     .await?;
//! ```
//!
//! [`QueryKey`]: syncwell_core::QueryKey

pub mod fetcher;
pub mod mutation;
pub mod query_cache;
pub mod snapshot;

pub use fetcher::{fetch_fn, FnFetcher, QueryFetcher};
pub use mutation::{Mutation, MutationContext, MutationExecutor, Patch};
pub use query_cache::{CacheStats, InvalidationTarget, QueryCache, QuerySubscription};
pub use snapshot::QuerySnapshot;
