//! SYNCWELL Tree - Lazily Loaded Database Metadata
//!
//! Models one database connection as a tree of schemas, tables and columns
//! whose children are fetched on first expansion through a [`ChildFetcher`].
//!
//! Each node tracks its own [`LoadStatus`](syncwell_core::LoadStatus):
//! `unloaded → loading → loaded | error`. Errors retry through `expand`;
//! loaded nodes only reload through `refresh`.

pub mod fetcher;
pub mod loader;
pub mod node;

pub use fetcher::ChildFetcher;
pub use loader::{ExpandOutcome, LazyTreeLoader};
pub use node::{NodeView, TreeEvent};
