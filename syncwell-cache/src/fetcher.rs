//! Fetch capability consumed by the query cache.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use syncwell_core::{QueryKey, RemoteError};

/// Loads the value behind a query key from the remote side.
///
/// The cache invokes `fetch` at most once per active load of a key and keeps
/// the fetcher of the latest subscriber so invalidation can reload without a
/// subscriber being present at that moment. Retries are the fetcher's
/// business; the cache only reloads on `subscribe` or `invalidate`.
#[async_trait]
pub trait QueryFetcher<T>: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> Result<T, RemoteError>;
}

/// Adapts an async closure into a [`QueryFetcher`].
pub struct FnFetcher<F> {
    f: F,
}

#[async_trait]
impl<T, F, Fut> QueryFetcher<T> for FnFetcher<F>
where
    T: Send + 'static,
    F: Fn(QueryKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
{
    async fn fetch(&self, key: &QueryKey) -> Result<T, RemoteError> {
        (self.f)(key.clone()).await
    }
}

/// Build a shareable fetcher from an async closure.
///
/// ```ignore
/// let fetcher = fetch_fn(move |_key| {
///     let api = api.clone();
///     async move { api.list_tags(&ListTagsParams::default()).await }
/// });
/// ```
pub fn fetch_fn<F>(f: F) -> Arc<FnFetcher<F>> {
    Arc::new(FnFetcher { f })
}
