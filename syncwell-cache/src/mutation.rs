//! Optimistic mutations over a [`QueryCache`].
//!
//! A mutation patches the cached data of the keys it affects before its remote
//! write is issued, records what those keys held, and on resolution either
//! invalidates them (success) or writes the recorded values back (failure).
//!
//! Snapshots are taken at the moment a mutation starts, so an overlapping
//! mutation started later records the earlier one's optimistic value and its
//! rollback only undoes its own patch.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use syncwell_core::{KeyMatch, QueryKey, RemoteError};
use tracing::{debug, warn};

use crate::query_cache::{InvalidationTarget, QueryCache, Recorded};

/// Pure optimistic transformation of cached data.
pub type Patch<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// Description of one remote write and its cache effects.
pub struct Mutation<T> {
    label: String,
    affected: Vec<KeyMatch>,
    patch: Option<Patch<T>>,
    invalidates: Vec<KeyMatch>,
    cross_invalidates: Vec<(Arc<dyn InvalidationTarget>, KeyMatch)>,
}

impl<T> Mutation<T> {
    /// `label` names the mutation in logs.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            affected: Vec::new(),
            patch: None,
            invalidates: Vec::new(),
            cross_invalidates: Vec::new(),
        }
    }

    /// Add one affected key.
    pub fn affecting(mut self, key: QueryKey) -> Self {
        self.affected.push(KeyMatch::Exact(key));
        self
    }

    /// Add every cached key selected by `matcher` at the time the mutation starts.
    pub fn affecting_matching(mut self, matcher: KeyMatch) -> Self {
        self.affected.push(matcher);
        self
    }

    /// Optimistic patch applied to each affected key that holds data.
    pub fn with_optimistic_patch<F>(mut self, patch: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.patch = Some(Arc::new(patch));
        self
    }

    /// Additionally invalidate `matcher` in the same cache on success.
    pub fn invalidating(mut self, matcher: KeyMatch) -> Self {
        self.invalidates.push(matcher);
        self
    }

    /// Invalidate `matcher` in another cache on success.
    pub fn also_invalidate(mut self, target: Arc<dyn InvalidationTarget>, matcher: KeyMatch) -> Self {
        self.cross_invalidates.push((target, matcher));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn affects(&self, key: &QueryKey) -> bool {
        self.affected.iter().any(|m| m.matches(key))
    }
}

/// Pre-mutation state of the keys a mutation touched.
///
/// Consumed exactly once: by [`MutationContext::commit`] or
/// [`MutationContext::rollback`].
#[must_use = "a mutation context must be committed or rolled back"]
pub struct MutationContext<T> {
    label: String,
    target_keys: Vec<QueryKey>,
    snapshot: Vec<Recorded<T>>,
}

impl<T> MutationContext<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Supersede loads of the affected keys, record their data and apply the
    /// optimistic patch. Keys without data are left alone.
    pub fn begin(cache: &QueryCache<T>, mutation: &Mutation<T>) -> Self {
        let snapshot = cache.snapshot_and_patch(|key| mutation.affects(key), mutation.patch.as_deref());
        let target_keys = snapshot.iter().map(|record| record.key.clone()).collect();
        debug!(
            mutation = %mutation.label,
            patched = snapshot.len(),
            optimistic = mutation.patch.is_some(),
            "Mutation started"
        );
        Self {
            label: mutation.label.clone(),
            target_keys,
            snapshot,
        }
    }

    pub fn target_keys(&self) -> &[QueryKey] {
        &self.target_keys
    }

    /// Value `key` held when the mutation started, if it was recorded.
    pub fn recorded(&self, key: &QueryKey) -> Option<&T> {
        self.snapshot
            .iter()
            .find(|record| &record.key == key)
            .map(|record| &record.data)
    }

    /// Discard the snapshot and invalidate everything the mutation touches.
    pub fn commit(self, cache: &QueryCache<T>, mutation: &Mutation<T>) -> usize {
        let mut invalidated =
            cache.invalidate_where(|key| mutation.affects(key) || mutation.invalidates.iter().any(|m| m.matches(key)));
        for (target, matcher) in &mutation.cross_invalidates {
            invalidated += target.invalidate_matching(matcher);
        }
        debug!(mutation = %self.label, invalidated, "Mutation committed");
        invalidated
    }

    /// Write every recorded value back.
    pub fn rollback(self, cache: &QueryCache<T>) {
        debug!(mutation = %self.label, restored = self.snapshot.len(), "Mutation rolled back");
        cache.restore(self.snapshot, false);
    }

    /// Write every recorded value back and mark it stale.
    ///
    /// Used when the outcome of the write is unknown, so the restored values
    /// are reloaded instead of trusted.
    pub fn abandon(self, cache: &QueryCache<T>) {
        warn!(
            mutation = %self.label,
            restored = self.snapshot.len(),
            "Mutation abandoned before resolving, rolling back"
        );
        cache.restore(self.snapshot, true);
    }
}

/// Owns a started mutation until it resolves.
///
/// Dropped unresolved, it abandons the context so no optimistic value
/// outlives its mutation.
struct Resolution<T>
where
    T: Clone + Send + Sync + 'static,
{
    context: Option<MutationContext<T>>,
    cache: QueryCache<T>,
    _pending: PendingGuard,
}

impl<T> Resolution<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn finish<R>(mut self, mutation: &Mutation<T>, outcome: &Result<R, RemoteError>) {
        let Some(context) = self.context.take() else {
            return;
        };
        match outcome {
            Ok(_) => {
                context.commit(&self.cache, mutation);
            }
            Err(error) => {
                warn!(
                    mutation = %mutation.label,
                    kind = %error.kind,
                    code = %error.code,
                    "Mutation failed, rolling back"
                );
                context.rollback(&self.cache);
            }
        }
    }
}

impl<T> Drop for Resolution<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            context.abandon(&self.cache);
        }
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs mutations against one cache.
pub struct MutationExecutor<T> {
    cache: QueryCache<T>,
    pending: Arc<AtomicUsize>,
}

impl<T> Clone for MutationExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> MutationExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(cache: QueryCache<T>) -> Self {
        Self {
            cache,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn cache(&self) -> &QueryCache<T> {
        &self.cache
    }

    /// Mutations started and not yet resolved.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Start `mutation` and return the future resolving it.
    ///
    /// The optimistic patch is applied and `write` is called before this
    /// returns, so the patched data is visible to every subscriber right away.
    /// The returned future awaits the write, then commits on success or rolls
    /// back on failure and hands the error to the caller. Nothing is retried.
    /// Dropping the future before it resolves rolls back as well and marks
    /// the restored keys stale.
    pub fn mutate<R, W, Fut>(
        &self,
        mutation: Mutation<T>,
        write: W,
    ) -> impl Future<Output = Result<R, RemoteError>>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, RemoteError>>,
    {
        let resolution = Resolution {
            context: Some(MutationContext::begin(&self.cache, &mutation)),
            cache: self.cache.clone(),
            _pending: PendingGuard::enter(&self.pending),
        };
        let request = write();

        async move {
            let outcome = request.await;
            resolution.finish(&mutation, &outcome);
            outcome
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::fetch_fn;
    use std::time::Duration;
    use syncwell_core::QueryStatus;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        done: bool,
    }

    fn list_key() -> QueryKey {
        QueryKey::new("items")
    }

    fn toggle(id: u32) -> impl Fn(&Vec<Item>) -> Vec<Item> + Send + Sync + 'static {
        move |items: &Vec<Item>| {
            items
                .iter()
                .map(|item| {
                    if item.id == id {
                        Item {
                            done: !item.done,
                            ..item.clone()
                        }
                    } else {
                        item.clone()
                    }
                })
                .collect()
        }
    }

    fn seeded() -> QueryCache<Vec<Item>> {
        let cache = QueryCache::new();
        cache.set_entry(list_key(), vec![Item { id: 1, done: false }, Item { id: 2, done: false }]);
        cache
    }

    fn done_of(cache: &QueryCache<Vec<Item>>, id: u32) -> bool {
        cache
            .get(&list_key())
            .data
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .unwrap()
            .done
    }

    #[tokio::test]
    async fn test_patch_is_visible_before_write_resolves() {
        let cache = seeded();
        let executor = MutationExecutor::new(cache.clone());
        let (tx, rx) = oneshot::channel::<Result<(), RemoteError>>();

        let resolution = executor.mutate(
            Mutation::new("toggle")
                .affecting(list_key())
                .with_optimistic_patch(toggle(1)),
            move || async move { rx.await.unwrap_or_else(|_| Err(RemoteError::unknown("dropped"))) },
        );
        assert!(done_of(&cache, 1));
        assert_eq!(executor.pending(), 1);

        tx.send(Ok(())).unwrap();
        resolution.await.unwrap();
        assert_eq!(executor.pending(), 0);
        assert!(cache.get(&list_key()).is_stale);
    }

    #[tokio::test]
    async fn test_failure_restores_exact_snapshot() {
        let cache = seeded();
        let before = cache.get(&list_key()).data;
        let executor = MutationExecutor::new(cache.clone());

        let err = executor
            .mutate(
                Mutation::new("toggle")
                    .affecting(list_key())
                    .with_optimistic_patch(toggle(2)),
                || async { Err::<(), _>(RemoteError::network("offline")) },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, "network_error");
        let after = cache.get(&list_key());
        assert_eq!(after.data, before);
        assert_eq!(after.status, QueryStatus::Success);
        assert_eq!(executor.pending(), 0);
    }

    #[tokio::test]
    async fn test_dropped_mutation_rolls_back() {
        let cache = seeded();
        let before = cache.get(&list_key()).data;
        let executor = MutationExecutor::new(cache.clone());

        let resolution = executor.mutate(
            Mutation::new("toggle")
                .affecting(list_key())
                .with_optimistic_patch(toggle(1)),
            || async { Err::<(), _>(RemoteError::network("offline")) },
        );
        assert!(done_of(&cache, 1));
        assert_eq!(executor.pending(), 1);
        drop(resolution);

        let after = cache.get(&list_key());
        assert_eq!(after.data, before);
        assert!(after.is_stale);
        assert_eq!(executor.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_mutation_reloads_subscribed_key() {
        let cache: QueryCache<Vec<Item>> = QueryCache::new();
        let mut sub = cache.subscribe(
            list_key(),
            fetch_fn(|_key: QueryKey| async { Ok::<_, RemoteError>(vec![Item { id: 1, done: false }]) }),
        );
        sub.wait_for(|s| s.status == QueryStatus::Success).await.unwrap();

        let executor = MutationExecutor::new(cache.clone());
        let (_tx, rx) = oneshot::channel::<Result<(), RemoteError>>();
        let resolution = executor.mutate(
            Mutation::new("toggle")
                .affecting(list_key())
                .with_optimistic_patch(toggle(1)),
            move || async move { rx.await.unwrap_or_else(|_| Err(RemoteError::unknown("dropped"))) },
        );
        assert!(done_of(&cache, 1));

        assert!(timeout(Duration::from_millis(5), resolution).await.is_err());
        assert!(!done_of(&cache, 1));
        assert_eq!(executor.pending(), 0);

        let reloaded = sub
            .wait_for(|s| s.status == QueryStatus::Success && !s.is_stale)
            .await
            .unwrap();
        assert_eq!(reloaded.data, Some(vec![Item { id: 1, done: false }]));
        assert_eq!(cache.stats().fetches, 2);
    }

    #[tokio::test]
    async fn test_nested_rollback_restores_prior_mutation_value() {
        let cache = seeded();
        let executor = MutationExecutor::new(cache.clone());
        let (first_tx, first_rx) = oneshot::channel::<Result<(), RemoteError>>();

        let first = executor.mutate(
            Mutation::new("first")
                .affecting(list_key())
                .with_optimistic_patch(toggle(1)),
            move || async move { first_rx.await.unwrap_or_else(|_| Err(RemoteError::unknown("dropped"))) },
        );
        let after_first = cache.get(&list_key()).data;

        let second = executor.mutate(
            Mutation::new("second")
                .affecting(list_key())
                .with_optimistic_patch(toggle(2)),
            || async { Err::<(), _>(RemoteError::server("conflict", "rejected")) },
        );
        assert!(done_of(&cache, 1));
        assert!(done_of(&cache, 2));

        second.await.unwrap_err();
        assert_eq!(cache.get(&list_key()).data, after_first);
        assert!(done_of(&cache, 1));
        assert!(!done_of(&cache, 2));

        first_tx.send(Ok(())).unwrap();
        first.await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_without_data_are_skipped() {
        let cache = QueryCache::<Vec<Item>>::new();
        let executor = MutationExecutor::new(cache.clone());

        executor
            .mutate(
                Mutation::new("toggle")
                    .affecting(list_key())
                    .with_optimistic_patch(toggle(1)),
                || async { Err::<(), _>(RemoteError::network("offline")) },
            )
            .await
            .unwrap_err();

        assert_eq!(cache.get(&list_key()).status, QueryStatus::Idle);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_matching_selects_every_cached_variant() {
        let cache = seeded();
        let filtered = list_key().with("done", false);
        cache.set_entry(filtered.clone(), vec![Item { id: 1, done: false }]);
        cache.set_entry(QueryKey::new("other"), vec![Item { id: 1, done: false }]);

        let mutation = Mutation::new("toggle")
            .affecting_matching(KeyMatch::resource("items"))
            .with_optimistic_patch(toggle(1));
        let context = MutationContext::begin(&cache, &mutation);

        assert_eq!(context.target_keys().len(), 2);
        assert_eq!(
            context.recorded(&filtered),
            Some(&vec![Item { id: 1, done: false }])
        );
        assert!(cache.get(&filtered).data.unwrap()[0].done);
        assert!(!cache.get(&QueryKey::new("other")).data.unwrap()[0].done);

        context.rollback(&cache);
        assert!(!cache.get(&filtered).data.unwrap()[0].done);
    }

    #[tokio::test]
    async fn test_commit_invalidates_related_caches() {
        let cache = seeded();
        let counts: QueryCache<u64> = QueryCache::new();
        let _sub = counts.subscribe(QueryKey::new("counts"), fetch_fn(|_key: QueryKey| async { Ok::<_, RemoteError>(1u64) }));

        let executor = MutationExecutor::new(cache.clone());
        executor
            .mutate(
                Mutation::new("create")
                    .invalidating(KeyMatch::resource("items"))
                    .also_invalidate(Arc::new(counts.clone()), KeyMatch::All),
                || async { Ok(()) },
            )
            .await
            .unwrap();

        assert!(cache.get(&list_key()).is_stale);
        assert!(counts.stats().fetches >= 2);
    }
}
