//! Keyed query cache with request deduplication and stale-while-revalidate.
//!
//! Every key maps to exactly one entry. Subscribers share the entry through a
//! `watch` channel, at most one load per key is active at a time, and every
//! load carries an attempt token so a late response for a superseded load is
//! dropped instead of overwriting newer state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use syncwell_core::{
    next_attempt_token, AttemptToken, CacheSettings, KeyMatch, QueryKey, QueryStatus, RemoteError,
    Timestamp,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::fetcher::QueryFetcher;
use crate::snapshot::QuerySnapshot;

/// Counters describing cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Loads started.
    pub fetches: u64,
    /// Subscribes that joined a load already in flight.
    pub dedup_hits: u64,
    /// Responses dropped because their load had been superseded.
    pub discarded_responses: u64,
    /// Entries currently held, idle ones included.
    pub entries: usize,
    /// Live subscriptions across all entries.
    pub subscribers: usize,
}

/// Something whose cached queries can be marked stale by key selection.
///
/// Lets a mutation on one cache invalidate queries held by a cache of a
/// different value type.
pub trait InvalidationTarget: Send + Sync {
    fn invalidate_matching(&self, matcher: &KeyMatch) -> usize;
}

struct Entry<T> {
    state: watch::Sender<QuerySnapshot<T>>,
    subscribers: usize,
    in_flight: Option<AttemptToken>,
    /// Fetcher of the most recent subscriber, reused for invalidation reloads.
    fetcher: Option<Arc<dyn QueryFetcher<T>>>,
}

impl<T: Clone> Entry<T> {
    fn new() -> Self {
        let (state, _) = watch::channel(QuerySnapshot::idle());
        Self {
            state,
            subscribers: 0,
            in_flight: None,
            fetcher: None,
        }
    }

    fn snapshot(&self) -> QuerySnapshot<T> {
        self.state.borrow().clone()
    }

    fn needs_fetch(&self, settings: &CacheSettings) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        let current = self.state.borrow();
        if current.is_stale || current.data.is_none() || current.status != QueryStatus::Success {
            return true;
        }
        match (settings.stale_after, current.staleness()) {
            (Some(max_age), Some(age)) => age >= max_age,
            _ => false,
        }
    }

    fn mark_loaded(&self, data: T) {
        self.state.send_modify(|s| {
            s.data = Some(data);
            s.status = QueryStatus::Success;
            s.error = None;
            s.fetched_at = Some(Utc::now());
            s.is_stale = false;
        });
    }

    /// Drop the load in flight, returning the entry to its pre-load status.
    ///
    /// The entry is left stale since the dropped load never delivered.
    fn abandon_load(&mut self) -> Option<AttemptToken> {
        let attempt = self.in_flight.take()?;
        self.state.send_modify(|s| {
            s.status = if s.error.is_some() {
                QueryStatus::Error
            } else if s.data.is_some() {
                QueryStatus::Success
            } else {
                QueryStatus::Idle
            };
            s.is_stale = true;
        });
        Some(attempt)
    }

    /// Stamp a new attempt and flip the entry to loading.
    ///
    /// Any load already in flight is superseded by the new token.
    fn begin_fetch(&mut self) -> Option<(AttemptToken, Arc<dyn QueryFetcher<T>>)> {
        let fetcher = self.fetcher.clone()?;
        let attempt = next_attempt_token();
        self.in_flight = Some(attempt);
        self.state.send_modify(|s| s.status = QueryStatus::Loading);
        Some((attempt, fetcher))
    }
}

/// What one entry held when a mutation patched it.
pub(crate) struct Recorded<T> {
    pub(crate) key: QueryKey,
    pub(crate) data: T,
    fetched_at: Option<Timestamp>,
    /// Stale before the patch, or a reload was abandoned for it.
    stale: bool,
}

struct PendingFetch<T> {
    key: QueryKey,
    attempt: AttemptToken,
    fetcher: Arc<dyn QueryFetcher<T>>,
}

#[derive(Default)]
struct Counters {
    fetches: u64,
    dedup_hits: u64,
    discarded_responses: u64,
}

struct CacheInner<T> {
    entries: HashMap<QueryKey, Entry<T>>,
    next_subscription: u64,
    counters: Counters,
}

/// Shared, clonable query cache for one value type.
///
/// Loads run on spawned tokio tasks, so `subscribe` and `invalidate` must be
/// called from within a tokio runtime. The internal lock is never held across
/// an await.
pub struct QueryCache<T> {
    inner: Arc<Mutex<CacheInner<T>>>,
    settings: Arc<CacheSettings>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_settings(CacheSettings::default())
    }

    pub fn with_settings(settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_subscription: 1,
                counters: Counters::default(),
            })),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in `key`.
    ///
    /// Creates the entry and starts a load when the key is new. An existing
    /// entry keeps serving its data and is reloaded in the background when it
    /// is stale, errored or older than `stale_after`, unless a load is
    /// already in flight, in which case this subscriber simply joins it.
    pub fn subscribe(
        &self,
        key: QueryKey,
        fetcher: Arc<dyn QueryFetcher<T>>,
    ) -> QuerySubscription<T> {
        let (subscription, launch) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let id = inner.next_subscription;
            inner.next_subscription += 1;

            let entry = inner.entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.subscribers += 1;
            entry.fetcher = Some(fetcher);
            let receiver = entry.state.subscribe();

            let launch = if entry.in_flight.is_some() {
                inner.counters.dedup_hits += 1;
                debug!(key = %key, subscription = id, "Joined in-flight load");
                None
            } else if entry.needs_fetch(&self.settings) {
                entry.begin_fetch().map(|(attempt, fetcher)| PendingFetch {
                    key: key.clone(),
                    attempt,
                    fetcher,
                })
            } else {
                None
            };
            if launch.is_some() {
                inner.counters.fetches += 1;
            }

            let subscription = QuerySubscription {
                id,
                key,
                receiver,
            };
            (subscription, launch)
        };

        if let Some(launch) = launch {
            self.spawn_fetch(launch);
        }
        subscription
    }

    /// Drop one subscriber of the handle's key.
    ///
    /// When the last subscriber leaves and `retain_unused` is off the entry is
    /// removed; a load still in flight for it will be discarded on arrival.
    pub fn unsubscribe(&self, subscription: QuerySubscription<T>) {
        let QuerySubscription { id, key, .. } = subscription;
        let mut guard = self.lock();
        let Some(entry) = guard.entries.get_mut(&key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 && !self.settings.retain_unused {
            guard.entries.remove(&key);
            debug!(key = %key, subscription = id, "Removed unused query entry");
        }
    }

    /// Current snapshot of `key`, or an idle snapshot for an unknown key.
    pub fn get(&self, key: &QueryKey) -> QuerySnapshot<T> {
        self.lock()
            .entries
            .get(key)
            .map(Entry::snapshot)
            .unwrap_or_default()
    }

    /// Mark every entry accepted by `predicate` stale.
    ///
    /// Entries with subscribers start a fresh load immediately, superseding
    /// any load already in flight; the others reload on their next
    /// subscribe. Returns the number of entries marked.
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&QueryKey) -> bool,
    {
        let mut launches = Vec::new();
        let matched = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let mut matched = 0;
            for (key, entry) in inner.entries.iter_mut() {
                if !predicate(key) {
                    continue;
                }
                matched += 1;
                entry.state.send_modify(|s| s.is_stale = true);
                if entry.subscribers == 0 {
                    continue;
                }
                if let Some(previous) = entry.in_flight {
                    debug!(key = %key, attempt = previous, "Superseding in-flight load");
                }
                if let Some((attempt, fetcher)) = entry.begin_fetch() {
                    launches.push(PendingFetch {
                        key: key.clone(),
                        attempt,
                        fetcher,
                    });
                }
            }
            inner.counters.fetches += launches.len() as u64;
            matched
        };

        debug!(matched, reloading = launches.len(), "Invalidated queries");
        for launch in launches {
            self.spawn_fetch(launch);
        }
        matched
    }

    /// Mark every entry selected by `matcher` stale. See [`Self::invalidate_where`].
    pub fn invalidate(&self, matcher: &KeyMatch) -> usize {
        self.invalidate_where(|key| matcher.matches(key))
    }

    /// Write `data` into `key` as freshly loaded, creating the entry if needed.
    ///
    /// A load already in flight for the key is left alone; use [`Self::cancel`]
    /// first when the written value must not be overwritten by it.
    pub fn set_entry(&self, key: QueryKey, data: T) {
        let mut guard = self.lock();
        let entry = guard.entries.entry(key).or_insert_with(Entry::new);
        entry.mark_loaded(data);
    }

    /// Supersede the load in flight for `key`, if any.
    ///
    /// The entry goes back to the status it had before the load and is marked
    /// stale so the next subscribe or invalidation reloads it.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        let mut guard = self.lock();
        let Some(entry) = guard.entries.get_mut(key) else {
            return false;
        };
        let Some(attempt) = entry.abandon_load() else {
            return false;
        };
        debug!(key = %key, attempt, "Cancelled in-flight load");
        true
    }

    /// Keys of every entry accepted by `predicate`.
    pub fn keys_where<F>(&self, predicate: F) -> Vec<QueryKey>
    where
        F: Fn(&QueryKey) -> bool,
    {
        self.lock()
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect()
    }

    /// For every selected entry holding data: supersede its load, record the
    /// current value and write `patch` of it, all under one lock.
    ///
    /// Returns the recorded pre-patch values.
    pub(crate) fn snapshot_and_patch<F>(
        &self,
        selects: F,
        patch: Option<&(dyn Fn(&T) -> T + Send + Sync)>,
    ) -> Vec<Recorded<T>>
    where
        F: Fn(&QueryKey) -> bool,
    {
        let mut guard = self.lock();
        let mut recorded = Vec::new();
        for (key, entry) in guard.entries.iter_mut() {
            if !selects(key) || entry.state.borrow().data.is_none() {
                continue;
            }
            if let Some(attempt) = entry.abandon_load() {
                debug!(key = %key, attempt, "Superseded load for optimistic write");
            }
            let (data, fetched_at, stale) = {
                let current = entry.state.borrow();
                (current.data.clone(), current.fetched_at, current.is_stale)
            };
            let Some(data) = data else {
                continue;
            };
            let record = Recorded {
                key: key.clone(),
                data,
                fetched_at,
                stale,
            };
            if let Some(patch) = patch {
                entry.mark_loaded(patch(&record.data));
            }
            recorded.push(record);
        }
        recorded
    }

    /// Write recorded values back, under one lock.
    ///
    /// Entries removed in the meantime stay removed. A restored entry keeps
    /// the staleness it had before the patch, or is marked stale when
    /// `force_stale` is set, and reloads right away when it has subscribers.
    pub(crate) fn restore(&self, recorded: Vec<Recorded<T>>, force_stale: bool) {
        let can_reload = tokio::runtime::Handle::try_current().is_ok();
        let mut launches = Vec::new();
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            for Recorded {
                key,
                data,
                fetched_at,
                stale,
            } in recorded
            {
                let Some(entry) = inner.entries.get_mut(&key) else {
                    debug!(key = %key, "Skipping restore of removed entry");
                    continue;
                };
                let stale = stale || force_stale;
                let status = if entry.in_flight.is_some() {
                    QueryStatus::Loading
                } else {
                    QueryStatus::Success
                };
                entry.state.send_modify(|s| {
                    s.data = Some(data);
                    s.status = status;
                    s.error = None;
                    s.fetched_at = fetched_at;
                    s.is_stale = stale;
                });
                if stale && can_reload && entry.subscribers > 0 && entry.in_flight.is_none() {
                    if let Some((attempt, fetcher)) = entry.begin_fetch() {
                        launches.push(PendingFetch {
                            key,
                            attempt,
                            fetcher,
                        });
                    }
                }
            }
            inner.counters.fetches += launches.len() as u64;
        }

        for launch in launches {
            self.spawn_fetch(launch);
        }
    }

    /// Remove every entry without subscribers or an active load.
    pub fn evict_unused(&self) -> usize {
        let mut guard = self.lock();
        let before = guard.entries.len();
        guard
            .entries
            .retain(|_, entry| entry.subscribers > 0 || entry.in_flight.is_some());
        before - guard.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.lock();
        CacheStats {
            fetches: guard.counters.fetches,
            dedup_hits: guard.counters.dedup_hits,
            discarded_responses: guard.counters.discarded_responses,
            entries: guard.entries.len(),
            subscribers: guard.entries.values().map(|e| e.subscribers).sum(),
        }
    }

    fn spawn_fetch(&self, launch: PendingFetch<T>) {
        let cache = self.clone();
        debug!(key = %launch.key, attempt = launch.attempt, "Starting load");
        tokio::spawn(async move {
            let result = launch.fetcher.fetch(&launch.key).await;
            cache.complete(&launch.key, launch.attempt, result);
        });
    }

    fn complete(&self, key: &QueryKey, attempt: AttemptToken, result: Result<T, RemoteError>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(entry) = inner
            .entries
            .get_mut(key)
            .filter(|entry| entry.in_flight == Some(attempt))
        else {
            inner.counters.discarded_responses += 1;
            debug!(key = %key, attempt, "Discarding superseded response");
            return;
        };

        entry.in_flight = None;
        match result {
            Ok(data) => {
                entry.mark_loaded(data);
                debug!(key = %key, attempt, "Load succeeded");
            }
            Err(error) => {
                warn!(
                    key = %key,
                    attempt,
                    kind = %error.kind,
                    code = %error.code,
                    "Load failed"
                );
                entry.state.send_modify(|s| {
                    s.status = QueryStatus::Error;
                    s.error = Some(error);
                });
            }
        }
    }
}

impl<T> Default for QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InvalidationTarget for QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn invalidate_matching(&self, matcher: &KeyMatch) -> usize {
        self.invalidate(matcher)
    }
}

/// A subscriber's handle on one query entry.
///
/// Dropping the handle does not unsubscribe; pass it to
/// [`QueryCache::unsubscribe`].
pub struct QuerySubscription<T> {
    id: u64,
    key: QueryKey,
    receiver: watch::Receiver<QuerySnapshot<T>>,
}

impl<T: Clone> QuerySubscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QuerySnapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the entry has been removed.
    pub async fn changed(&mut self) -> Option<QuerySnapshot<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the snapshot satisfies `predicate`, checking the current one first.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<QuerySnapshot<T>>
    where
        F: FnMut(&QuerySnapshot<T>) -> bool,
    {
        let snapshot = self.receiver.wait_for(predicate).await.ok()?;
        Some((*snapshot).clone())
    }

    /// Wait until no load is pending and the entry holds a result.
    pub async fn settled(&mut self) -> Option<QuerySnapshot<T>> {
        self.wait_for(|s| s.status.is_settled()).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Hands out scripted responses in call order, each held until released.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        gate: Semaphore,
        responses: Mutex<VecDeque<Result<u32, RemoteError>>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<u32, RemoteError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                responses: Mutex::new(responses.into()),
            })
        }

        fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryFetcher<u32> for ScriptedFetcher {
        async fn fetch(&self, _key: &QueryKey) -> Result<u32, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RemoteError::unknown("no scripted response")));
            self.gate.acquire().await.unwrap().forget();
            response
        }
    }

    fn key() -> QueryKey {
        QueryKey::new("tickets").with("status", "open")
    }

    async fn let_tasks_run() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_subscribe_loads_and_notifies() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(7)]);

        let mut sub = cache.subscribe(key(), fetcher.clone());
        assert!(sub.current().is_initial_load());

        fetcher.release(1);
        let snapshot = sub.settled().await.unwrap();
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert_eq!(snapshot.data, Some(7));
        assert!(snapshot.fetched_at.is_some());
        assert!(!snapshot.is_stale);
    }

    #[tokio::test]
    async fn test_concurrent_subscribers_share_one_load() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1), Ok(2)]);

        let mut subs: Vec<_> = (0..3)
            .map(|_| cache.subscribe(key(), fetcher.clone()))
            .collect();
        let_tasks_run().await;
        assert_eq!(fetcher.calls(), 1);

        fetcher.release(1);
        for sub in subs.iter_mut() {
            assert_eq!(sub.settled().await.unwrap().data, Some(1));
        }

        let stats = cache.stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.dedup_hits, 2);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.subscribers, 3);
    }

    #[tokio::test]
    async fn test_invalidate_serves_stale_data_while_reloading() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1), Ok(2)]);
        let mut sub = cache.subscribe(key(), fetcher.clone());
        fetcher.release(1);
        sub.settled().await.unwrap();

        let matched = cache.invalidate(&KeyMatch::resource("tickets"));
        assert_eq!(matched, 1);

        let during = sub.current();
        assert_eq!(during.data, Some(1));
        assert!(during.is_stale);
        assert!(during.is_loading());

        fetcher.release(1);
        let after = sub.settled().await.unwrap();
        assert_eq!(after.data, Some(2));
        assert!(!after.is_stale);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_data() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![
            Ok(1),
            Err(RemoteError::network("connection reset")),
        ]);
        let mut sub = cache.subscribe(key(), fetcher.clone());
        fetcher.release(1);
        sub.settled().await.unwrap();

        cache.invalidate(&KeyMatch::All);
        fetcher.release(1);
        let snapshot = sub.settled().await.unwrap();

        assert_eq!(snapshot.status, QueryStatus::Error);
        assert_eq!(snapshot.data, Some(1));
        assert_eq!(snapshot.error.unwrap().code, "network_error");
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1), Ok(2)]);

        let mut sub = cache.subscribe(key(), fetcher.clone());
        let_tasks_run().await;
        cache.invalidate(&KeyMatch::Exact(key()));
        let_tasks_run().await;
        assert_eq!(fetcher.calls(), 2);

        // The first load finishes first but has been superseded.
        fetcher.release(1);
        let_tasks_run().await;
        assert!(sub.current().is_initial_load());

        fetcher.release(1);
        let snapshot = sub.settled().await.unwrap();
        assert_eq!(snapshot.data, Some(2));
        assert_eq!(cache.stats().discarded_responses, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_last_removes_entry() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1)]);

        let sub = cache.subscribe(key(), fetcher.clone());
        let_tasks_run().await;
        cache.unsubscribe(sub);
        assert_eq!(cache.stats().entries, 0);

        fetcher.release(1);
        let_tasks_run().await;
        assert_eq!(cache.get(&key()).status, QueryStatus::Idle);
        assert_eq!(cache.stats().discarded_responses, 1);
    }

    #[tokio::test]
    async fn test_retained_entry_serves_cached_data() {
        let cache = QueryCache::<u32>::with_settings(CacheSettings::new().with_retain_unused(true));
        let fetcher = ScriptedFetcher::new(vec![Ok(5)]);

        let mut sub = cache.subscribe(key(), fetcher.clone());
        fetcher.release(1);
        sub.settled().await.unwrap();
        cache.unsubscribe(sub);
        assert_eq!(cache.stats().entries, 1);

        let again = cache.subscribe(key(), fetcher.clone());
        assert_eq!(again.current().data, Some(5));
        assert_eq!(again.current().status, QueryStatus::Success);
        assert_eq!(fetcher.calls(), 1);

        cache.unsubscribe(again);
        assert_eq!(cache.evict_unused(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_reloads_errored_entry() {
        let cache = QueryCache::<u32>::with_settings(CacheSettings::new().with_retain_unused(true));
        let fetcher = ScriptedFetcher::new(vec![Err(RemoteError::server("boom", "failed")), Ok(3)]);

        let mut first = cache.subscribe(key(), fetcher.clone());
        fetcher.release(1);
        assert!(first.settled().await.unwrap().is_error());

        let mut second = cache.subscribe(key(), fetcher.clone());
        assert!(second.current().is_loading());
        fetcher.release(1);
        assert_eq!(second.settled().await.unwrap().data, Some(3));
        assert_eq!(first.current().data, Some(3));
    }

    #[tokio::test]
    async fn test_set_entry_and_idle_invalidation() {
        let cache = QueryCache::<u32>::new();
        assert_eq!(cache.get(&key()).status, QueryStatus::Idle);

        cache.set_entry(key(), 9);
        let snapshot = cache.get(&key());
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert_eq!(snapshot.data, Some(9));

        // No subscribers and no fetcher: marked stale, nothing loads.
        assert_eq!(cache.invalidate(&KeyMatch::All), 1);
        let snapshot = cache.get(&key());
        assert!(snapshot.is_stale);
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert_eq!(cache.stats().fetches, 0);
    }

    #[tokio::test]
    async fn test_cancel_restores_status() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1), Ok(2)]);
        let mut sub = cache.subscribe(key(), fetcher.clone());
        fetcher.release(1);
        sub.settled().await.unwrap();

        cache.invalidate(&KeyMatch::All);
        assert!(cache.cancel(&key()));
        assert!(!cache.cancel(&key()));

        let snapshot = cache.get(&key());
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert_eq!(snapshot.data, Some(1));

        fetcher.release(1);
        let_tasks_run().await;
        assert_eq!(cache.get(&key()).data, Some(1));
        assert_eq!(cache.stats().discarded_responses, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_load_independently() {
        let cache = QueryCache::<u32>::new();
        let fetcher = ScriptedFetcher::new(vec![Ok(1), Ok(2)]);

        let mut open = cache.subscribe(key(), fetcher.clone());
        let mut done = cache.subscribe(
            QueryKey::new("tickets").with("status", "done"),
            fetcher.clone(),
        );
        fetcher.release(2);
        open.settled().await.unwrap();
        done.settled().await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cache.stats().entries, 2);
    }
}
