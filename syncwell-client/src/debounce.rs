//! Input debouncing.
//!
//! A burst of `notify` calls on one channel collapses into a single
//! [`Debounced`] value, delivered once the channel has been quiet for the
//! configured delay. Channels are independent of each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use syncwell_core::{DebounceError, DebounceSettings};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A value that survived its quiet period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debounced<V> {
    pub channel: String,
    pub value: V,
}

struct Pending<V> {
    generation: u64,
    value: V,
    handle: JoinHandle<()>,
}

struct DebounceInner<V> {
    pending: HashMap<String, Pending<V>>,
    next_generation: u64,
}

/// Per-channel trailing-edge debouncer.
///
/// Must be used from within a tokio runtime. Dropping it cancels every
/// pending emission.
pub struct Debouncer<V> {
    inner: Arc<Mutex<DebounceInner<V>>>,
    delay: Duration,
    tx: mpsc::UnboundedSender<Debounced<V>>,
}

impl<V> Debouncer<V>
where
    V: Clone + Send + 'static,
{
    pub fn new(settings: &DebounceSettings) -> (Self, mpsc::UnboundedReceiver<Debounced<V>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            inner: Arc::new(Mutex::new(DebounceInner {
                pending: HashMap::new(),
                next_generation: 0,
            })),
            delay: settings.delay,
            tx,
        };
        (debouncer, rx)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record `value` as the latest input on `channel` and restart its timer.
    pub fn notify(&self, channel: impl Into<String>, value: V) -> Result<(), DebounceError> {
        if self.tx.is_closed() {
            return Err(DebounceError::Closed);
        }
        let channel = channel.into();
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;

        inner.next_generation += 1;
        let generation = inner.next_generation;

        if let Some(previous) = inner.pending.remove(&channel) {
            previous.handle.abort();
            trace!(channel = %channel, generation = previous.generation, "Timer restarted");
        }

        let handle = tokio::spawn(fire(
            Arc::clone(&self.inner),
            self.tx.clone(),
            channel.clone(),
            generation,
            self.delay,
        ));
        inner.pending.insert(
            channel,
            Pending {
                generation,
                value,
                handle,
            },
        );
        Ok(())
    }

    /// Drop the pending value on `channel` without emitting it.
    pub fn cancel(&self, channel: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.pending.remove(channel) {
            Some(pending) => {
                pending.handle.abort();
                debug!(channel = %channel, "Pending value cancelled");
                true
            }
            None => false,
        }
    }

    pub fn pending_value(&self, channel: &str) -> Option<V> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.pending.get(channel).map(|p| p.value.clone())
    }

    pub fn pending_channels(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.pending.len()
    }
}

impl<V> Drop for Debouncer<V> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, pending) in inner.pending.drain() {
            pending.handle.abort();
        }
    }
}

async fn fire<V>(
    inner: Arc<Mutex<DebounceInner<V>>>,
    tx: mpsc::UnboundedSender<Debounced<V>>,
    channel: String,
    generation: u64,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;

    let value = {
        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
        // A later notify replaced this timer after it had already woken.
        match guard.pending.get(&channel) {
            Some(p) if p.generation == generation => {}
            _ => return,
        }
        match guard.pending.remove(&channel) {
            Some(pending) => pending.value,
            None => return,
        }
    };

    debug!(channel = %channel, generation, "Debounced value emitted");
    let _ = tx.send(Debounced { channel, value });
}

// ============================================================================
// TESTS
// ============================================================================
