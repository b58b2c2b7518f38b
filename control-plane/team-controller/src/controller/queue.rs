use std::borrow::Borrow;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::trace;

/// Per-item exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Clone, Debug)]
pub struct ItemBackoff {
    base: Duration,
    max: Duration,
}

impl ItemBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn delay(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_secs(1000))
    }
}

/// Overall token bucket shared by every key: `qps` tokens per second, at
/// most `burst` banked. A reservation always succeeds and returns how long
/// the caller must wait for its token; the bucket may go into debt.
#[derive(Clone, Debug)]
pub struct TokenBucket {
    qps: f64,
    burst: u32,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A `qps` of zero or less disables the bucket.
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst: burst.max(1),
        }
    }

    fn is_enabled(&self) -> bool {
        self.qps > 0.0
    }

    fn full(&self, now: Instant) -> BucketState {
        BucketState {
            tokens: f64::from(self.burst),
            last: now,
        }
    }

    fn reserve(&self, st: &mut BucketState, now: Instant) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }
        let elapsed = now.saturating_duration_since(st.last).as_secs_f64();
        st.tokens = (st.tokens + elapsed * self.qps).min(f64::from(self.burst));
        st.last = now;
        st.tokens -= 1.0;
        if st.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-st.tokens / self.qps)
        }
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(10.0, 100)
    }
}

struct State<K> {
    /// Keys ready to be handed out, in FIFO order.
    queue: VecDeque<K>,
    /// Keys that need processing: queued, or re-added while processing.
    dirty: HashSet<K>,
    /// Keys currently held by a worker.
    processing: HashSet<K>,
    /// Keys scheduled for a later add, with their deadline.
    waiting: HashMap<K, Instant>,
    /// Retry counters.
    failures: HashMap<K, u32>,
    bucket: BucketState,
    shutting_down: bool,
}

struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: ItemBackoff,
    bucket: TokenBucket,
}

/// Deduplicating, rate-limited, delaying work queue.
///
/// A key is handed to at most one worker at a time. Adding a key that is
/// already queued is a no-op; adding a key while it is being processed marks
/// it dirty and it is queued again as soon as [`WorkQueue::done`] is called.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(backoff: ItemBackoff) -> Self {
        Self::with_bucket(backoff, TokenBucket::default())
    }

    pub fn with_bucket(backoff: ItemBackoff, bucket: TokenBucket) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashMap::new(),
                    failures: HashMap::new(),
                    bucket: bucket.full(Instant::now()),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff,
                bucket,
            }),
        }
    }

    pub async fn add(&self, key: K) {
        let mut st = self.inner.state.lock().await;
        if st.shutting_down || st.dirty.contains(&key) {
            return;
        }
        st.dirty.insert(key.clone());
        if st.processing.contains(&key) {
            trace!(?key, "queue: key busy; marked dirty");
            return;
        }
        st.queue.push_back(key);
        drop(st);
        self.inner.notify.notify_one();
    }

    /// Wait for the next ready key. Returns `None` once the queue has been
    /// shut down and every queued key has been handed out.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.inner.state.lock().await;
                if let Some(key) = st.queue.pop_front() {
                    st.dirty.remove(&key);
                    st.processing.insert(key.clone());
                    let more = !st.queue.is_empty();
                    drop(st);
                    if more {
                        // pass the wakeup on so other idle workers drain the rest
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
                if st.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark `key` as finished. A key re-added while it was processing is
    /// queued again immediately.
    pub async fn done(&self, key: &K) {
        let mut st = self.inner.state.lock().await;
        st.processing.remove(key);
        if st.dirty.contains(key) {
            st.queue.push_back(key.clone());
            drop(st);
            self.inner.notify.notify_one();
        }
    }

    /// Reset the retry counter of `key`.
    pub async fn forget<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.state.lock().await.failures.remove(key);
    }

    pub async fn num_requeues<Q>(&self, key: &Q) -> u32
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .state
            .lock()
            .await
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Re-add `key` after the longer of its own backoff and the shared
    /// bucket's delay, and bump its retry counter.
    pub async fn add_rate_limited(&self, key: K) {
        let delay = {
            let mut st = self.inner.state.lock().await;
            let failures = st.failures.entry(key.clone()).or_insert(0);
            let item_delay = self.inner.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            let bucket_delay =
                self.inner.bucket.reserve(&mut st.bucket, Instant::now());
            item_delay.max(bucket_delay)
        };
        self.add_after(key, delay).await;
    }

    /// Add `key` once `delay` has elapsed. When the key is already waiting
    /// the earlier deadline wins.
    pub async fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key).await;
            return;
        }
        let deadline = Instant::now() + delay;
        {
            let mut st = self.inner.state.lock().await;
            if st.shutting_down {
                return;
            }
            if let Some(existing) = st.waiting.get(&key) {
                if *existing <= deadline {
                    return;
                }
            }
            st.waiting.insert(key.clone(), deadline);
        }
        trace!(?key, ?delay, "queue: key delayed");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut st = queue.inner.state.lock().await;
                if st.waiting.get(&key) != Some(&deadline) {
                    // superseded by an earlier deadline or dropped on shutdown
                    return;
                }
                st.waiting.remove(&key);
            }
            queue.add(key).await;
        });
    }

    /// Stop accepting new keys and wake every idle `get`. Keys already
    /// queued are still handed out; delayed keys are discarded.
    pub async fn shut_down(&self) {
        {
            let mut st = self.inner.state.lock().await;
            st.shutting_down = true;
            st.waiting.clear();
        }
        self.inner.notify.notify_waiters();
    }

    pub async fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().await.shutting_down
    }

    /// Number of keys ready to be handed out.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
