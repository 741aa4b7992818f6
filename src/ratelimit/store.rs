//! Keyed bucket storage with expiry and a capacity bound.
//!
//! The store keeps an explicit creation-order index next to the hash map, so
//! "oldest key first" eviction does not depend on the iteration order of any
//! map type. Eviction is by creation time, not by last access: a bucket that
//! was consumed a moment ago is still evicted ahead of a younger one.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace, warn};

use super::bucket::Bucket;

#[derive(Debug)]
struct Slot {
    bucket: Bucket,
    /// Position in the creation-order index
    seq: u64,
}

/// Buckets for one limiter, bounded to `capacity` entries.
#[derive(Debug)]
pub struct BucketStore {
    buckets: HashMap<String, Slot>,
    /// Creation sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    window_ms: u64,
    capacity: usize,
    sweep_interval_ms: u64,
    last_sweep: u64,
    /// Live buckets evicted for capacity since the last warning
    pending_evictions: u64,
    last_capacity_warn: Option<u64>,
}

impl BucketStore {
    /// Create an empty store. `now` starts the sweep interval.
    pub fn new(window_ms: u64, capacity: usize, sweep_interval_ms: u64, now: u64) -> Self {
        Self {
            buckets: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            window_ms,
            capacity,
            sweep_interval_ms,
            last_sweep: now,
            pending_evictions: 0,
            last_capacity_warn: None,
        }
    }

    /// Return the live bucket for `key`, creating one if it is absent or expired.
    ///
    /// An expired bucket is dropped and replaced by a fresh one that counts as
    /// newly created for eviction ordering. Inserting into a full store runs
    /// capacity eviction first.
    pub fn get_or_create(&mut self, key: &str, now: u64) -> &mut Bucket {
        let live = self
            .buckets
            .get(key)
            .is_some_and(|slot| !slot.bucket.is_expired(now));

        if !live {
            self.remove(key);
            if self.buckets.len() >= self.capacity {
                self.evict_for_insert(now);
            }
        }

        let window_ms = self.window_ms;
        let seq = self.next_seq;
        let next_seq = &mut self.next_seq;
        let order = &mut self.order;
        let slot = self.buckets.entry(key.to_owned()).or_insert_with(|| {
            debug!(key = %key, window_ms, "Creating new bucket");
            *next_seq += 1;
            order.insert(seq, key.to_owned());
            Slot {
                bucket: Bucket::new(now, window_ms),
                seq,
            }
        });
        &mut slot.bucket
    }

    /// Look up the live bucket for `key` without creating or reordering anything.
    pub fn peek(&self, key: &str, now: u64) -> Option<&Bucket> {
        self.buckets
            .get(key)
            .map(|slot| &slot.bucket)
            .filter(|bucket| !bucket.is_expired(now))
    }

    /// Run [`sweep_expired`](Self::sweep_expired) if more than the sweep
    /// interval has passed since the last sweep. Returns the number of
    /// buckets dropped.
    pub fn maybe_sweep(&mut self, now: u64) -> usize {
        if now.saturating_sub(self.last_sweep) <= self.sweep_interval_ms {
            return 0;
        }
        self.last_sweep = now;
        let dropped = self.sweep_expired(now);
        trace!(dropped, remaining = self.buckets.len(), "Periodic sweep");
        dropped
    }

    /// Drop every expired bucket. Returns the number dropped.
    pub fn sweep_expired(&mut self, now: u64) -> usize {
        let before = self.buckets.len();
        let order = &mut self.order;
        self.buckets.retain(|_, slot| {
            if slot.bucket.is_expired(now) {
                order.remove(&slot.seq);
                false
            } else {
                true
            }
        });
        before - self.buckets.len()
    }

    /// Make room for one new bucket.
    ///
    /// Expired buckets go first. With a fixed window, `reset_at` rises with
    /// creation order, so the expired buckets are the ones at the front of
    /// the index and only that prefix is visited. If the store is still full,
    /// buckets are dropped oldest-created first until there is room. Always
    /// terminates, since every pass of either loop removes an index entry.
    pub fn evict_for_insert(&mut self, now: u64) {
        let mut expired = 0usize;
        while let Some(front) = self.order.first_entry() {
            let live = self
                .buckets
                .get(front.get())
                .is_some_and(|slot| !slot.bucket.is_expired(now));
            if live {
                break;
            }
            let key = front.remove();
            self.buckets.remove(&key);
            expired += 1;
        }

        let mut evicted_live = 0u64;
        while self.buckets.len() >= self.capacity {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.buckets.remove(&key);
            evicted_live += 1;
        }

        if evicted_live > 0 {
            debug!(expired, evicted_live, "Evicted live buckets for capacity");
            self.note_capacity_eviction(evicted_live, now);
        } else if expired > 0 {
            debug!(expired, "Reclaimed expired buckets before insert");
        }
    }

    /// Warn about capacity pressure at most once per sweep interval.
    fn note_capacity_eviction(&mut self, evicted: u64, now: u64) {
        self.pending_evictions += evicted;
        let due = self
            .last_capacity_warn
            .map_or(true, |last| now.saturating_sub(last) > self.sweep_interval_ms);
        if due {
            warn!(
                evicted_live = self.pending_evictions,
                capacity = self.capacity,
                "Bucket store at capacity, evicting live buckets"
            );
            self.pending_evictions = 0;
            self.last_capacity_warn = Some(now);
        }
    }

    /// Live evictions not yet reported by a warning.
    pub fn pending_evictions(&self) -> u64 {
        self.pending_evictions
    }

    /// Number of stored buckets, live or not yet swept.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the store holds no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Keys in creation order, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    fn remove(&mut self, key: &str) {
        if let Some(slot) = self.buckets.remove(key) {
            self.order.remove(&slot.seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 1_000;
    const SWEEP: u64 = 60_000;

    fn keys(store: &BucketStore) -> Vec<&str> {
        store.keys().collect()
    }

    #[test]
    fn test_get_or_create_reuses_live_bucket() {
        let mut store = BucketStore::new(WINDOW, 10, SWEEP, 0);

        store.get_or_create("a", 0).increment();
        store.get_or_create("a", 500).increment();

        assert_eq!(store.len(), 1);
        assert_eq!(store.peek("a", 500).map(|b| b.count), Some(2));
        assert_eq!(store.peek("a", 500).map(|b| b.reset_at), Some(WINDOW));
    }

    #[test]
    fn test_expired_bucket_is_replaced() {
        let mut store = BucketStore::new(WINDOW, 10, SWEEP, 0);

        store.get_or_create("a", 0).increment();
        let bucket = store.get_or_create("a", WINDOW + 1);

        assert_eq!(bucket.count, 0);
        assert_eq!(bucket.reset_at, 2 * WINDOW + 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replaced_bucket_moves_to_back_of_order() {
        let mut store = BucketStore::new(WINDOW, 10, SWEEP, 0);

        store.get_or_create("a", 0);
        store.get_or_create("b", 600);
        // "a" expired at 1000; "b" is still live
        store.get_or_create("a", 1_200);

        assert_eq!(keys(&store), vec!["b", "a"]);
    }

    #[test]
    fn test_peek_ignores_missing_and_expired() {
        let mut store = BucketStore::new(WINDOW, 10, SWEEP, 0);
        assert!(store.peek("a", 0).is_none());

        store.get_or_create("a", 0);
        assert!(store.peek("a", WINDOW).is_some());
        assert!(store.peek("a", WINDOW + 1).is_none());
        // peek leaves the stale entry for the sweeper
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest_created() {
        let mut store = BucketStore::new(60_000, 2, SWEEP, 0);

        store.get_or_create("a", 0);
        store.get_or_create("b", 1);
        // touching "a" does not protect it
        store.get_or_create("a", 2).increment();
        store.get_or_create("c", 3);

        assert_eq!(keys(&store), vec!["b", "c"]);
        assert!(store.peek("a", 3).is_none());
    }

    #[test]
    fn test_capacity_prefers_expired_buckets() {
        let mut store = BucketStore::new(WINDOW, 2, SWEEP, 0);

        store.get_or_create("old", 0);
        store.get_or_create("young", 900);
        // "old" expired at 1000, "young" lives until 1900
        store.get_or_create("new", 1_500);

        assert_eq!(keys(&store), vec!["young", "new"]);
    }

    #[test]
    fn test_capacity_reclaims_expired_front_only() {
        let mut store = BucketStore::new(WINDOW, 4, SWEEP, 0);

        store.get_or_create("a", 0);
        store.get_or_create("b", 1);
        store.get_or_create("c", 500);
        store.get_or_create("d", 600);
        // "a" and "b" expired, "c" and "d" live until 1500/1600
        store.get_or_create("e", 1_200);

        assert_eq!(keys(&store), vec!["c", "d", "e"]);
        assert_eq!(store.pending_evictions(), 0);
    }

    #[test]
    fn test_capacity_with_all_expired_reclaims_everything() {
        let mut store = BucketStore::new(WINDOW, 3, SWEEP, 0);

        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            store.get_or_create(key, i as u64);
        }
        store.get_or_create("fresh", 5_000);

        assert_eq!(keys(&store), vec!["fresh"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_warning_is_throttled() {
        let mut store = BucketStore::new(60_000, 1, 10_000, 0);

        store.get_or_create("a", 0);
        // first live eviction warns immediately
        store.get_or_create("b", 1);
        assert_eq!(store.pending_evictions(), 0);

        // further evictions inside the interval accumulate
        for (i, key) in ["c", "d", "e"].iter().enumerate() {
            store.get_or_create(key, 2 + i as u64);
        }
        assert_eq!(store.pending_evictions(), 3);

        // the next eviction after the interval reports the backlog
        store.get_or_create("f", 10_002);
        assert_eq!(store.pending_evictions(), 0);
    }

    #[test]
    fn test_capacity_of_one_keeps_exactly_one() {
        let mut store = BucketStore::new(60_000, 1, SWEEP, 0);

        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            store.get_or_create(key, i as u64);
            assert_eq!(store.len(), 1);
        }
        assert_eq!(keys(&store), vec!["d"]);
    }

    #[test]
    fn test_sweep_expired() {
        let mut store = BucketStore::new(WINDOW, 10, SWEEP, 0);
        store.get_or_create("a", 0);
        store.get_or_create("b", 500);
        store.get_or_create("c", 2_000);

        let dropped = store.sweep_expired(1_600);

        assert_eq!(dropped, 2);
        assert_eq!(keys(&store), vec!["c"]);
    }

    #[test]
    fn test_maybe_sweep_waits_for_interval() {
        let mut store = BucketStore::new(WINDOW, 10, SWEEP, 0);
        store.get_or_create("a", 0);

        assert_eq!(store.maybe_sweep(SWEEP), 0);
        assert_eq!(store.len(), 1);

        assert_eq!(store.maybe_sweep(SWEEP + 1), 1);
        assert!(store.is_empty());
        assert_eq!(keys(&store), Vec::<&str>::new());
    }
}
