use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{SamplingStore, StoreStats};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Series, StoreError, StoreResult};
use crate::model::{
    HostProbabilitiesAndQPS, ProbabilitiesAndQPSSnapshot, ServiceOperationProbabilities,
    ServiceOperationQPS, Throughput,
};

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe, bounded in-memory sampling store.
/// Collectors call the insert methods, the strategy calculator queries.
pub struct MemorySamplingStore {
    max_buckets: usize,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    // Both series are ordered by `observed_at` because stamps never go backwards
    throughputs: VecDeque<Throughput>,
    snapshots: VecDeque<ProbabilitiesAndQPSSnapshot>,

    // Last stamp handed out, shared by both series
    last_stamp: Option<DateTime<Utc>>,

    // Lifetime counters
    throughput_inserted: u64,
    throughput_evicted: u64,
    snapshots_inserted: u64,
    snapshots_evicted: u64,
}

// ─── MemorySamplingStore impl ────────────────────────────────────

impl MemorySamplingStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            max_buckets: config.max_buckets,
            clock,
            inner: Mutex::new(Inner::new()),
        })
    }

    pub fn max_buckets(&self) -> usize {
        self.max_buckets
    }

    /// Counters and current lengths of both series.
    pub fn stats(&self) -> StoreStats {
        self.inner.lock().stats(self.max_buckets)
    }

    /// Drop everything stored so far. Capacity is kept.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }
}

impl std::fmt::Debug for MemorySamplingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemorySamplingStore")
            .field("max_buckets", &self.max_buckets)
            .field("throughputs", &inner.throughputs.len())
            .field("snapshots", &inner.snapshots.len())
            .finish()
    }
}

impl SamplingStore for MemorySamplingStore {
    fn insert_throughput(&self, throughput: Vec<Throughput>) -> StoreResult<()> {
        if throughput.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        self.inner
            .lock()
            .insert_throughput(throughput, now, self.max_buckets)
    }

    fn get_throughput(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Throughput>> {
        Ok(self.inner.lock().throughput_between(start, end))
    }

    fn insert_probabilities_and_qps(
        &self,
        hostname: &str,
        probabilities: ServiceOperationProbabilities,
        qps: ServiceOperationQPS,
    ) -> StoreResult<()> {
        let now = self.clock.now();
        let snapshot = ProbabilitiesAndQPSSnapshot {
            hostname: hostname.to_string(),
            probabilities,
            qps,
            observed_at: now,
        };
        self.inner
            .lock()
            .insert_snapshot(snapshot, now, self.max_buckets)
    }

    fn get_latest_probabilities(&self) -> StoreResult<ServiceOperationProbabilities> {
        Ok(self
            .inner
            .lock()
            .snapshots
            .back()
            .map(|s| s.probabilities.clone())
            .unwrap_or_default())
    }

    fn get_probabilities_and_qps(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<HostProbabilitiesAndQPS> {
        Ok(self.inner.lock().probabilities_and_qps_between(start, end))
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            throughputs: VecDeque::new(),
            snapshots: VecDeque::new(),
            last_stamp: None,
            throughput_inserted: 0,
            throughput_evicted: 0,
            snapshots_inserted: 0,
            snapshots_evicted: 0,
        }
    }

    /// Clamp the clock reading so stamps never run backwards.
    fn next_stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    fn insert_throughput(
        &mut self,
        mut batch: Vec<Throughput>,
        now: DateTime<Utc>,
        max_buckets: usize,
    ) -> StoreResult<()> {
        let stamp = self.next_stamp(now);
        for t in &mut batch {
            t.observed_at = stamp;
        }

        let inserted = batch.len();
        let evicted = append_bounded(
            &mut self.throughputs,
            Series::Throughput,
            batch,
            max_buckets,
        )?;

        self.last_stamp = Some(stamp);
        self.throughput_inserted += inserted as u64;
        self.throughput_evicted += evicted as u64;
        tracing::debug!(inserted, evicted, retained = self.throughputs.len(), "stored throughput");
        Ok(())
    }

    fn insert_snapshot(
        &mut self,
        mut snapshot: ProbabilitiesAndQPSSnapshot,
        now: DateTime<Utc>,
        max_buckets: usize,
    ) -> StoreResult<()> {
        let stamp = self.next_stamp(now);
        snapshot.observed_at = stamp;

        let hostname = snapshot.hostname.clone();
        let evicted = append_bounded(
            &mut self.snapshots,
            Series::ProbabilitiesAndQPS,
            vec![snapshot],
            max_buckets,
        )?;

        self.last_stamp = Some(stamp);
        self.snapshots_inserted += 1;
        self.snapshots_evicted += evicted as u64;
        tracing::debug!(%hostname, evicted, retained = self.snapshots.len(), "stored probabilities and qps");
        Ok(())
    }

    fn throughput_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Throughput> {
        let range = window(&self.throughputs, start, end, |t| t.observed_at);
        self.throughputs.range(range).cloned().collect()
    }

    fn probabilities_and_qps_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HostProbabilitiesAndQPS {
        let range = window(&self.snapshots, start, end, |s| s.observed_at);

        let mut by_host = HostProbabilitiesAndQPS::new();
        for snapshot in self.snapshots.range(range) {
            by_host
                .entry(snapshot.hostname.clone())
                .or_default()
                .push(snapshot.combined());
        }
        by_host
    }

    fn stats(&self, max_buckets: usize) -> StoreStats {
        StoreStats {
            max_buckets,
            throughput_len: self.throughputs.len(),
            throughput_inserted: self.throughput_inserted,
            throughput_evicted: self.throughput_evicted,
            snapshots_len: self.snapshots.len(),
            snapshots_inserted: self.snapshots_inserted,
            snapshots_evicted: self.snapshots_evicted,
        }
    }
}

// ─── Series helpers ──────────────────────────────────────────────

/// Append `items` and drop the oldest entries beyond `max_buckets`.
/// Returns how many entries were evicted, counting incoming ones that
/// would be dropped straight away. Room is reserved before anything is
/// touched, so a refused allocation leaves the series as it was.
fn append_bounded<T>(
    series: &mut VecDeque<T>,
    kind: Series,
    items: Vec<T>,
    max_buckets: usize,
) -> StoreResult<usize> {
    let total = series.len() + items.len();
    let additional = total.min(max_buckets).saturating_sub(series.len());
    if let Err(e) = series.try_reserve(additional) {
        tracing::warn!(series = %kind, additional, error = %e, "sampling store allocation refused");
        return Err(StoreError::ResourceExhausted {
            series: kind,
            requested: additional,
        });
    }

    let overflow = total.saturating_sub(max_buckets);
    let from_existing = overflow.min(series.len());
    series.drain(..from_existing);
    series.extend(items.into_iter().skip(overflow - from_existing));
    Ok(overflow)
}

/// Index range of entries stamped in `[start, end)`.
/// Relies on the series being sorted by stamp.
fn window<T>(
    series: &VecDeque<T>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    stamp: impl Fn(&T) -> DateTime<Utc>,
) -> Range<usize> {
    if start >= end {
        return 0..0;
    }
    let lo = series.partition_point(|e| stamp(e) < start);
    let hi = series.partition_point(|e| stamp(e) < end);
    lo..hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ProbabilityAndQPS;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn nested(service: &str, operation: &str, value: f64) -> BTreeMap<String, BTreeMap<String, f64>> {
        BTreeMap::from([(
            service.to_string(),
            BTreeMap::from([(operation.to_string(), value)]),
        )])
    }

    fn store_with_clock(max_buckets: usize) -> (MemorySamplingStore, Arc<ManualClock>, DateTime<Utc>) {
        let t0 = Utc::now();
        let clock = Arc::new(ManualClock::new(t0));
        let store =
            MemorySamplingStore::with_clock(StoreConfig::with_max_buckets(max_buckets), clock.clone())
                .unwrap();
        (store, clock, t0)
    }

    /// Three throughputs and three snapshots at t0, t0+100ms and t0+2s.
    fn populated_store() -> (MemorySamplingStore, DateTime<Utc>) {
        let (store, clock, t0) = store_with_clock(10);

        store
            .insert_throughput(vec![Throughput::new("svc-1", "op-1", 1)])
            .unwrap();
        store
            .insert_probabilities_and_qps(
                "guntur38ab8928",
                nested("svc-1", "op-1", 0.01),
                nested("svc-1", "op-1", 10.0),
            )
            .unwrap();

        clock.set(t0 + Duration::milliseconds(100));
        store
            .insert_throughput(vec![Throughput::new("svc-1", "op-2", 1)])
            .unwrap();
        store
            .insert_probabilities_and_qps(
                "peta0242ac130003",
                nested("svc-1", "op-2", 0.008),
                nested("svc-1", "op-2", 4.0),
            )
            .unwrap();

        clock.set(t0 + Duration::seconds(2));
        store
            .insert_throughput(vec![Throughput::new("svc-2", "op-3", 1)])
            .unwrap();
        store
            .insert_probabilities_and_qps(
                "tenali11ec8d3d",
                nested("svc-2", "op-3", 0.003),
                nested("svc-1", "op-1", 7.0),
            )
            .unwrap();

        (store, t0)
    }

    #[test]
    fn insert_throughput_appends_in_order() {
        let (store, _, t0) = store_with_clock(10);
        store
            .insert_throughput(vec![
                Throughput::new("my-svc", "op", 0),
                Throughput::new("our-svc", "op2", 0),
            ])
            .unwrap();

        let all = store
            .get_throughput(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].service, "my-svc");
        assert_eq!(all[1].service, "our-svc");
        assert!(all.iter().all(|t| t.observed_at == t0));
    }

    #[test]
    fn caller_timestamp_is_overwritten() {
        let (store, _, t0) = store_with_clock(10);
        let mut t = Throughput::new("svc", "op", 5);
        t.observed_at = t0 - Duration::days(3);
        store.insert_throughput(vec![t]).unwrap();

        let stored = store.get_throughput(t0, t0 + Duration::seconds(1)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].observed_at, t0);
    }

    #[test]
    fn get_throughput_uses_half_open_window() {
        let (store, t0) = populated_store();
        // Mirrors a query issued just after the first insert.
        let start = t0 + Duration::milliseconds(1);

        let ret = store.get_throughput(start, start + Duration::seconds(1)).unwrap();
        assert_eq!(ret.len(), 1);
        assert_eq!(ret[0].operation, "op-2");

        assert!(store.get_throughput(start, start).unwrap().is_empty());
        assert_eq!(
            store.get_throughput(start, start + Duration::hours(1)).unwrap().len(),
            2
        );

        // Entry stamped exactly at `end` is excluded, exactly at `start` included.
        let at_100ms = t0 + Duration::milliseconds(100);
        assert_eq!(store.get_throughput(t0, at_100ms).unwrap().len(), 1);
        assert_eq!(
            store.get_throughput(at_100ms, at_100ms + Duration::milliseconds(1)).unwrap()[0].operation,
            "op-2"
        );
    }

    #[test]
    fn inverted_window_is_empty() {
        let (store, t0) = populated_store();
        let ret = store.get_throughput(t0 + Duration::hours(1), t0).unwrap();
        assert!(ret.is_empty());
        let ret = store.get_probabilities_and_qps(t0 + Duration::hours(1), t0).unwrap();
        assert!(ret.is_empty());
    }

    #[test]
    fn widening_window_never_drops_records() {
        let (store, t0) = populated_store();
        let mut previous = Vec::new();
        for secs in [0, 1, 2, 3, 60] {
            let ret = store
                .get_throughput(t0, t0 + Duration::seconds(secs) + Duration::milliseconds(1))
                .unwrap();
            assert!(previous.iter().all(|p| ret.contains(p)));
            previous = ret;
        }
        assert_eq!(previous.len(), 3);
    }

    #[test]
    fn throughput_is_evicted_oldest_first() {
        let (store, clock, _) = store_with_clock(3);
        for i in 0..4u64 {
            store
                .insert_throughput(vec![Throughput::new("svc", format!("op-{i}"), i)])
                .unwrap();
            clock.advance(Duration::seconds(1));
        }

        let all = store
            .get_throughput(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .unwrap();
        let ops: Vec<_> = all.iter().map(|t| t.operation.as_str()).collect();
        assert_eq!(ops, ["op-1", "op-2", "op-3"]);

        let stats = store.stats();
        assert_eq!(stats.throughput_len, 3);
        assert_eq!(stats.throughput_inserted, 4);
        assert_eq!(stats.throughput_evicted, 1);
        assert!(stats.has_evicted());
    }

    #[test]
    fn oversized_batch_keeps_newest_tail() {
        let (store, _, _) = store_with_clock(2);
        store
            .insert_throughput(vec![Throughput::new("svc", "old", 0)])
            .unwrap();
        store
            .insert_throughput(
                (0..5u64)
                    .map(|i| Throughput::new("svc", format!("op-{i}"), i))
                    .collect(),
            )
            .unwrap();

        let all = store
            .get_throughput(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .unwrap();
        let ops: Vec<_> = all.iter().map(|t| t.operation.as_str()).collect();
        assert_eq!(ops, ["op-3", "op-4"]);
        assert_eq!(store.stats().throughput_evicted, 4);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (store, _, _) = store_with_clock(2);
        store.insert_throughput(Vec::new()).unwrap();
        assert_eq!(store.stats(), StoreStats { max_buckets: 2, ..Default::default() });
    }

    #[test]
    fn insert_probabilities_and_qps_appends() {
        let (store, _, _) = store_with_clock(10);
        store
            .insert_probabilities_and_qps(
                "dell11eg843d",
                nested("new-srv", "op", 0.1),
                nested("new-srv", "op", 4.0),
            )
            .unwrap();
        assert_eq!(store.stats().snapshots_len, 1);

        store
            .insert_probabilities_and_qps(
                "lncol73",
                nested("my-app", "hello", 0.3),
                nested("new-srv", "op", 7.0),
            )
            .unwrap();
        assert_eq!(store.stats().snapshots_len, 2);
    }

    #[test]
    fn snapshots_are_evicted_oldest_first() {
        let (store, _, _) = store_with_clock(2);
        for host in ["a", "b", "c"] {
            store
                .insert_probabilities_and_qps(host, nested("svc", "op", 0.5), nested("svc", "op", 1.0))
                .unwrap();
        }
        let hosts = store
            .get_probabilities_and_qps(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .unwrap();
        assert_eq!(hosts.keys().collect::<Vec<_>>(), ["b", "c"]);
        assert_eq!(store.stats().snapshots_evicted, 1);
    }

    #[test]
    fn latest_probabilities_on_empty_store() {
        let (store, _, _) = store_with_clock(10);
        assert!(store.get_latest_probabilities().unwrap().is_empty());
    }

    #[test]
    fn latest_probabilities_follow_insertion_order() {
        let (store, _) = populated_store();
        assert_eq!(
            store.get_latest_probabilities().unwrap(),
            nested("svc-2", "op-3", 0.003)
        );

        store
            .insert_probabilities_and_qps(
                "utfhyolf",
                nested("another-service", "hello", 0.009),
                nested("new-srv", "op", 5.0),
            )
            .unwrap();
        assert_eq!(
            store.get_latest_probabilities().unwrap(),
            nested("another-service", "hello", 0.009)
        );
    }

    #[test]
    fn latest_wins_even_when_clock_steps_back() {
        let (store, clock, t0) = store_with_clock(10);
        store
            .insert_probabilities_and_qps("a", nested("svc", "op", 0.1), Default::default())
            .unwrap();
        clock.set(t0 - Duration::minutes(5));
        store
            .insert_probabilities_and_qps("b", nested("svc", "op", 0.2), Default::default())
            .unwrap();

        assert_eq!(store.get_latest_probabilities().unwrap(), nested("svc", "op", 0.2));
        // The second stamp was clamped to the first.
        let hosts = store.get_probabilities_and_qps(t0, t0 + Duration::seconds(1)).unwrap();
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn get_probabilities_and_qps_groups_by_host() {
        let (store, t0) = populated_store();
        let start = t0 + Duration::milliseconds(1);

        let ret = store
            .get_probabilities_and_qps(start, start + Duration::seconds(1))
            .unwrap();
        assert_eq!(ret.len(), 1);
        assert_eq!(
            ret["peta0242ac130003"][0]["svc-1"]["op-2"],
            ProbabilityAndQPS {
                probability: 0.008,
                qps: 4.0
            }
        );

        assert!(store.get_probabilities_and_qps(start, start).unwrap().is_empty());

        let ret = store
            .get_probabilities_and_qps(t0 - Duration::seconds(1), t0 + Duration::seconds(10))
            .unwrap();
        assert_eq!(ret.len(), 3);
        assert_eq!(
            ret["guntur38ab8928"][0]["svc-1"]["op-1"],
            ProbabilityAndQPS {
                probability: 0.01,
                qps: 10.0
            }
        );
        // QPS was recorded under an unrelated key.
        assert_eq!(ret["tenali11ec8d3d"][0]["svc-2"]["op-3"].qps, 0.0);
    }

    #[test]
    fn host_entries_stay_chronological() {
        let (store, clock, t0) = store_with_clock(10);
        for (i, p) in [0.1, 0.2, 0.3].into_iter().enumerate() {
            clock.set(t0 + Duration::seconds(i as i64));
            store
                .insert_probabilities_and_qps("A", nested("svc", "op", p), nested("svc", "op", 1.0))
                .unwrap();
            store
                .insert_probabilities_and_qps("B", nested("svc", "op", p * 2.0), Default::default())
                .unwrap();
        }

        let ret = store
            .get_probabilities_and_qps(t0, t0 + Duration::seconds(3))
            .unwrap();
        let probabilities: Vec<f64> = ret["A"].iter().map(|s| s["svc"]["op"].probability).collect();
        assert_eq!(probabilities, [0.1, 0.2, 0.3]);
        assert_eq!(ret["B"].len(), 3);
    }

    #[test]
    fn reset_clears_both_series() {
        let (store, _) = populated_store();
        store.reset();

        assert!(store.get_latest_probabilities().unwrap().is_empty());
        assert!(store
            .get_throughput(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
            .unwrap()
            .is_empty());
        assert_eq!(store.stats(), StoreStats { max_buckets: 10, ..Default::default() });
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = MemorySamplingStore::new(StoreConfig::with_max_buckets(0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig { .. }));
    }

    #[test]
    fn append_bounded_reports_overflow() {
        let mut series: VecDeque<u32> = VecDeque::from([1, 2]);
        let evicted = append_bounded(&mut series, Series::Throughput, vec![3, 4, 5], 3).unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(series, [3, 4, 5]);
    }
}
