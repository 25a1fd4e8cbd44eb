//! The agent store: identity map, spatial index, and per-agent history
//! behind one read/write lock.
//!
//! # Consistency invariant
//!
//! The identity map and the [`SpatialIndex`] always describe the same set
//! of live agents, and each agent's indexed position equals its record's
//! `last_location` whenever the lock is free. Every method acquires the
//! lock through a scoped guard, so it is released on every exit path,
//! including early error returns.
//!
//! # Lock modes
//!
//! | Operation | Mode |
//! |-----------|------|
//! | [`get`](AgentStore::get), [`contains`](AgentStore::contains), [`len`](AgentStore::len), [`history`](AgentStore::history) | shared |
//! | [`nearest`](AgentStore::nearest), [`nearest_within`](AgentStore::nearest_within) | shared |
//! | [`upsert`](AgentStore::upsert), [`delete`](AgentStore::delete), [`sweep_expired`](AgentStore::sweep_expired) | exclusive |
//!
//! Neighbour queries only need `&SpatialIndex`: the tree has no interior
//! mutability, so concurrent traversals cannot race each other or a writer.
//!
//! Per-agent [`HistoryCache`] instances are only reachable through the
//! guard and are never handed out.
//!
//! The store performs no I/O and no logging; callers decide what to report.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use dispatch_types::{AgentId, Location};
use parking_lot::RwLock;

use crate::config::{DEFAULT_HISTORY_CAPACITY, StoreConfig};
use crate::error::StoreError;
use crate::history::HistoryCache;
use crate::spatial::{Neighbor, SpatialIndex};

/// Whether an expiry deadline has passed at `now`.
///
/// `None` and `Some(0)` never expire. A deadline equal to `now` counts as
/// expired.
pub const fn is_expired(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(deadline) => deadline != 0 && deadline <= now,
        None => false,
    }
}

/// Identity and mutable state for one tracked agent.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    /// Caller-assigned identity.
    pub id: AgentId,
    /// Most recent reported position.
    pub last_location: Location,
    /// Absolute expiry (Unix seconds); `None` or `0` never expires.
    pub expires_at: Option<i64>,
    /// Recent positions keyed by observation timestamp. Created with the
    /// record and never replaced.
    history: HistoryCache<i64, Location>,
}

impl AgentRecord {
    /// Whether this record is due for eviction at `now`.
    ///
    /// Same boundary as [`AgentStore::sweep_expired`]: a deadline equal to
    /// `now` is already expired.
    pub const fn expired(&self, now: i64) -> bool {
        is_expired(self.expires_at, now)
    }

    /// Read-only view of this agent's position history.
    pub const fn history(&self) -> &HistoryCache<i64, Location> {
        &self.history
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            last_location: self.last_location,
            expires_at: self.expires_at,
            history_len: self.history.len(),
        }
    }
}

/// Point-in-time copy of an [`AgentRecord`], safe to hold after the lock
/// is released.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSnapshot {
    /// Caller-assigned identity.
    pub id: AgentId,
    /// Most recent reported position.
    pub last_location: Location,
    /// Absolute expiry (Unix seconds), if any.
    pub expires_at: Option<i64>,
    /// Number of positions currently remembered.
    pub history_len: usize,
}

/// Outcome of [`AgentStore::sweep_expired`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Agents removed by this sweep.
    pub removed: Vec<AgentId>,
    /// Per-agent failures; the sweep carried on past each one.
    pub failures: Vec<StoreError>,
}

impl SweepReport {
    /// Whether every due agent was removed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
struct StoreState {
    agents: HashMap<AgentId, AgentRecord>,
    index: SpatialIndex,
}

/// Thread-safe store of live agent positions.
#[derive(Debug)]
pub struct AgentStore {
    state: RwLock<StoreState>,
    history_capacity: usize,
}

impl Default for AgentStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(StoreState {
                agents: HashMap::new(),
                index: SpatialIndex::default(),
            }),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl AgentStore {
    /// Create an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCapacity`] or
    /// [`StoreError::InvalidFanout`] if `config` is not constructible.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let index = SpatialIndex::new(config.min_children, config.max_children)?;
        Ok(Self {
            state: RwLock::new(StoreState {
                agents: HashMap::new(),
                index,
            }),
            history_capacity: config.history_capacity,
        })
    }

    /// Record a position report for `id`.
    ///
    /// An unseen agent gets a new record, history, and index entry. A known
    /// agent has its old index entry deleted and a new one inserted at
    /// `location`, the observation appended to its history under
    /// `observed_at`, and its expiry overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLocation`] if `location` has a NaN or
    /// infinite coordinate, or [`StoreError::RemovalFailed`] if the agent's
    /// previous index entry cannot be found. Either way nothing changes.
    pub fn upsert(
        &self,
        id: AgentId,
        location: Location,
        observed_at: i64,
        expires_at: Option<i64>,
    ) -> Result<(), StoreError> {
        if !location.is_finite() {
            return Err(StoreError::InvalidLocation(id));
        }
        let mut guard = self.state.write();
        let StoreState { agents, index } = &mut *guard;

        match agents.entry(id) {
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if !index.delete(id, &record.last_location) {
                    return Err(StoreError::RemovalFailed(id));
                }
                index.insert(id, location);
                record.last_location = location;
                record.expires_at = expires_at;
                record.history.put(observed_at, location);
            }
            Entry::Vacant(slot) => {
                let mut history = HistoryCache::new(self.history_capacity)?;
                history.put(observed_at, location);
                index.insert(id, location);
                slot.insert(AgentRecord {
                    id,
                    last_location: location,
                    expires_at,
                    history,
                });
            }
        }
        Ok(())
    }

    /// Look up a live agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is not live.
    pub fn get(&self, id: AgentId) -> Result<AgentSnapshot, StoreError> {
        self.state
            .read()
            .agents
            .get(&id)
            .map(AgentRecord::snapshot)
            .ok_or(StoreError::NotFound(id))
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: AgentId) -> bool {
        self.state.read().agents.contains_key(&id)
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.state.read().agents.len()
    }

    /// Whether no agents are live.
    pub fn is_empty(&self) -> bool {
        self.state.read().agents.is_empty()
    }

    /// Recorded `(timestamp, location)` pairs for `id`, least recently
    /// used first. Does not disturb recency.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is not live.
    pub fn history(&self, id: AgentId) -> Result<Vec<(i64, Location)>, StoreError> {
        let guard = self.state.read();
        let record = guard.agents.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(record.history.iter().map(|(ts, loc)| (*ts, *loc)).collect())
    }

    /// Remove a live agent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is not live, or
    /// [`StoreError::RemovalFailed`] if its index entry is missing (the
    /// record is then kept so the inconsistency stays visible).
    pub fn delete(&self, id: AgentId) -> Result<(), StoreError> {
        let mut guard = self.state.write();
        remove_live(&mut guard, id).map(drop)
    }

    /// Up to `k` live agents ordered by ascending planar distance from
    /// `point`. Empty when no agents are live.
    pub fn nearest(&self, point: &Location, k: usize) -> Vec<Neighbor> {
        self.state.read().index.nearest(point, k)
    }

    /// Like [`nearest`](Self::nearest), restricted to agents within
    /// `max_distance` degrees of `point`.
    pub fn nearest_within(&self, point: &Location, k: usize, max_distance: f64) -> Vec<Neighbor> {
        self.state
            .read()
            .index
            .nearest_within(point, k, max_distance)
    }

    /// Remove every agent whose expiry has passed at `now`.
    ///
    /// Failures are collected per agent and do not stop the sweep.
    pub fn sweep_expired(&self, now: i64) -> SweepReport {
        let mut guard = self.state.write();
        let due: Vec<AgentId> = guard
            .agents
            .values()
            .filter(|record| record.expired(now))
            .map(|record| record.id)
            .collect();

        let mut report = SweepReport::default();
        for id in due {
            match remove_live(&mut guard, id) {
                Ok(_) => report.removed.push(id),
                Err(e) => report.failures.push(e),
            }
        }
        report
    }
}

/// Remove `id` from the index and then the identity map.
fn remove_live(state: &mut StoreState, id: AgentId) -> Result<AgentRecord, StoreError> {
    let location = state
        .agents
        .get(&id)
        .map(|record| record.last_location)
        .ok_or(StoreError::NotFound(id))?;
    if !state.index.delete(id, &location) {
        return Err(StoreError::RemovalFailed(id));
    }
    state.agents.remove(&id).ok_or(StoreError::NotFound(id))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

    use super::*;

    fn small_store(history_capacity: usize) -> AgentStore {
        AgentStore::new(&StoreConfig {
            history_capacity,
            min_children: 2,
            max_children: 4,
        })
        .unwrap()
    }

    /// Every record is indexed exactly at its last location.
    fn assert_consistent(store: &AgentStore) {
        let guard = store.state.read();
        assert_eq!(guard.index.len(), guard.agents.len());
        for record in guard.agents.values() {
            let here = guard
                .index
                .nearest_within(&record.last_location, guard.agents.len(), 0.0);
            assert!(
                here.iter().any(|n| n.id == record.id),
                "agent {} not indexed at its last location",
                record.id
            );
        }
    }

    /// Drop an agent's index entry behind the store's back.
    fn corrupt_index(store: &AgentStore, id: AgentId) {
        let mut guard = store.state.write();
        let location = guard.agents[&id].last_location;
        assert!(guard.index.delete(id, &location));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let zero = StoreConfig {
            history_capacity: 0,
            ..StoreConfig::default()
        };
        assert_eq!(
            AgentStore::new(&zero).err(),
            Some(StoreError::InvalidCapacity(0))
        );
    }

    #[test]
    fn upsert_then_get_returns_latest_location() {
        let store = AgentStore::default();
        let first = Location::new(1.0, 1.0);
        let second = Location::new(2.0, 2.0);

        store.upsert(AgentId(1), first, 100, None).unwrap();
        assert_eq!(store.get(AgentId(1)).unwrap().last_location, first);

        store.upsert(AgentId(1), second, 101, Some(500)).unwrap();
        let snap = store.get(AgentId(1)).unwrap();
        assert_eq!(snap.last_location, second);
        assert_eq!(snap.expires_at, Some(500));
        assert_eq!(snap.history_len, 2);
        assert_eq!(store.len(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn moved_agent_no_longer_found_at_old_position() {
        let store = AgentStore::default();
        let old = Location::new(10.0, 10.0);
        store.upsert(AgentId(1), old, 1, None).unwrap();
        store.upsert(AgentId(2), Location::new(10.001, 10.0), 1, None).unwrap();
        store.upsert(AgentId(1), Location::new(50.0, 50.0), 2, None).unwrap();

        let near_old = store.nearest(&old, 1);
        assert_eq!(near_old[0].id, AgentId(2));
        assert!(store.nearest_within(&old, 10, 0.01).iter().all(|n| n.id != AgentId(1)));
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let store = AgentStore::default();
        store.upsert(AgentId(3), Location::new(0.0, 0.0), 1, None).unwrap();

        store.delete(AgentId(3)).unwrap();
        assert_eq!(store.get(AgentId(3)), Err(StoreError::NotFound(AgentId(3))));
        assert_eq!(store.delete(AgentId(3)), Err(StoreError::NotFound(AgentId(3))));
        assert!(store.is_empty());
        assert!(store.nearest(&Location::new(0.0, 0.0), 5).is_empty());
    }

    #[test]
    fn history_is_bounded_and_keyed_by_timestamp() {
        let store = AgentStore::new(&StoreConfig {
            history_capacity: 3,
            ..StoreConfig::default()
        })
        .unwrap();
        for ts in 0..5_i64 {
            store
                .upsert(AgentId(9), Location::new(ts as f64, 0.0), ts, None)
                .unwrap();
        }
        let history = store.history(AgentId(9)).unwrap();
        let stamps: Vec<i64> = history.iter().map(|(ts, _)| *ts).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
        assert_eq!(history[2].1, Location::new(4.0, 0.0));
        assert_eq!(store.history(AgentId(10)), Err(StoreError::NotFound(AgentId(10))));
    }

    #[test]
    fn nearest_returns_closest_three_in_order() {
        let store = AgentStore::default();
        let points = [
            (1, 42.875_799, 74.588_279),
            (2, 42.875_508, 74.588_107),
            (3, 42.876_106, 74.588_204),
            (4, 42.874_942, 74.585_908),
            (5, 42.875_744, 74.584_503),
        ];
        for (id, lat, lon) in points {
            store
                .upsert(AgentId(id), Location::new(lat, lon), 1, None)
                .unwrap();
        }

        let found = store.nearest(&Location::new(42.876_420, 74.588_332), 3);
        let ids: Vec<AgentId> = found.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![AgentId(3), AgentId(1), AgentId(2)]);
        assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));

        assert_eq!(store.nearest(&Location::new(0.0, 0.0), 10).len(), 5);
    }

    #[test]
    fn expiry_predicate() {
        assert!(is_expired(Some(100), 200));
        assert!(is_expired(Some(100), 100));
        assert!(!is_expired(Some(300), 200));
        assert!(!is_expired(Some(0), 200));
        assert!(!is_expired(None, i64::MAX));
    }

    #[test]
    fn sweep_removes_only_due_agents() {
        let store = AgentStore::default();
        let now = 1_000;
        store.upsert(AgentId(1), Location::new(1.0, 1.0), 1, Some(now - 10)).unwrap();
        store.upsert(AgentId(2), Location::new(2.0, 2.0), 1, Some(now + 10)).unwrap();
        store.upsert(AgentId(3), Location::new(3.0, 3.0), 1, None).unwrap();
        store.upsert(AgentId(4), Location::new(4.0, 4.0), 1, Some(0)).unwrap();
        store.upsert(AgentId(5), Location::new(5.0, 5.0), 1, Some(now)).unwrap();

        assert!(store.get(AgentId(1)).is_ok());
        let report = store.sweep_expired(now);

        assert!(report.is_clean());
        let removed: BTreeSet<AgentId> = report.removed.into_iter().collect();
        assert_eq!(removed, BTreeSet::from([AgentId(1), AgentId(5)]));
        assert_eq!(store.get(AgentId(1)), Err(StoreError::NotFound(AgentId(1))));
        for live in [2, 3, 4] {
            assert!(store.contains(AgentId(live)));
        }
        assert_consistent(&store);
    }

    #[test]
    fn non_finite_location_is_rejected_without_side_effects() {
        let store = small_store(4);
        assert_eq!(
            store.upsert(AgentId(1), Location::new(f64::NAN, 0.0), 1, Some(5)),
            Err(StoreError::InvalidLocation(AgentId(1)))
        );
        assert!(!store.contains(AgentId(1)));
        assert!(store.is_empty());

        store.upsert(AgentId(1), Location::new(1.0, 0.0), 1, Some(5)).unwrap();
        assert_eq!(
            store.upsert(AgentId(1), Location::new(2.0, f64::INFINITY), 2, Some(9)),
            Err(StoreError::InvalidLocation(AgentId(1)))
        );
        let snap = store.get(AgentId(1)).unwrap();
        assert_eq!(snap.last_location, Location::new(1.0, 0.0));
        assert_eq!(snap.expires_at, Some(5));
        assert_eq!(snap.history_len, 1);

        store.upsert(AgentId(1), Location::new(3.0, 0.0), 3, Some(5)).unwrap();
        let report = store.sweep_expired(100);
        assert_eq!(report.removed, vec![AgentId(1)]);
        assert!(report.is_clean());
        assert_consistent(&store);
    }

    #[test]
    fn index_mismatch_is_reported_not_swallowed() {
        let store = small_store(4);
        store.upsert(AgentId(1), Location::new(1.0, 1.0), 1, Some(5)).unwrap();
        store.upsert(AgentId(2), Location::new(2.0, 2.0), 1, Some(5)).unwrap();
        corrupt_index(&store, AgentId(1));

        assert_eq!(store.delete(AgentId(1)), Err(StoreError::RemovalFailed(AgentId(1))));
        assert!(store.contains(AgentId(1)));
        assert_eq!(
            store.upsert(AgentId(1), Location::new(9.0, 9.0), 2, None),
            Err(StoreError::RemovalFailed(AgentId(1)))
        );

        let report = store.sweep_expired(10);
        assert_eq!(report.removed, vec![AgentId(2)]);
        assert_eq!(report.failures, vec![StoreError::RemovalFailed(AgentId(1))]);
        assert!(!report.is_clean());
    }

    #[test]
    fn concurrent_sweeps_race_with_writers() {
        let store = Arc::new(small_store(8));
        let writers = 4_i64;
        let per_writer = 50_i64;
        let rounds = 20_i64;
        let swept_any = AtomicBool::new(false);
        let writers_done = AtomicUsize::new(0);
        let removed_total = AtomicUsize::new(0);
        let writer_count = usize::try_from(writers).unwrap();

        std::thread::scope(|scope| {
            for w in 0..writers {
                let store = Arc::clone(&store);
                let (swept_any, writers_done) = (&swept_any, &writers_done);
                scope.spawn(move || {
                    for round in 0..rounds {
                        let last = round == rounds - 1;
                        if last {
                            // The last pass never expires; wait for a sweep to evict first.
                            while !swept_any.load(AtomicOrdering::Acquire) {
                                std::thread::yield_now();
                            }
                        }
                        let expires_at = if last { None } else { Some(round + 1) };
                        for i in 0..per_writer {
                            let id = AgentId(w * per_writer + i);
                            let loc = Location::new((i + round) as f64, w as f64);
                            store.upsert(id, loc, round, expires_at).unwrap();
                        }
                    }
                    writers_done.fetch_add(1, AtomicOrdering::Release);
                });
            }
            for _ in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for step in 0..200_i64 {
                        let found = store.nearest(&Location::new(step as f64 % 50.0, 1.0), 5);
                        assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
                        let _ = store.get(AgentId(step % 200));
                    }
                });
            }
            let sweeper = Arc::clone(&store);
            let (swept_any, writers_done, removed_total) =
                (&swept_any, &writers_done, &removed_total);
            scope.spawn(move || {
                let mut now = 0_i64;
                while writers_done.load(AtomicOrdering::Acquire) < writer_count {
                    now += 1;
                    let report = sweeper.sweep_expired(now);
                    assert!(report.is_clean(), "{report:?}");
                    for id in &report.removed {
                        assert!((0..writers * per_writer).contains(&id.into_inner()));
                    }
                    if !report.removed.is_empty() {
                        removed_total.fetch_add(report.removed.len(), AtomicOrdering::Relaxed);
                        swept_any.store(true, AtomicOrdering::Release);
                    }
                }
            });
        });

        assert!(removed_total.load(AtomicOrdering::Relaxed) > 0);
        assert_eq!(store.len(), usize::try_from(writers * per_writer).unwrap());
        assert_consistent(&store);
        for w in 0..writers {
            for i in 0..per_writer {
                let snap = store.get(AgentId(w * per_writer + i)).unwrap();
                assert_eq!(
                    snap.last_location,
                    Location::new((i + rounds - 1) as f64, w as f64)
                );
                assert_eq!(snap.expires_at, None);
            }
        }

        assert!(store.sweep_expired(i64::MAX).removed.is_empty());
        for id in 0..writers * per_writer {
            store.delete(AgentId(id)).unwrap();
        }
        assert!(store.is_empty());
        assert_consistent(&store);
    }
}
