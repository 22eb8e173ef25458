//! Cached in-game state of the lots processors are tied to
//!
//! Fetches are best-effort. A failed fetch is logged and the cache keeps
//! whatever it knew before; plan operations never wait on it.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PlannerError, Result};
use crate::models::{LotLocation, ProcessId};
use crate::plan::IndustryPlan;

pub const DEFAULT_FRESHNESS_SECS: u64 = 3600;

/// What is currently on a lot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LotState {
    /// Building type name, if anything is built
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub running_process: Option<ProcessId>,
}

/// Remote service answering lot queries
pub trait LocationSource {
    fn fetch_lots(&self, lots: &[LotLocation]) -> Result<Vec<(LotLocation, LotState)>>;
}

#[derive(Debug, Clone)]
struct CachedLot {
    state: LotState,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub requested: usize,
    pub fetched: usize,
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct LocationCache {
    lots: HashMap<LotLocation, CachedLot>,
    freshness: Duration,
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_SECS)
    }
}

impl LocationCache {
    pub fn new(freshness_secs: u64) -> Self {
        LocationCache {
            lots: HashMap::new(),
            freshness: Duration::seconds(i64::try_from(freshness_secs).unwrap_or(i64::MAX)),
        }
    }

    pub fn get(&self, lot: &LotLocation) -> Option<&LotState> {
        self.lots.get(lot).map(|c| &c.state)
    }

    pub fn fetched_at(&self, lot: &LotLocation) -> Option<DateTime<Utc>> {
        self.lots.get(lot).map(|c| c.fetched_at)
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn is_fresh(&self, lot: &LotLocation, now: DateTime<Utc>) -> bool {
        self.lots
            .get(lot)
            .is_some_and(|c| now.signed_duration_since(c.fetched_at) < self.freshness)
    }

    /// Lots from `wanted` that are missing or older than the freshness window
    pub fn stale_lots(&self, wanted: &[LotLocation], now: DateTime<Utc>) -> Vec<LotLocation> {
        wanted
            .iter()
            .filter(|lot| !self.is_fresh(lot, now))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fetch the stale subset of `wanted` from `source`
    pub fn refresh(
        &mut self,
        source: &dyn LocationSource,
        wanted: &[LotLocation],
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        let stale = self.stale_lots(wanted, now);
        let mut outcome = SyncOutcome {
            requested: stale.len(),
            ..Default::default()
        };
        if stale.is_empty() {
            debug!("all {} lots fresh, skipping fetch", wanted.len());
            return outcome;
        }

        match source.fetch_lots(&stale) {
            Ok(results) => {
                for (lot, state) in results {
                    self.lots.insert(lot, CachedLot { state, fetched_at: now });
                    outcome.fetched += 1;
                }
                debug!(fetched = outcome.fetched, requested = outcome.requested, "lot states updated");
            }
            Err(e) => {
                warn!("lot fetch failed, keeping cached state: {e}");
                outcome.failed = true;
            }
        }
        outcome
    }
}

/// Locations of every processor in the plan that has one
pub fn plan_locations(plan: &IndustryPlan) -> Vec<LotLocation> {
    plan.processors()
        .filter_map(|(_, processor)| processor.location)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Deserialize)]
struct LotRecord {
    asteroid_id: u64,
    lot_index: u64,
    #[serde(flatten)]
    state: LotState,
}

/// Reads lot states from a JSON array exported from the game
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonFileSource {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl LocationSource for JsonFileSource {
    fn fetch_lots(&self, lots: &[LotLocation]) -> Result<Vec<(LotLocation, LotState)>> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            PlannerError::ExternalServiceFailure(format!("reading {}: {e}", self.path.display()))
        })?;
        let records: Vec<LotRecord> = serde_json::from_str(&text).map_err(|e| {
            PlannerError::ExternalServiceFailure(format!("parsing {}: {e}", self.path.display()))
        })?;

        let wanted: BTreeSet<_> = lots.iter().copied().collect();
        Ok(records
            .into_iter()
            .map(|r| {
                let lot = LotLocation {
                    asteroid_id: r.asteroid_id,
                    lot_index: r.lot_index,
                };
                (lot, r.state)
            })
            .filter(|(lot, _)| wanted.contains(lot))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeSource {
        calls: Cell<usize>,
        last: RefCell<Vec<LotLocation>>,
        fail: bool,
    }

    impl FakeSource {
        fn new(fail: bool) -> Self {
            FakeSource {
                calls: Cell::new(0),
                last: RefCell::new(Vec::new()),
                fail,
            }
        }
    }

    impl LocationSource for FakeSource {
        fn fetch_lots(&self, lots: &[LotLocation]) -> Result<Vec<(LotLocation, LotState)>> {
            self.calls.set(self.calls.get() + 1);
            *self.last.borrow_mut() = lots.to_vec();
            if self.fail {
                return Err(PlannerError::ExternalServiceFailure("offline".into()));
            }
            Ok(lots
                .iter()
                .map(|&lot| {
                    let state = LotState {
                        building: Some("Refinery".into()),
                        ..Default::default()
                    };
                    (lot, state)
                })
                .collect())
        }
    }

    fn lot(a: u64, l: u64) -> LotLocation {
        LotLocation {
            asteroid_id: a,
            lot_index: l,
        }
    }

    #[test]
    fn only_stale_lots_are_fetched() {
        let mut cache = LocationCache::default();
        let source = FakeSource::new(false);
        let t0 = Utc::now();

        let first = cache.refresh(&source, &[lot(1, 1), lot(1, 2)], t0);
        assert_eq!(first.fetched, 2);

        let later = t0 + Duration::minutes(30);
        let second = cache.refresh(&source, &[lot(1, 1), lot(1, 3)], later);
        assert_eq!(second.requested, 1);
        assert_eq!(*source.last.borrow(), vec![lot(1, 3)]);

        // Only the lot fetched at t0 has aged past the window
        let expired = t0 + Duration::minutes(75);
        assert_eq!(cache.stale_lots(&[lot(1, 1), lot(1, 3)], expired), vec![lot(1, 1)]);
        let both = t0 + Duration::hours(2);
        assert_eq!(cache.stale_lots(&[lot(1, 1), lot(1, 3)], both), vec![lot(1, 1), lot(1, 3)]);
    }

    #[test]
    fn failure_keeps_prior_state() {
        let mut cache = LocationCache::new(60);
        let t0 = Utc::now();
        cache.refresh(&FakeSource::new(false), &[lot(7, 4)], t0);

        let outcome = cache.refresh(&FakeSource::new(true), &[lot(7, 4)], t0 + Duration::hours(1));
        assert!(outcome.failed);
        assert_eq!(cache.get(&lot(7, 4)).unwrap().building.as_deref(), Some("Refinery"));
        assert_eq!(cache.fetched_at(&lot(7, 4)), Some(t0));
    }

    #[test]
    fn fresh_cache_skips_source() {
        let mut cache = LocationCache::default();
        let source = FakeSource::new(false);
        let t0 = Utc::now();
        cache.refresh(&source, &[lot(2, 2)], t0);
        let outcome = cache.refresh(&source, &[lot(2, 2)], t0 + Duration::seconds(10));
        assert_eq!(outcome, SyncOutcome::default());
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn json_source_filters_requested_lots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lots.json");
        fs::write(
            &path,
            r#"[
                {"asteroid_id": 1, "lot_index": 5, "building": "Factory", "running_process": 30},
                {"asteroid_id": 1, "lot_index": 6, "building": "Refinery"}
            ]"#,
        )
        .unwrap();

        let source = JsonFileSource::new(&path);
        let lots = source.fetch_lots(&[lot(1, 5)]).unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].1.running_process, Some(ProcessId(30)));

        let missing = JsonFileSource::new(dir.path().join("absent.json"));
        assert!(matches!(
            missing.fetch_lots(&[lot(1, 5)]),
            Err(PlannerError::ExternalServiceFailure(_))
        ));
    }
}
