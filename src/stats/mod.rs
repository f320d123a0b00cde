//! Displayed vote statistics.
//!
//! The `/stats` endpoint shows a blend of synthetic "atmosphere" numbers and
//! the real tally. [`blend`] holds the pure math; [`StatsEngine`] wires it to
//! the seed store and vote ledger.

pub mod blend;

pub use blend::{compute_stats, DisplayedStats, RealTally, StatsSeed, NEXT_REFRESH_SECONDS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageResult;
use crate::storage::{SeedStore, VoteLedger};

/// How real votes are mixed into the displayed statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMode {
    /// Synthetic numbers only.
    Atmosphere,
    /// Real tally only.
    Real,
    /// Weighted by real sample size.
    #[default]
    Hybrid,
}

impl std::fmt::Display for StatsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsMode::Atmosphere => write!(f, "atmosphere"),
            StatsMode::Real => write!(f, "real"),
            StatsMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for StatsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "atmosphere" => Ok(StatsMode::Atmosphere),
            "real" => Ok(StatsMode::Real),
            "hybrid" => Ok(StatsMode::Hybrid),
            _ => Err(format!("Unknown stats mode: {}", s)),
        }
    }
}

/// Loads seed and tally for a case and blends them.
#[derive(Clone)]
pub struct StatsEngine<S> {
    storage: S,
}

impl<S> StatsEngine<S>
where
    S: SeedStore + VoteLedger,
{
    /// Create a new stats engine over the given storage
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Seed for a case, falling back to defaults when missing or unreadable.
    pub async fn seed_for(&self, case_id: &str) -> StatsSeed {
        match self.storage.get_seed(case_id).await {
            Ok(Some(seed)) => seed,
            Ok(None) => {
                debug!(case_id = %case_id, "No stats seed, using defaults");
                StatsSeed::default()
            }
            Err(e) => {
                warn!(case_id = %case_id, error = %e, "Stats seed lookup failed, using defaults");
                StatsSeed::default()
            }
        }
    }

    /// Compute the statistics for a case at `now`.
    ///
    /// A failing tally query is returned to the caller; a failing seed query
    /// is not.
    pub async fn snapshot(
        &self,
        case_id: &str,
        mode: StatsMode,
        now: DateTime<Utc>,
    ) -> StorageResult<DisplayedStats> {
        let seed = self.seed_for(case_id).await;
        let tally = self.storage.tally(case_id).await?;

        let stats = compute_stats(&seed, now, &tally, mode);

        debug!(
            case_id = %case_id,
            mode = %mode,
            real_total = tally.total(),
            split_a = stats.split_a,
            participants = stats.participants,
            "Computed stats"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::{Choice, MockSeedStore, MockVoteLedger};
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// Pairs two mocks so the engine sees one storage handle.
    struct Pair {
        seeds: MockSeedStore,
        ledger: MockVoteLedger,
    }

    #[async_trait]
    impl SeedStore for Pair {
        async fn get_seed(&self, case_id: &str) -> StorageResult<Option<StatsSeed>> {
            self.seeds.get_seed(case_id).await
        }
        async fn upsert_seed(&self, case_id: &str, seed: &StatsSeed) -> StorageResult<()> {
            self.seeds.upsert_seed(case_id, seed).await
        }
    }

    #[async_trait]
    impl VoteLedger for Pair {
        async fn record_vote(
            &self,
            visitor_id: &str,
            case_id: &str,
            choice: Choice,
        ) -> StorageResult<()> {
            self.ledger.record_vote(visitor_id, case_id, choice).await
        }
        async fn tally(&self, case_id: &str) -> StorageResult<RealTally> {
            self.ledger.tally(case_id).await
        }
        async fn record_completion(&self, visitor_id: &str, case_id: &str) -> StorageResult<()> {
            self.ledger.record_completion(visitor_id, case_id).await
        }
        async fn count_completions(&self, visitor_id: &str) -> StorageResult<i64> {
            self.ledger.count_completions(visitor_id).await
        }
        async fn visitor_choices(&self, visitor_id: &str) -> StorageResult<Vec<(String, Choice)>> {
            self.ledger.visitor_choices(visitor_id).await
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 30).unwrap()
    }

    #[test]
    fn test_stats_mode_parse() {
        assert_eq!("atmosphere".parse::<StatsMode>().unwrap(), StatsMode::Atmosphere);
        assert_eq!("REAL".parse::<StatsMode>().unwrap(), StatsMode::Real);
        assert_eq!("hybrid".parse::<StatsMode>().unwrap(), StatsMode::Hybrid);
        assert!("blended".parse::<StatsMode>().is_err());
    }

    #[test]
    fn test_stats_mode_display_roundtrip() {
        for mode in [StatsMode::Atmosphere, StatsMode::Real, StatsMode::Hybrid] {
            assert_eq!(mode.to_string().parse::<StatsMode>().unwrap(), mode);
        }
    }

    #[tokio::test]
    async fn test_seed_query_failure_falls_back_to_defaults() {
        let mut seeds = MockSeedStore::new();
        seeds.expect_get_seed().returning(|_| {
            Err(StorageError::Query {
                message: "no such table: case_stats_seed".to_string(),
            })
        });
        let mut ledger = MockVoteLedger::new();
        ledger
            .expect_tally()
            .returning(|_| Ok(RealTally::new(30, 10)));

        let engine = StatsEngine::new(Pair { seeds, ledger });
        let stats = engine
            .snapshot("case-1", StatsMode::Hybrid, noon())
            .await
            .unwrap();

        assert_eq!(stats.split_a, 53);
        assert_eq!(stats.participants, 3963);
    }

    #[tokio::test]
    async fn test_tally_failure_is_surfaced() {
        let mut seeds = MockSeedStore::new();
        seeds.expect_get_seed().returning(|_| Ok(None));
        let mut ledger = MockVoteLedger::new();
        ledger.expect_tally().returning(|_| {
            Err(StorageError::Query {
                message: "database is locked".to_string(),
            })
        });

        let engine = StatsEngine::new(Pair { seeds, ledger });
        let result = engine.snapshot("case-1", StatsMode::Hybrid, noon()).await;

        assert!(matches!(result, Err(StorageError::Query { .. })));
    }

    #[tokio::test]
    async fn test_stored_seed_is_used() {
        let mut seeds = MockSeedStore::new();
        seeds.expect_get_seed().returning(|_| {
            Ok(Some(StatsSeed {
                base_participants: 100,
                base_split_a: 50,
                drift_per_min: 0.0,
            }))
        });
        let mut ledger = MockVoteLedger::new();
        ledger.expect_tally().returning(|_| Ok(RealTally::default()));

        let engine = StatsEngine::new(Pair { seeds, ledger });
        let stats = engine
            .snapshot("case-1", StatsMode::Atmosphere, noon())
            .await
            .unwrap();

        assert_eq!(stats.split_a, 50);
        assert_eq!(stats.participants, 44);
    }
}
