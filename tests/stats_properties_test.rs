//! Property checks for the stats blender.
//!
//! Sweeps seeds, instants, tallies, and modes rather than spot values.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use aios_tribunal::stats::blend::{atmosphere, real};
use aios_tribunal::stats::{compute_stats, RealTally, StatsMode, StatsSeed};

const MODES: [StatsMode; 3] = [StatsMode::Atmosphere, StatsMode::Real, StatsMode::Hybrid];

fn day_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

fn seeds() -> Vec<StatsSeed> {
    let mut seeds = vec![StatsSeed::default()];
    for base_split_a in [0, 12, 40, 50, 61, 100] {
        for drift_per_min in [0.0, 1.0, 5.0, -3.5] {
            for base_participants in [0, 100, 5000] {
                seeds.push(StatsSeed {
                    base_participants,
                    base_split_a,
                    drift_per_min,
                });
            }
        }
    }
    seeds
}

fn tallies() -> Vec<RealTally> {
    vec![
        RealTally::new(0, 0),
        RealTally::new(1, 0),
        RealTally::new(0, 1),
        RealTally::new(30, 10),
        RealTally::new(1, 2),
        RealTally::new(150, 150),
        RealTally::new(999, 1),
    ]
}

#[test]
fn test_splits_always_sum_to_100_and_stay_in_range() {
    for seed in seeds() {
        for minute in (0..24 * 60).step_by(37) {
            let now = day_start() + Duration::minutes(minute) + Duration::seconds(minute % 60);
            for tally in tallies() {
                for mode in MODES {
                    let stats = compute_stats(&seed, now, &tally, mode);
                    assert_eq!(stats.split_a + stats.split_b, 100);
                    assert!((0..=100).contains(&stats.split_a), "{:?}", stats);
                    assert!(stats.participants >= 0, "{:?}", stats);
                    assert_eq!(stats.next_refresh_seconds, 60);
                }
            }
        }
    }
}

#[test]
fn test_atmosphere_split_stays_within_band() {
    for seed in seeds() {
        for minute in 0..24 * 60 {
            let now = day_start() + Duration::minutes(minute);
            let split_a = atmosphere(&seed, now).split_a;
            assert!((40..=60).contains(&split_a), "minute {} gave {}", minute, split_a);
        }
    }
}

#[test]
fn test_same_second_is_deterministic() {
    let seed = StatsSeed::default();
    let tally = RealTally::new(12, 7);
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 17, 42, 11).unwrap();
    let later_same_second = now + Duration::milliseconds(750);

    for mode in MODES {
        let first = compute_stats(&seed, now, &tally, mode);
        let second = compute_stats(&seed, later_same_second, &tally, mode);
        assert_eq!(first, second);
    }
}

#[test]
fn test_hybrid_converges_monotonically_to_real() {
    let seed = StatsSeed::default();
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 30).unwrap();
    let target = 75;

    let mut previous = atmosphere(&seed, now).split_a;
    assert!(previous < target);

    for k in 0..=80 {
        let tally = RealTally::new(3 * k, k);
        let split_a = compute_stats(&seed, now, &tally, StatsMode::Hybrid).split_a;

        assert!(split_a >= previous, "k={} went {} -> {}", k, previous, split_a);
        assert!(split_a <= target);
        if tally.total() >= 200 {
            assert_eq!(split_a, target);
        }
        previous = split_a;
    }
}

#[test]
fn test_hybrid_with_no_votes_equals_atmosphere() {
    let empty = RealTally::new(0, 0);
    for seed in seeds() {
        for minute in (0..24 * 60).step_by(53) {
            let now = day_start() + Duration::minutes(minute);
            assert_eq!(
                compute_stats(&seed, now, &empty, StatsMode::Hybrid),
                compute_stats(&seed, now, &empty, StatsMode::Atmosphere)
            );
        }
    }
}

#[test]
fn test_real_mode_ignores_seed() {
    let tally = RealTally::new(30, 10);
    let now = day_start() + Duration::hours(5);
    let expected = real(&tally);

    for seed in seeds() {
        let stats = compute_stats(&seed, now, &tally, StatsMode::Real);
        assert_eq!(stats.split_a, expected.split_a);
        assert_eq!(stats.participants, 40);
    }
}

#[test]
fn test_reference_scenario() {
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 30).unwrap();
    let seed = StatsSeed::default();
    let tally = RealTally::new(30, 10);

    let synthetic = atmosphere(&seed, now);
    assert_eq!(synthetic.split_a, 47);
    assert_eq!(synthetic.participants, 4944);
    assert_eq!(real(&tally).split_a, 75);

    let stats = compute_stats(&seed, now, &tally, StatsMode::Hybrid);
    assert_eq!(stats.split_a, 53);
    assert_eq!(stats.split_b, 47);
    assert_eq!(stats.participants, 3963);
}
