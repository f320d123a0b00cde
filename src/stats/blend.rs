//! Pure statistics blending.
//!
//! Everything here is a function of its arguments: the caller supplies the
//! clock reading, so every replica computing stats for the same second
//! produces the same numbers without coordinating.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::StatsMode;

/// Seconds the client should wait before polling `/stats` again.
pub const NEXT_REFRESH_SECONDS: u32 = 60;

/// Real votes at which the display is fully driven by real data.
pub const FULL_CONFIDENCE_VOTES: f64 = 200.0;

/// Bounds for the synthetic split so the atmosphere never looks one-sided.
pub const ATMOSPHERE_SPLIT_MIN: i64 = 40;
/// Upper bound for the synthetic split.
pub const ATMOSPHERE_SPLIT_MAX: i64 = 60;

/// Per-case tuning for the synthetic "atmosphere" numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSeed {
    /// Participant count the atmosphere oscillates around.
    pub base_participants: i64,
    /// Centre of the synthetic A split (0-100).
    pub base_split_a: i64,
    /// Amplitude multiplier for the split drift.
    pub drift_per_min: f64,
}

impl Default for StatsSeed {
    fn default() -> Self {
        Self {
            base_participants: 5000,
            base_split_a: 50,
            drift_per_min: 1.0,
        }
    }
}

/// Current (non-historical) vote counts for one case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealTally {
    pub count_a: i64,
    pub count_b: i64,
}

impl RealTally {
    /// Create a tally from raw counts.
    pub fn new(count_a: i64, count_b: i64) -> Self {
        Self { count_a, count_b }
    }

    /// Total votes cast.
    pub fn total(&self) -> i64 {
        self.count_a + self.count_b
    }
}

/// A split/participant pair before blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub participants: i64,
    pub split_a: i64,
}

/// Statistics shown to visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedStats {
    pub participants: i64,
    pub split_a: i64,
    pub split_b: i64,
    pub next_refresh_seconds: u32,
}

/// Round half toward positive infinity.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Synthetic numbers for the given instant.
pub fn atmosphere(seed: &StatsSeed, now: DateTime<Utc>) -> Component {
    let minute_of_day = f64::from(now.hour() * 60 + now.minute());
    let second = f64::from(now.second());

    let drift = (minute_of_day * 0.05).sin() * seed.drift_per_min * 3.0;
    let split_a = round_half_up(seed.base_split_a as f64 + drift)
        .clamp(ATMOSPHERE_SPLIT_MIN, ATMOSPHERE_SPLIT_MAX);

    let jitter = ((minute_of_day * 0.1).sin() * 500.0 + (second * 0.3).cos() * 200.0).floor() as i64;
    let participants = seed.base_participants.saturating_add(jitter).max(0);

    Component {
        participants,
        split_a,
    }
}

/// Numbers derived from the real tally alone.
pub fn real(tally: &RealTally) -> Component {
    let total = tally.total();
    let split_a = if total > 0 {
        round_half_up(tally.count_a as f64 / total as f64 * 100.0)
    } else {
        50
    };

    Component {
        participants: total,
        split_a,
    }
}

/// Confidence placed in the real tally for a given mode.
pub fn confidence_weight(mode: StatsMode, tally: &RealTally) -> f64 {
    match mode {
        StatsMode::Atmosphere => 0.0,
        StatsMode::Real => 1.0,
        StatsMode::Hybrid => (tally.total() as f64 / FULL_CONFIDENCE_VOTES).min(1.0),
    }
}

/// Compute the displayed statistics for one case.
pub fn compute_stats(
    seed: &StatsSeed,
    now: DateTime<Utc>,
    tally: &RealTally,
    mode: StatsMode,
) -> DisplayedStats {
    let synthetic = atmosphere(seed, now);
    let observed = real(tally);
    let w = confidence_weight(mode, tally);

    let split_a = round_half_up((1.0 - w) * synthetic.split_a as f64 + w * observed.split_a as f64)
        .clamp(0, 100);
    let participants = round_half_up(
        (1.0 - w) * synthetic.participants as f64 + w * observed.participants as f64,
    );

    DisplayedStats {
        participants,
        split_a,
        split_b: 100 - split_a,
        next_refresh_seconds: NEXT_REFRESH_SECONDS,
    }
}
