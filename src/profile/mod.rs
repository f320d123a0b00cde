//! Visitor profiles: visit streaks, role unlocks, and majority agreement.
//!
//! Every number on a profile is recomputed from the ledgers whenever it is
//! touched, so retries and concurrent requests converge on the same values.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::StorageResult;
use crate::stats::RealTally;
use crate::storage::{Choice, Profile, ProfileStore, ReactionLedger, Role, VoteLedger};

/// Trials needed before JUROR can unlock.
pub const JUROR_MIN_TRIALS: i64 = 3;
/// Testimonies needed before JUROR can unlock.
pub const JUROR_MIN_TESTIMONIES: i64 = 1;
/// Trials needed for CLERK, on top of JUROR.
pub const CLERK_MIN_TRIALS: i64 = 7;

/// Consecutive visit days ending on `today`.
///
/// `visits` must be newest first. Dates after `today` are ignored and
/// duplicates are tolerated.
pub fn streak(visits: &[NaiveDate], today: NaiveDate) -> i64 {
    let mut expected = today;
    let mut count = 0;

    for &date in visits {
        if date > expected {
            continue;
        }
        if date != expected {
            break;
        }
        count += 1;
        expected = date - Duration::days(1);
    }

    count
}

/// Which roles a visitor has unlocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleUnlocks {
    pub juror: bool,
    pub clerk: bool,
}

impl RoleUnlocks {
    /// Evaluate unlock thresholds.
    pub fn evaluate(trials_completed: i64, testimonies_given: i64) -> Self {
        let juror =
            trials_completed >= JUROR_MIN_TRIALS && testimonies_given >= JUROR_MIN_TESTIMONIES;
        let clerk = juror && trials_completed >= CLERK_MIN_TRIALS;
        Self { juror, clerk }
    }

    /// Highest unlocked role.
    pub fn role(&self) -> Role {
        match (self.juror, self.clerk) {
            (_, true) => Role::Clerk,
            (true, false) => Role::Juror,
            _ => Role::Witness,
        }
    }
}

/// Percentage of choices that sit with the current real majority.
///
/// A tied case counts as agreement. No votes yields 0.
pub fn majority_match_pct(choices: &[(Choice, RealTally)]) -> i64 {
    if choices.is_empty() {
        return 0;
    }

    let matches = choices
        .iter()
        .filter(|(choice, tally)| match tally.count_a.cmp(&tally.count_b) {
            std::cmp::Ordering::Greater => *choice == Choice::A,
            std::cmp::Ordering::Less => *choice == Choice::B,
            std::cmp::Ordering::Equal => true,
        })
        .count();

    (matches as f64 / choices.len() as f64 * 100.0 + 0.5).floor() as i64
}

/// Calendar day of `now` in the visitor-facing timezone.
pub fn visit_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Reads and maintains visitor profiles.
#[derive(Clone)]
pub struct ProfileService<S> {
    storage: S,
    offset: FixedOffset,
}

impl<S> ProfileService<S>
where
    S: ProfileStore + VoteLedger + ReactionLedger,
{
    /// Create a new profile service
    pub fn new(storage: S, offset: FixedOffset) -> Self {
        Self { storage, offset }
    }

    /// Record today's visit and return the refreshed profile, creating it if needed.
    pub async fn check_in(&self, visitor_id: &str, now: DateTime<Utc>) -> StorageResult<Profile> {
        let today = visit_day(now, self.offset);
        self.storage.record_visit(visitor_id, today).await?;

        let visits = self.storage.visit_dates(visitor_id).await?;
        let streak_days = streak(&visits, today);

        let mut profile = self.load_or_new(visitor_id).await?;
        profile.streak_days = streak_days;
        self.refresh_counters(&mut profile, now).await?;
        self.storage.save_profile(&profile).await?;

        debug!(
            visitor_id = %visitor_id,
            today = %today,
            streak_days = streak_days,
            role = %profile.role,
            "Profile checked in"
        );

        Ok(profile)
    }

    /// Recompute vote-derived counters after a vote; the streak is left as stored.
    pub async fn refresh_after_vote(
        &self,
        visitor_id: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Profile> {
        let mut profile = self.load_or_new(visitor_id).await?;
        let previous_role = profile.role;

        self.refresh_counters(&mut profile, now).await?;
        self.storage.save_profile(&profile).await?;

        if profile.role != previous_role {
            info!(
                visitor_id = %visitor_id,
                from = %previous_role,
                to = %profile.role,
                "Role changed"
            );
        }

        Ok(profile)
    }

    async fn load_or_new(&self, visitor_id: &str) -> StorageResult<Profile> {
        Ok(match self.storage.get_profile(visitor_id).await? {
            Some(profile) => profile,
            None => {
                debug!(visitor_id = %visitor_id, "Creating profile");
                Profile::new(visitor_id)
            }
        })
    }

    async fn refresh_counters(&self, profile: &mut Profile, now: DateTime<Utc>) -> StorageResult<()> {
        let visitor_id = profile.visitor_id.as_str();

        let trials_completed = self.storage.count_completions(visitor_id).await?;
        let testimonies_given = self.storage.count_testimonies_by(visitor_id).await?;
        let unlocks = RoleUnlocks::evaluate(trials_completed, testimonies_given);

        let mut choices = Vec::new();
        for (case_id, choice) in self.storage.visitor_choices(visitor_id).await? {
            choices.push((choice, self.storage.tally(&case_id).await?));
        }

        profile.trials_completed = trials_completed;
        profile.juror_unlocked = unlocks.juror;
        profile.clerk_unlocked = unlocks.clerk;
        profile.role = unlocks.role();
        profile.match_pct = majority_match_pct(&choices);
        profile.updated_at = now;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap() + Duration::days(offset)
    }

    #[test]
    fn test_streak_consecutive_days() {
        let visits = vec![day(0), day(-1), day(-2)];
        assert_eq!(streak(&visits, day(0)), 3);
    }

    #[test]
    fn test_streak_stops_at_gap() {
        let visits = vec![day(0), day(-2)];
        assert_eq!(streak(&visits, day(0)), 1);
    }

    #[test]
    fn test_streak_requires_today() {
        let visits = vec![day(-1), day(-2)];
        assert_eq!(streak(&visits, day(0)), 0);
    }

    #[test]
    fn test_streak_empty() {
        assert_eq!(streak(&[], day(0)), 0);
    }

    #[test]
    fn test_streak_ignores_future_and_duplicates() {
        let visits = vec![day(1), day(0), day(0), day(-1)];
        assert_eq!(streak(&visits, day(0)), 2);
    }

    #[test]
    fn test_streak_across_month_boundary() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let visits = vec![
            today,
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
        ];
        assert_eq!(streak(&visits, today), 3);
    }

    #[test]
    fn test_role_unlock_table() {
        assert_eq!(RoleUnlocks::evaluate(2, 1).role(), Role::Witness);
        assert_eq!(RoleUnlocks::evaluate(3, 1).role(), Role::Juror);
        assert_eq!(RoleUnlocks::evaluate(7, 1).role(), Role::Clerk);
        assert_eq!(RoleUnlocks::evaluate(7, 0).role(), Role::Witness);
        assert_eq!(RoleUnlocks::evaluate(0, 0).role(), Role::Witness);
    }

    #[test]
    fn test_clerk_requires_juror_gate() {
        let unlocks = RoleUnlocks::evaluate(12, 0);
        assert!(!unlocks.juror);
        assert!(!unlocks.clerk);
    }

    #[test]
    fn test_majority_match_pct() {
        let choices = vec![
            (Choice::A, RealTally::new(10, 2)),
            (Choice::A, RealTally::new(1, 5)),
            (Choice::B, RealTally::new(4, 4)),
        ];
        // 2 of 3
        assert_eq!(majority_match_pct(&choices), 67);
        assert_eq!(majority_match_pct(&[]), 0);
    }

    #[test]
    fn test_visit_day_uses_offset() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap();
        let pacific = FixedOffset::west_opt(8 * 3600).unwrap();
        assert_eq!(visit_day(now, pacific), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(visit_day(now, utc), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }
}
