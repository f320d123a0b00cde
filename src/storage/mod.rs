//! Storage layer for the tribunal.
//!
//! This module defines the persisted records (cases, votes, reactions,
//! visits, profiles) and the async traits the services are written against.
//! [`SqliteStorage`] implements all of them.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::stats::{RealTally, StatsSeed};

/// An ethics scenario with two labelled options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Unique case identifier.
    pub id: String,
    /// Display ordinal, e.g. "001".
    pub case_no: String,
    /// Short headline.
    pub title: String,
    /// The question put to visitors.
    pub prompt: String,
    /// Label for choice A.
    pub option_a_label: String,
    /// Label for choice B.
    pub option_b_label: String,
    /// Lifecycle status; only `active` cases are served as current.
    pub status: String,
    /// Season the case belongs to.
    pub season: i64,
    /// When the case was authored.
    pub created_at: DateTime<Utc>,
}

/// A visitor's pick on a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::A => write!(f, "A"),
            Choice::B => write!(f, "B"),
        }
    }
}

impl std::str::FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Choice::A),
            "B" => Ok(Choice::B),
            _ => Err("Choice must be 'A' or 'B'".to_string()),
        }
    }
}

/// Direction of a reaction on an argument or testimony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Up,
    Down,
}

impl std::fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteDirection::Up => write!(f, "up"),
            VoteDirection::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for VoteDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            _ => Err("vote must be 'up' or 'down'".to_string()),
        }
    }
}

/// What happens when a visitor reacts to the same argument or testimony twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionVotePolicy {
    /// The latest vote replaces the earlier one.
    #[default]
    Overwrite,
    /// The first vote is kept; later ones are ignored.
    FirstWriteWins,
}

impl std::fmt::Display for ReactionVotePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReactionVotePolicy::Overwrite => write!(f, "overwrite"),
            ReactionVotePolicy::FirstWriteWins => write!(f, "first_write_wins"),
        }
    }
}

impl std::str::FromStr for ReactionVotePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Ok(ReactionVotePolicy::Overwrite),
            "first_write_wins" => Ok(ReactionVotePolicy::FirstWriteWins),
            _ => Err(format!("Unknown reaction vote policy: {}", s)),
        }
    }
}

/// A counter-argument attached to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseArgument {
    /// Owning case.
    pub case_id: String,
    /// Stable key within the case, e.g. "a1".
    pub argument_key: String,
    /// Argument text.
    pub text: String,
}

/// A short visitor-written statement on a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testimony {
    /// Unique testimony identifier.
    pub id: String,
    /// Owning case.
    pub case_id: String,
    /// Author.
    pub visitor_id: String,
    /// Statement text, at most 120 characters.
    pub text: String,
    /// When the testimony was submitted.
    pub created_at: DateTime<Utc>,
}

/// One visitor's reaction to a subject (argument key or testimony id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectVote {
    /// Argument key or testimony id.
    pub subject: String,
    /// Who voted.
    pub visitor_id: String,
    /// Current direction.
    pub vote: VoteDirection,
}

/// Unlockable profile roles, lowest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    Witness,
    Juror,
    Clerk,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Witness => write!(f, "WITNESS"),
            Role::Juror => write!(f, "JUROR"),
            Role::Clerk => write!(f, "CLERK"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WITNESS" => Ok(Role::Witness),
            "JUROR" => Ok(Role::Juror),
            "CLERK" => Ok(Role::Clerk),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Gamified visitor profile. Every counter is derived from the ledgers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Anonymous visitor identifier.
    pub visitor_id: String,
    /// Highest unlocked role.
    pub role: Role,
    /// Number of distinct cases voted on.
    pub trials_completed: i64,
    /// Consecutive visit days ending today.
    pub streak_days: i64,
    /// Share of the visitor's votes that sit with the current majority (0-100).
    pub match_pct: i64,
    /// Whether JUROR is unlocked.
    pub juror_unlocked: bool,
    /// Whether CLERK is unlocked.
    pub clerk_unlocked: bool,
    /// Last recomputation time.
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

/// Singleton state for the simulated council ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouncilState {
    pub motion_no: i64,
    pub motion_text: String,
    pub split_a: i64,
    pub split_b: i64,
    pub heat_level: String,
    pub decision_eta_seconds: i64,
}

// ============================================================================
// Constructors
// ============================================================================

impl Case {
    /// Create a new active season-1 case
    pub fn new(
        case_no: impl Into<String>,
        title: impl Into<String>,
        prompt: impl Into<String>,
        option_a_label: impl Into<String>,
        option_b_label: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_no: case_no.into(),
            title: title.into(),
            prompt: prompt.into(),
            option_a_label: option_a_label.into(),
            option_b_label: option_b_label.into(),
            status: "active".to_string(),
            season: 1,
            created_at: Utc::now(),
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Set the season
    pub fn with_season(mut self, season: i64) -> Self {
        self.season = season;
        self
    }

    /// Set the creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether the case is open for voting
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

impl CaseArgument {
    /// Create a new argument
    pub fn new(
        case_id: impl Into<String>,
        argument_key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            argument_key: argument_key.into(),
            text: text.into(),
        }
    }
}

impl Testimony {
    /// Create a new testimony stamped now
    pub fn new(
        case_id: impl Into<String>,
        visitor_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.into(),
            visitor_id: visitor_id.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

impl Profile {
    /// Fresh WITNESS profile with zeroed counters
    pub fn new(visitor_id: impl Into<String>) -> Self {
        Self {
            visitor_id: visitor_id.into(),
            role: Role::Witness,
            trials_completed: 0,
            streak_days: 0,
            match_pct: 0,
            juror_unlocked: false,
            clerk_unlocked: false,
            updated_at: Utc::now(),
        }
    }
}

impl Default for CouncilState {
    fn default() -> Self {
        Self {
            motion_no: 1,
            motion_text: "Grant AI companions the right to refuse affection".to_string(),
            split_a: 53,
            split_b: 47,
            heat_level: "HIGH".to_string(),
            decision_eta_seconds: 8076,
        }
    }
}

// ============================================================================
// Storage traits
// ============================================================================

/// Case catalogue and council ticker.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Insert or replace a case.
    async fn upsert_case(&self, case: &Case) -> StorageResult<()>;
    /// Get a case by ID.
    async fn get_case(&self, id: &str) -> StorageResult<Option<Case>>;
    /// Newest active case.
    async fn current_case(&self) -> StorageResult<Option<Case>>;
    /// All cases in a season ordered by case number.
    async fn list_cases(&self, season: i64) -> StorageResult<Vec<Case>>;
    /// The council ticker row, if any.
    async fn get_council(&self) -> StorageResult<Option<CouncilState>>;
    /// Replace the council ticker row.
    async fn save_council(&self, state: &CouncilState) -> StorageResult<()>;
}

/// Per-case tuning for atmosphere statistics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SeedStore: Send + Sync {
    /// Seed for a case, `None` when never configured.
    async fn get_seed(&self, case_id: &str) -> StorageResult<Option<StatsSeed>>;
    /// Insert or replace the seed for a case.
    async fn upsert_seed(&self, case_id: &str, seed: &StatsSeed) -> StorageResult<()>;
}

/// One live A/B choice per (visitor, case), plus first-completion records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoteLedger: Send + Sync {
    /// Upsert the visitor's choice for a case.
    async fn record_vote(&self, visitor_id: &str, case_id: &str, choice: Choice)
        -> StorageResult<()>;
    /// Count current choices for a case.
    async fn tally(&self, case_id: &str) -> StorageResult<RealTally>;
    /// Record that the visitor completed the case; repeated calls are no-ops.
    async fn record_completion(&self, visitor_id: &str, case_id: &str) -> StorageResult<()>;
    /// Distinct cases the visitor has completed.
    async fn count_completions(&self, visitor_id: &str) -> StorageResult<i64>;
    /// Every current choice of the visitor as (case_id, choice).
    async fn visitor_choices(&self, visitor_id: &str) -> StorageResult<Vec<(String, Choice)>>;
}

/// Arguments, testimonies, and the up/down votes on them.
#[async_trait]
pub trait ReactionLedger: Send + Sync {
    /// Insert or replace an argument.
    async fn upsert_argument(&self, argument: &CaseArgument) -> StorageResult<()>;
    /// Arguments of a case ordered by key.
    async fn list_arguments(&self, case_id: &str) -> StorageResult<Vec<CaseArgument>>;
    /// Get a single argument.
    async fn get_argument(
        &self,
        case_id: &str,
        argument_key: &str,
    ) -> StorageResult<Option<CaseArgument>>;
    /// Store a vote on an argument according to `policy`.
    async fn cast_argument_vote(
        &self,
        case_id: &str,
        argument_key: &str,
        visitor_id: &str,
        vote: VoteDirection,
        policy: ReactionVotePolicy,
    ) -> StorageResult<()>;
    /// All argument votes of a case; subjects are argument keys.
    async fn argument_votes(&self, case_id: &str) -> StorageResult<Vec<SubjectVote>>;

    /// Store a new testimony.
    async fn create_testimony(&self, testimony: &Testimony) -> StorageResult<()>;
    /// Get a testimony by ID.
    async fn get_testimony(&self, id: &str) -> StorageResult<Option<Testimony>>;
    /// Newest testimonies of a case, at most `limit`.
    async fn recent_testimonies(&self, case_id: &str, limit: i64)
        -> StorageResult<Vec<Testimony>>;
    /// Testimonies written by a visitor across all cases.
    async fn count_testimonies_by(&self, visitor_id: &str) -> StorageResult<i64>;
    /// Store a vote on a testimony according to `policy`.
    async fn cast_testimony_vote(
        &self,
        testimony_id: &str,
        visitor_id: &str,
        vote: VoteDirection,
        policy: ReactionVotePolicy,
    ) -> StorageResult<()>;
    /// Votes on the given testimonies; subjects are testimony ids.
    async fn testimony_votes(&self, testimony_ids: &[String]) -> StorageResult<Vec<SubjectVote>>;
}

/// Daily visits and stored profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Record a visit on `date`; repeated calls are no-ops.
    async fn record_visit(&self, visitor_id: &str, date: NaiveDate) -> StorageResult<()>;
    /// Distinct visit dates, newest first.
    async fn visit_dates(&self, visitor_id: &str) -> StorageResult<Vec<NaiveDate>>;
    /// Get a stored profile.
    async fn get_profile(&self, visitor_id: &str) -> StorageResult<Option<Profile>>;
    /// Insert or replace a profile.
    async fn save_profile(&self, profile: &Profile) -> StorageResult<()>;
}

/// Everything the HTTP layer needs from one backend.
pub trait Storage: CaseStore + SeedStore + VoteLedger + ReactionLedger + ProfileStore {}

impl<T> Storage for T where T: CaseStore + SeedStore + VoteLedger + ReactionLedger + ProfileStore {}
