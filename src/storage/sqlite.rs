use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{
    Case, CaseArgument, CaseStore, Choice, CouncilState, Profile, ProfileStore,
    ReactionLedger, ReactionVotePolicy, Role, SeedStore, SubjectVote, Testimony, VoteDirection,
    VoteLedger,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::stats::{RealTally, StatsSeed};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database, mainly for tests.
    ///
    /// Uses a single long-lived connection because every SQLite `:memory:`
    /// connection opens its own database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                StorageError::Connection {
                    message: format!("Invalid database URL: {}", e),
                }
            })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn reaction_conflict_clause(policy: ReactionVotePolicy) -> &'static str {
    match policy {
        ReactionVotePolicy::Overwrite => {
            "DO UPDATE SET vote = excluded.vote, updated_at = excluded.updated_at"
        }
        ReactionVotePolicy::FirstWriteWins => "DO NOTHING",
    }
}

#[async_trait]
impl CaseStore for SqliteStorage {
    async fn upsert_case(&self, case: &Case) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cases (id, case_no, title, prompt, option_a_label, option_b_label, status, season, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                case_no = excluded.case_no,
                title = excluded.title,
                prompt = excluded.prompt,
                option_a_label = excluded.option_a_label,
                option_b_label = excluded.option_b_label,
                status = excluded.status,
                season = excluded.season
            "#,
        )
        .bind(&case.id)
        .bind(&case.case_no)
        .bind(&case.title)
        .bind(&case.prompt)
        .bind(&case.option_a_label)
        .bind(&case.option_b_label)
        .bind(&case.status)
        .bind(case.season)
        .bind(case.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_case(&self, id: &str) -> StorageResult<Option<Case>> {
        let row: Option<CaseRow> = sqlx::query_as(
            r#"
            SELECT id, case_no, title, prompt, option_a_label, option_b_label, status, season, created_at
            FROM cases
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn current_case(&self) -> StorageResult<Option<Case>> {
        let row: Option<CaseRow> = sqlx::query_as(
            r#"
            SELECT id, case_no, title, prompt, option_a_label, option_b_label, status, season, created_at
            FROM cases
            WHERE status = 'active'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_cases(&self, season: i64) -> StorageResult<Vec<Case>> {
        let rows: Vec<CaseRow> = sqlx::query_as(
            r#"
            SELECT id, case_no, title, prompt, option_a_label, option_b_label, status, season, created_at
            FROM cases
            WHERE season = ?
            ORDER BY case_no ASC
            "#,
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_council(&self) -> StorageResult<Option<CouncilState>> {
        let row: Option<CouncilRow> = sqlx::query_as(
            r#"
            SELECT motion_no, motion_text, split_a, split_b, heat_level, decision_eta_seconds
            FROM ai_council_state
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn save_council(&self, state: &CouncilState) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_council_state (id, motion_no, motion_text, split_a, split_b, heat_level, decision_eta_seconds, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                motion_no = excluded.motion_no,
                motion_text = excluded.motion_text,
                split_a = excluded.split_a,
                split_b = excluded.split_b,
                heat_level = excluded.heat_level,
                decision_eta_seconds = excluded.decision_eta_seconds,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.motion_no)
        .bind(&state.motion_text)
        .bind(state.split_a)
        .bind(state.split_b)
        .bind(&state.heat_level)
        .bind(state.decision_eta_seconds)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SeedStore for SqliteStorage {
    async fn get_seed(&self, case_id: &str) -> StorageResult<Option<StatsSeed>> {
        let row: Option<SeedRow> = sqlx::query_as(
            r#"
            SELECT base_participants, base_split_a, drift_per_min
            FROM case_stats_seed
            WHERE case_id = ?
            "#,
        )
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn upsert_seed(&self, case_id: &str, seed: &StatsSeed) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO case_stats_seed (case_id, base_participants, base_split_a, drift_per_min, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(case_id) DO UPDATE SET
                base_participants = excluded.base_participants,
                base_split_a = excluded.base_split_a,
                drift_per_min = excluded.drift_per_min,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(case_id)
        .bind(seed.base_participants)
        .bind(seed.base_split_a)
        .bind(seed.drift_per_min)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VoteLedger for SqliteStorage {
    async fn record_vote(
        &self,
        visitor_id: &str,
        case_id: &str,
        choice: Choice,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO case_votes (case_id, visitor_id, choice, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(case_id, visitor_id) DO UPDATE SET
                choice = excluded.choice,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(case_id)
        .bind(visitor_id)
        .bind(choice.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn tally(&self, case_id: &str) -> StorageResult<RealTally> {
        let (count_a, count_b): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN choice = 'A' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN choice = 'B' THEN 1 ELSE 0 END), 0)
            FROM case_votes
            WHERE case_id = ?
            "#,
        )
        .bind(case_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RealTally::new(count_a, count_b))
    }

    async fn record_completion(&self, visitor_id: &str, case_id: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO case_completions (visitor_id, case_id, first_completed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(visitor_id, case_id) DO NOTHING
            "#,
        )
        .bind(visitor_id)
        .bind(case_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_completions(&self, visitor_id: &str) -> StorageResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM case_completions WHERE visitor_id = ?")
                .bind(visitor_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn visitor_choices(&self, visitor_id: &str) -> StorageResult<Vec<(String, Choice)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT case_id, choice
            FROM case_votes
            WHERE visitor_id = ?
            ORDER BY case_id ASC
            "#,
        )
        .bind(visitor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(case_id, choice)| {
                let choice = choice
                    .parse::<Choice>()
                    .map_err(|message| StorageError::Query { message })?;
                Ok((case_id, choice))
            })
            .collect()
    }
}

#[async_trait]
impl ReactionLedger for SqliteStorage {
    async fn upsert_argument(&self, argument: &CaseArgument) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO case_arguments (case_id, argument_key, text, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(case_id, argument_key) DO UPDATE SET text = excluded.text
            "#,
        )
        .bind(&argument.case_id)
        .bind(&argument.argument_key)
        .bind(&argument.text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_arguments(&self, case_id: &str) -> StorageResult<Vec<CaseArgument>> {
        let rows: Vec<ArgumentRow> = sqlx::query_as(
            r#"
            SELECT case_id, argument_key, text
            FROM case_arguments
            WHERE case_id = ?
            ORDER BY argument_key ASC
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_argument(
        &self,
        case_id: &str,
        argument_key: &str,
    ) -> StorageResult<Option<CaseArgument>> {
        let row: Option<ArgumentRow> = sqlx::query_as(
            r#"
            SELECT case_id, argument_key, text
            FROM case_arguments
            WHERE case_id = ? AND argument_key = ?
            "#,
        )
        .bind(case_id)
        .bind(argument_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn cast_argument_vote(
        &self,
        case_id: &str,
        argument_key: &str,
        visitor_id: &str,
        vote: VoteDirection,
        policy: ReactionVotePolicy,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            r#"
            INSERT INTO case_argument_votes (case_id, argument_key, visitor_id, vote, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(case_id, argument_key, visitor_id) {}
            "#,
            reaction_conflict_clause(policy)
        );

        let result = sqlx::query(&sql)
            .bind(case_id)
            .bind(argument_key)
            .bind(visitor_id)
            .bind(vote.to_string())
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(case_id = %case_id, argument_key = %argument_key, "Argument vote already cast, kept first");
        }

        Ok(())
    }

    async fn argument_votes(&self, case_id: &str) -> StorageResult<Vec<SubjectVote>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT argument_key, visitor_id, vote
            FROM case_argument_votes
            WHERE case_id = ?
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows_to_subject_votes(rows))
    }

    async fn create_testimony(&self, testimony: &Testimony) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO testimonies (id, case_id, visitor_id, text, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&testimony.id)
        .bind(&testimony.case_id)
        .bind(&testimony.visitor_id)
        .bind(&testimony.text)
        .bind(testimony.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_testimony(&self, id: &str) -> StorageResult<Option<Testimony>> {
        let row: Option<TestimonyRow> = sqlx::query_as(
            r#"
            SELECT id, case_id, visitor_id, text, created_at
            FROM testimonies
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn recent_testimonies(
        &self,
        case_id: &str,
        limit: i64,
    ) -> StorageResult<Vec<Testimony>> {
        let rows: Vec<TestimonyRow> = sqlx::query_as(
            r#"
            SELECT id, case_id, visitor_id, text, created_at
            FROM testimonies
            WHERE case_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(case_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn count_testimonies_by(&self, visitor_id: &str) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM testimonies WHERE visitor_id = ?")
            .bind(visitor_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn cast_testimony_vote(
        &self,
        testimony_id: &str,
        visitor_id: &str,
        vote: VoteDirection,
        policy: ReactionVotePolicy,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            r#"
            INSERT INTO testimony_votes (testimony_id, visitor_id, vote, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(testimony_id, visitor_id) {}
            "#,
            reaction_conflict_clause(policy)
        );

        sqlx::query(&sql)
            .bind(testimony_id)
            .bind(visitor_id)
            .bind(vote.to_string())
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn testimony_votes(&self, testimony_ids: &[String]) -> StorageResult<Vec<SubjectVote>> {
        if testimony_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; testimony_ids.len()].join(", ");
        let sql = format!(
            "SELECT testimony_id, visitor_id, vote FROM testimony_votes WHERE testimony_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query_as::<_, (String, String, String)>(&sql);
        for id in testimony_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows_to_subject_votes(rows))
    }
}

#[async_trait]
impl ProfileStore for SqliteStorage {
    async fn record_visit(&self, visitor_id: &str, date: NaiveDate) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_visits (visitor_id, visit_date, first_seen_at)
            VALUES (?, ?, ?)
            ON CONFLICT(visitor_id, visit_date) DO NOTHING
            "#,
        )
        .bind(visitor_id)
        .bind(date.format(DATE_FORMAT).to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn visit_dates(&self, visitor_id: &str) -> StorageResult<Vec<NaiveDate>> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT visit_date
            FROM daily_visits
            WHERE visitor_id = ?
            ORDER BY visit_date DESC
            "#,
        )
        .bind(visitor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|raw| match NaiveDate::parse_from_str(&raw, DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!(visitor_id = %visitor_id, visit_date = %raw, error = %e, "Skipping malformed visit date");
                    None
                }
            })
            .collect())
    }

    async fn get_profile(&self, visitor_id: &str) -> StorageResult<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT visitor_id, role, trials_completed, streak_days, match_pct, juror_unlocked, clerk_unlocked, updated_at
            FROM profiles
            WHERE visitor_id = ?
            "#,
        )
        .bind(visitor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn save_profile(&self, profile: &Profile) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (visitor_id, role, trials_completed, streak_days, match_pct, juror_unlocked, clerk_unlocked, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(visitor_id) DO UPDATE SET
                role = excluded.role,
                trials_completed = excluded.trials_completed,
                streak_days = excluded.streak_days,
                match_pct = excluded.match_pct,
                juror_unlocked = excluded.juror_unlocked,
                clerk_unlocked = excluded.clerk_unlocked,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&profile.visitor_id)
        .bind(profile.role.to_string())
        .bind(profile.trials_completed)
        .bind(profile.streak_days)
        .bind(profile.match_pct)
        .bind(profile.juror_unlocked)
        .bind(profile.clerk_unlocked)
        .bind(profile.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn rows_to_subject_votes(rows: Vec<(String, String, String)>) -> Vec<SubjectVote> {
    rows.into_iter()
        .filter_map(|(subject, visitor_id, vote)| {
            vote.parse::<VoteDirection>().ok().map(|vote| SubjectVote {
                subject,
                visitor_id,
                vote,
            })
        })
        .collect()
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct CaseRow {
    id: String,
    case_no: String,
    title: String,
    prompt: String,
    option_a_label: String,
    option_b_label: String,
    status: String,
    season: i64,
    created_at: String,
}

impl From<CaseRow> for Case {
    fn from(row: CaseRow) -> Self {
        Self {
            id: row.id,
            case_no: row.case_no,
            title: row.title,
            prompt: row.prompt,
            option_a_label: row.option_a_label,
            option_b_label: row.option_b_label,
            status: row.status,
            season: row.season,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeedRow {
    base_participants: i64,
    base_split_a: i64,
    drift_per_min: f64,
}

impl From<SeedRow> for StatsSeed {
    fn from(row: SeedRow) -> Self {
        Self {
            base_participants: row.base_participants,
            base_split_a: row.base_split_a,
            drift_per_min: row.drift_per_min,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArgumentRow {
    case_id: String,
    argument_key: String,
    text: String,
}

impl From<ArgumentRow> for CaseArgument {
    fn from(row: ArgumentRow) -> Self {
        Self {
            case_id: row.case_id,
            argument_key: row.argument_key,
            text: row.text,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TestimonyRow {
    id: String,
    case_id: String,
    visitor_id: String,
    text: String,
    created_at: String,
}

impl From<TestimonyRow> for Testimony {
    fn from(row: TestimonyRow) -> Self {
        Self {
            id: row.id,
            case_id: row.case_id,
            visitor_id: row.visitor_id,
            text: row.text,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    visitor_id: String,
    role: String,
    trials_completed: i64,
    streak_days: i64,
    match_pct: i64,
    juror_unlocked: bool,
    clerk_unlocked: bool,
    updated_at: String,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Self {
            visitor_id: row.visitor_id,
            role: row.role.parse().unwrap_or(Role::Witness),
            trials_completed: row.trials_completed,
            streak_days: row.streak_days,
            match_pct: row.match_pct,
            juror_unlocked: row.juror_unlocked,
            clerk_unlocked: row.clerk_unlocked,
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CouncilRow {
    motion_no: i64,
    motion_text: String,
    split_a: i64,
    split_b: i64,
    heat_level: String,
    decision_eta_seconds: i64,
}

impl From<CouncilRow> for CouncilState {
    fn from(row: CouncilRow) -> Self {
        Self {
            motion_no: row.motion_no,
            motion_text: row.motion_text,
            split_a: row.split_a,
            split_b: row.split_b,
            heat_level: row.heat_level,
            decision_eta_seconds: row.decision_eta_seconds,
        }
    }
}
