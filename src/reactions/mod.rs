//! Up/down reactions on case arguments and visitor testimonies.
//!
//! Both share one shape: store one directional vote per (subject, visitor),
//! then recount by scanning every vote on the subject and annotate each item
//! with the caller's own vote.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult, StorageResult};
use crate::storage::{ReactionLedger, ReactionVotePolicy, SubjectVote, Testimony, VoteDirection};

/// Longest testimony kept; longer input is cut, not rejected.
pub const TESTIMONY_MAX_CHARS: usize = 120;
/// Newest testimonies considered when ranking.
pub const TESTIMONY_WINDOW: i64 = 20;
/// Testimonies returned after ranking.
pub const TESTIMONY_TOP: usize = 5;

/// Vote totals and the caller's own vote for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubjectSummary {
    pub up: i64,
    pub down: i64,
    pub mine: Option<VoteDirection>,
}

impl SubjectSummary {
    /// Total votes cast on the subject.
    pub fn total(&self) -> i64 {
        self.up + self.down
    }
}

/// An argument as shown to a visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentView {
    pub argument_key: String,
    pub text: String,
    pub up_count: i64,
    pub down_count: i64,
    pub my_vote: Option<VoteDirection>,
}

/// A testimony as shown to a visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestimonyView {
    pub id: String,
    pub text: String,
    pub up_count: i64,
    pub down_count: i64,
    pub my_vote: Option<VoteDirection>,
}

/// Result of voting on an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentVoteOutcome {
    pub ok: bool,
    pub argument_key: String,
    pub up_count: i64,
    pub down_count: i64,
    pub my_vote: VoteDirection,
}

/// Result of voting on a testimony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestimonyVoteOutcome {
    pub ok: bool,
    pub testimony_id: String,
    pub up_count: i64,
    pub down_count: i64,
    pub my_vote: VoteDirection,
}

/// Count votes per subject and pick out `visitor_id`'s own votes.
pub fn summarize(votes: &[SubjectVote], visitor_id: Option<&str>) -> HashMap<String, SubjectSummary> {
    let mut summaries: HashMap<String, SubjectSummary> = HashMap::new();

    for vote in votes {
        let entry = summaries.entry(vote.subject.clone()).or_default();
        match vote.vote {
            VoteDirection::Up => entry.up += 1,
            VoteDirection::Down => entry.down += 1,
        }
        if visitor_id == Some(vote.visitor_id.as_str()) {
            entry.mine = Some(vote.vote);
        }
    }

    summaries
}

/// Trim and cap testimony text; empty input is rejected.
pub fn normalize_testimony(text: &str) -> ApiResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Empty text"));
    }
    Ok(trimmed.chars().take(TESTIMONY_MAX_CHARS).collect())
}

/// Argument and testimony reactions over a [`ReactionLedger`].
#[derive(Clone)]
pub struct ReactionService<S> {
    storage: S,
    policy: ReactionVotePolicy,
}

impl<S> ReactionService<S>
where
    S: ReactionLedger,
{
    /// Create a new reaction service
    pub fn new(storage: S, policy: ReactionVotePolicy) -> Self {
        Self { storage, policy }
    }

    /// Arguments of a case, most-voted first; ties keep key order.
    pub async fn list_arguments(
        &self,
        case_id: &str,
        visitor_id: Option<&str>,
    ) -> StorageResult<Vec<ArgumentView>> {
        let arguments = self.storage.list_arguments(case_id).await?;
        let votes = self.storage.argument_votes(case_id).await?;
        let summaries = summarize(&votes, visitor_id);

        let mut views: Vec<ArgumentView> = arguments
            .into_iter()
            .map(|argument| {
                let summary = summaries
                    .get(&argument.argument_key)
                    .copied()
                    .unwrap_or_default();
                ArgumentView {
                    argument_key: argument.argument_key,
                    text: argument.text,
                    up_count: summary.up,
                    down_count: summary.down,
                    my_vote: summary.mine,
                }
            })
            .collect();

        views.sort_by_key(|v| std::cmp::Reverse(v.up_count + v.down_count));
        Ok(views)
    }

    /// Vote on an argument and return its fresh counts.
    pub async fn vote_argument(
        &self,
        visitor_id: &str,
        case_id: &str,
        argument_key: &str,
        vote: VoteDirection,
    ) -> ApiResult<ArgumentVoteOutcome> {
        if self.storage.get_argument(case_id, argument_key).await?.is_none() {
            return Err(ApiError::not_found("Argument not found"));
        }

        self.storage
            .cast_argument_vote(case_id, argument_key, visitor_id, vote, self.policy)
            .await?;

        let votes: Vec<SubjectVote> = self
            .storage
            .argument_votes(case_id)
            .await?
            .into_iter()
            .filter(|v| v.subject == argument_key)
            .collect();
        let summary = summarize(&votes, Some(visitor_id))
            .remove(argument_key)
            .unwrap_or_default();

        info!(
            case_id = %case_id,
            argument_key = %argument_key,
            vote = %vote,
            up = summary.up,
            down = summary.down,
            "Argument vote recorded"
        );

        Ok(ArgumentVoteOutcome {
            ok: true,
            argument_key: argument_key.to_string(),
            up_count: summary.up,
            down_count: summary.down,
            my_vote: summary.mine.unwrap_or(vote),
        })
    }

    /// Top testimonies among the newest of a case, most-voted first.
    pub async fn list_testimonies(
        &self,
        case_id: &str,
        visitor_id: Option<&str>,
    ) -> StorageResult<Vec<TestimonyView>> {
        let testimonies = self
            .storage
            .recent_testimonies(case_id, TESTIMONY_WINDOW)
            .await?;
        if testimonies.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = testimonies.iter().map(|t| t.id.clone()).collect();
        let votes = self.storage.testimony_votes(&ids).await?;
        let summaries = summarize(&votes, visitor_id);

        let mut views: Vec<TestimonyView> = testimonies
            .into_iter()
            .map(|testimony| {
                let summary = summaries.get(&testimony.id).copied().unwrap_or_default();
                TestimonyView {
                    id: testimony.id,
                    text: testimony.text,
                    up_count: summary.up,
                    down_count: summary.down,
                    my_vote: summary.mine,
                }
            })
            .collect();

        // Stable: equal totals stay newest first.
        views.sort_by_key(|v| std::cmp::Reverse(v.up_count + v.down_count));
        views.truncate(TESTIMONY_TOP);

        Ok(views)
    }

    /// Store a testimony and return the refreshed top list.
    pub async fn submit_testimony(
        &self,
        visitor_id: &str,
        case_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<Vec<TestimonyView>> {
        let text = normalize_testimony(text)?;

        let mut testimony = Testimony::new(case_id, visitor_id, text);
        testimony.created_at = now;
        self.storage.create_testimony(&testimony).await?;

        debug!(
            case_id = %case_id,
            testimony_id = %testimony.id,
            chars = testimony.text.chars().count(),
            "Testimony submitted"
        );

        Ok(self.list_testimonies(case_id, Some(visitor_id)).await?)
    }

    /// Vote on a testimony and return its fresh counts.
    pub async fn vote_testimony(
        &self,
        visitor_id: &str,
        testimony_id: &str,
        vote: VoteDirection,
    ) -> ApiResult<TestimonyVoteOutcome> {
        if self.storage.get_testimony(testimony_id).await?.is_none() {
            return Err(ApiError::not_found("Testimony not found"));
        }

        self.storage
            .cast_testimony_vote(testimony_id, visitor_id, vote, self.policy)
            .await?;

        let votes = self
            .storage
            .testimony_votes(&[testimony_id.to_string()])
            .await?;
        let summary = summarize(&votes, Some(visitor_id))
            .remove(testimony_id)
            .unwrap_or_default();

        info!(
            testimony_id = %testimony_id,
            vote = %vote,
            up = summary.up,
            down = summary.down,
            "Testimony vote recorded"
        );

        Ok(TestimonyVoteOutcome {
            ok: true,
            testimony_id: testimony_id.to_string(),
            up_count: summary.up,
            down_count: summary.down,
            my_vote: summary.mine.unwrap_or(vote),
        })
    }
}
